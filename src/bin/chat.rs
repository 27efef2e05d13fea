//! Terminal chat client for a running crypto assistant server.
//! Run with: cargo run --bin crypto-assistant-chat -- --url http://localhost:3000
//!
//! Commands: `/search` and `/chat` switch mode, `/image <path>` attaches an
//! image to the next prompt, `/quit` exits.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use crypto_assistant::client::{Attachment, ChatClient, OutgoingTurn, Transcript};
use crypto_assistant::session::{Mode, SessionId};

#[derive(Debug, Parser)]
#[command(name = "crypto-assistant-chat", version, about = "Chat with the crypto assistant")]
struct Args {
    /// Server base URL.
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Start in search mode.
    #[arg(long)]
    search: bool,

    /// Resume an existing session instead of starting a new one.
    #[arg(long)]
    session: Option<String>,
}

enum Command {
    Prompt(String),
    Mode(Mode),
    Image(PathBuf),
    Quit,
    Empty,
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    match line {
        "" => Command::Empty,
        "/quit" | "/exit" => Command::Quit,
        "/search" => Command::Mode(Mode::Search),
        "/chat" => Command::Mode(Mode::Conversational),
        _ => line.strip_prefix("/image ").map_or_else(
            || Command::Prompt(line.to_string()),
            |path| Command::Image(PathBuf::from(path.trim())),
        ),
    }
}

fn prompt_marker(mode: Mode, image: Option<&Attachment>) {
    let attached = image.map_or(String::new(), |a| format!(" [{}]", a.file_name));
    print!("{mode}{attached}> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let client = ChatClient::new(&args.url).with_context(|| format!("bad server URL {}", args.url))?;
    let session_id = match args.session {
        Some(token) => SessionId::parse(token).context("session id must not be empty")?,
        None => SessionId::generate(),
    };
    let mut mode = if args.search {
        Mode::Search
    } else {
        Mode::Conversational
    };
    let mut image: Option<Attachment> = None;
    let mut transcript = Transcript::new();

    println!("Session {session_id}. Commands: /search, /chat, /image <path>, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_marker(mode, image.as_ref());
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Mode(next) => {
                mode = next;
                println!("Switched to {mode} mode");
            }
            Command::Image(path) => match Attachment::from_path(&path).await {
                Ok(attachment) => image = Some(attachment),
                Err(e) => eprintln!("Cannot attach {}: {e}", path.display()),
            },
            Command::Prompt(prompt) => {
                let turn = OutgoingTurn {
                    mode,
                    session_id: session_id.clone(),
                    prompt,
                    image: image.take(),
                };
                let result = client
                    .send_turn(&mut transcript, turn, |fragment| {
                        print!("{fragment}");
                        let _ = std::io::stdout().flush();
                    })
                    .await;
                println!();
                if let Err(e) = result {
                    if let Some(last) = transcript.turns().last() {
                        println!("{}", last.text);
                    }
                    eprintln!("({e})");
                }
            }
        }
    }

    println!("{} turns in this session", transcript.len());
    Ok(())
}
