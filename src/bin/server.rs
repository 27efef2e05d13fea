//! Crypto assistant server binary.
//! Run with: API_KEY=... cargo run --bin crypto-assistant

use std::process::ExitCode;

use crypto_assistant::start_assistant;

fn main() -> ExitCode {
    start_assistant::run()
}
