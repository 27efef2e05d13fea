//! HTTP client for the relay endpoints.

use std::io;
use std::path::Path;

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use super::decode::LineDecoder;
use super::transcript::{PendingReply, Transcript};
use crate::session::{Mode, SessionId};

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bad server URL.
    #[error("invalid server URL: {0}")]
    Url(#[from] url::ParseError),

    /// Transport failure, including a body that ended abnormally.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Reading an attachment from disk failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// `error` field of the body, or the raw body.
        message: String,
    },

    /// The attachment's extension is not a known image type.
    #[error("unsupported image type: {0}")]
    UnsupportedImage(String),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// An image to send with a turn.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name sent in the form part.
    pub file_name: String,
    /// MIME type.
    pub mime_type: &'static str,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Load an image, inferring its MIME type from the extension.
    ///
    /// # Errors
    /// Returns an error for unknown extensions or unreadable files.
    pub async fn from_path(path: &Path) -> Result<Self, ClientError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mime_type = mime_for_extension(&extension)
            .ok_or_else(|| ClientError::UnsupportedImage(path.display().to_string()))?;

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "image".to_string(), |name| name.to_string_lossy().into_owned());

        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }
}

fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// One outgoing turn.
#[derive(Debug, Clone)]
pub struct OutgoingTurn {
    /// Endpoint to call.
    pub mode: Mode,
    /// Session the turn belongs to.
    pub session_id: SessionId,
    /// Prompt text.
    pub prompt: String,
    /// Optional image.
    pub image: Option<Attachment>,
}

/// Client for a running relay.
#[derive(Debug, Clone)]
pub struct ChatClient {
    base: Url,
    http: reqwest::Client,
}

impl ChatClient {
    /// Create a client for the relay at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            base: Url::parse(base_url)?,
            http: reqwest::Client::builder().build()?,
        })
    }

    /// Send a turn, streaming fragments to `on_fragment` and recording the
    /// outcome in `transcript`.
    ///
    /// Returns the full reply text. On failure the transcript gets the user
    /// prompt followed by the apology.
    ///
    /// # Errors
    /// Returns an error if the request fails, the server rejects it, or the
    /// stream breaks part way.
    pub async fn send_turn<F>(
        &self,
        transcript: &mut Transcript,
        turn: OutgoingTurn,
        mut on_fragment: F,
    ) -> Result<String, ClientError>
    where
        F: FnMut(&str),
    {
        let prompt = turn.prompt.clone();
        let response = match self.open(turn).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "chat request failed");
                transcript.record_failure(&prompt);
                return Err(e);
            }
        };

        let mut reply = transcript.begin_reply(&prompt);
        let mut decoder = LineDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!(error = %e, "reply stream broke");
                    reply.fail();
                    return Err(e.into());
                }
            };
            for line in decoder.push(&chunk) {
                emit(&mut reply, &mut on_fragment, line.text());
            }
        }
        if let Some(line) = decoder.finish() {
            emit(&mut reply, &mut on_fragment, line.text());
        }

        Ok(reply.finish())
    }

    async fn open(&self, turn: OutgoingTurn) -> Result<reqwest::Response, ClientError> {
        let url = self.base.join(turn.mode.path())?;

        let mut form = Form::new()
            .text("prompt", turn.prompt)
            .text("sessionId", turn.session_id.to_string());
        if let Some(image) = turn.image {
            let part = Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(image.mime_type)?;
            form = form.part("image", part);
        }

        tracing::debug!(url = %url, "sending chat turn");
        let response = self.http.post(url).multipart(form).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body).map_or(body, |parsed| parsed.error);
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

fn emit<F: FnMut(&str)>(reply: &mut PendingReply<'_>, on_fragment: &mut F, text: &str) {
    if !text.is_empty() {
        on_fragment(text);
        reply.push(text);
    }
}
