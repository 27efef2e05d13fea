//! Relay errors and their HTTP rendering.
//!
//! Callers only ever see a short fixed message; the full error is logged by
//! the handler with the session it belongs to.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::attachment::AttachmentError;
use crate::gemini::UpstreamError;

/// Message returned when a required field is absent.
pub const MISSING_FIELDS_MESSAGE: &str = "Prompt and sessionId are required";
/// Message returned when the upstream call fails.
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Failed to generate response";
/// Message returned when an image cannot be processed.
pub const IMAGE_FAILURE_MESSAGE: &str = "Failed to process image";
/// Message returned for an unreadable request body.
pub const BAD_REQUEST_MESSAGE: &str = "Invalid request body";

/// Which required fields a request lacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingFields {
    /// `prompt` absent or empty.
    pub prompt: bool,
    /// `sessionId` absent or empty.
    pub session_id: bool,
}

impl std::fmt::Display for MissingFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.prompt, self.session_id) {
            (true, true) => f.write_str("prompt, sessionId"),
            (true, false) => f.write_str("prompt"),
            (false, true) => f.write_str("sessionId"),
            (false, false) => f.write_str("none"),
        }
    }
}

/// Errors that terminate a relay request.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A required field is absent. No upstream call is made.
    #[error("missing required field(s): {0}")]
    Validation(MissingFields),

    /// The request body could not be read.
    #[error("invalid request body: {0}")]
    BadRequest(String),

    /// The attached image could not be processed.
    #[error("image processing failed: {0}")]
    ImageProcessing(#[from] AttachmentError),

    /// The generation service failed.
    #[error("upstream generation failed: {0}")]
    Upstream(#[from] UpstreamError),
}

impl RelayError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ImageProcessing(_) | Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => MISSING_FIELDS_MESSAGE,
            Self::BadRequest(_) => BAD_REQUEST_MESSAGE,
            Self::ImageProcessing(_) => IMAGE_FAILURE_MESSAGE,
            Self::Upstream(_) => UPSTREAM_FAILURE_MESSAGE,
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::ImageProcessing(AttachmentError::Io(err))
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "error": self.public_message() })),
        )
            .into_response()
    }
}
