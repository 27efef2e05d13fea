//! Error types for the upstream generation client.

use thiserror::Error;

/// Errors raised while talking to the generation service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP client configuration error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Reading the streamed body failed.
    #[error("stream read error: {0}")]
    Stream(#[from] std::io::Error),

    /// The service answered with a non-success status.
    #[error("API error (HTTP {status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Quota or rate limit exceeded.
    #[error("rate limited by upstream")]
    RateLimited,

    /// A streamed chunk could not be parsed.
    #[error("malformed upstream payload: {0}")]
    Parse(#[from] serde_json::Error),

    /// The prompt was rejected by the service.
    #[error("prompt blocked by upstream: {0}")]
    Blocked(String),
}

/// Convenience result alias for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;
