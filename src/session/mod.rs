//! Session identifiers, turn modes and the process-wide session store.

pub mod store;

pub use store::{SessionLease, SessionStore};

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque client-generated token scoping a conversation.
///
/// The only validation is presence: the token must not be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a token, rejecting the empty string.
    #[must_use]
    pub fn parse(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.is_empty() { None } else { Some(Self(token)) }
    }

    /// Fresh random identifier (UUID v4), as a browser session would create.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Error for an empty session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session id must not be empty")]
pub struct EmptySessionId;

impl FromStr for SessionId {
    type Err = EmptySessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(EmptySessionId)
    }
}

impl TryFrom<String> for SessionId {
    type Error = EmptySessionId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value).ok_or(EmptySessionId)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// How a turn interacts with session history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Resume and update the session's history.
    Conversational,
    /// One-shot, search-grounded turn; history is neither read nor written.
    Search,
}

impl Mode {
    /// Endpoint path serving this mode.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Conversational => "/generate",
            Self::Search => "/search",
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conversational => "conversational",
            Self::Search => "search",
        }
    }

    /// Whether turns in this mode touch the session store.
    #[must_use]
    pub const fn uses_history(self) -> bool {
        matches!(self, Self::Conversational)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
