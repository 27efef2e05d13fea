//! Conversation transcript as shown to the user.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Assistant text recorded when a turn fails.
pub const APOLOGY: &str = "Sorry, something went wrong.";

/// Who said a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The person typing.
    User,
    /// The assistant.
    Assistant,
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    /// Speaker.
    pub speaker: Speaker,
    /// Displayed text.
    pub text: String,
    /// When the entry was recorded.
    pub at: DateTime<Utc>,
}

impl Turn {
    fn now(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Ordered list of settled turns.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Record the user's prompt once the reply has started arriving.
    pub fn begin_reply(&mut self, prompt: &str) -> PendingReply<'_> {
        self.turns.push(Turn::now(Speaker::User, prompt));
        PendingReply {
            transcript: self,
            text: String::new(),
        }
    }

    /// Record a turn that failed before any reply arrived.
    pub fn record_failure(&mut self, prompt: &str) {
        self.turns.push(Turn::now(Speaker::User, prompt));
        self.turns.push(Turn::now(Speaker::Assistant, APOLOGY));
    }
}

/// A reply being streamed in; nothing is added to the transcript for it
/// until it is finished or failed.
#[derive(Debug)]
pub struct PendingReply<'a> {
    transcript: &'a mut Transcript,
    text: String,
}

impl PendingReply<'_> {
    /// Append a fragment; returns the text so far.
    pub fn push(&mut self, fragment: &str) -> &str {
        self.text.push_str(fragment);
        &self.text
    }

    /// Settle the reply and return its text. A blank reply adds no
    /// assistant turn.
    #[must_use]
    pub fn finish(self) -> String {
        if !self.text.trim().is_empty() {
            self.transcript
                .turns
                .push(Turn::now(Speaker::Assistant, self.text.clone()));
        }
        self.text
    }

    /// Abandon the partial reply and record the apology.
    pub fn fail(self) {
        self.transcript
            .turns
            .push(Turn::now(Speaker::Assistant, APOLOGY));
    }
}
