//! History-carrying chat turns on top of a [`GenerationClient`].
//!
//! A [`ChatSession`] sends one user turn with the prior history and hands
//! back a [`ChatStream`]. The updated history is only available once that
//! stream has been drained without error, so callers cannot persist a
//! partial exchange.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

use super::error::{UpstreamError, UpstreamResult};
use super::types::{Content, Fragment, GenerateRequest, History, Part, Tool};
use super::{FragmentStream, GenerationClient};

/// A conversation ready to send its next turn.
pub struct ChatSession {
    client: Arc<dyn GenerationClient>,
    history: History,
    tools: Vec<Tool>,
}

impl ChatSession {
    /// Resume a conversation from `history` (empty for a fresh one).
    #[must_use]
    pub fn new(client: Arc<dyn GenerationClient>, history: History) -> Self {
        Self {
            client,
            history,
            tools: Vec::new(),
        }
    }

    /// Enable tools for the turn.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    /// Send a user turn and start streaming the reply.
    ///
    /// # Errors
    /// Returns an error if the upstream call cannot be started.
    pub async fn send_message_stream(self, parts: Vec<Part>) -> UpstreamResult<ChatStream> {
        let user = Content::user(parts);
        let mut contents = self.history.contents().to_vec();
        contents.push(user.clone());

        let request = GenerateRequest {
            contents,
            tools: self.tools,
        };
        let inner = self.client.stream_generate(request).await?;

        Ok(ChatStream {
            inner,
            prior: self.history,
            user,
            response: String::new(),
            state: StreamState::Streaming,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Completed,
    Failed,
}

/// Fragments of one reply, in upstream order.
///
/// Finite and non-restartable: after the end or the first error it only
/// yields `None`.
pub struct ChatStream {
    inner: FragmentStream,
    prior: History,
    user: Content,
    response: String,
    state: StreamState,
}

impl ChatStream {
    /// Text received so far.
    #[must_use]
    pub fn response_text(&self) -> &str {
        &self.response
    }

    /// Whether the upstream stream ended without error.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == StreamState::Completed
    }

    /// Updated history, available only after a clean end of stream.
    ///
    /// An empty reply leaves the exchange out, mirroring a turn the service
    /// produced no content for.
    #[must_use]
    pub fn into_history(self) -> Option<History> {
        if self.state != StreamState::Completed {
            return None;
        }

        let mut history = self.prior;
        if !self.response.is_empty() {
            history.push(self.user);
            history.push(Content::model_text(self.response));
        }
        Some(history)
    }
}

impl Stream for ChatStream {
    type Item = Result<Fragment, UpstreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != StreamState::Streaming {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(fragment))) => {
                this.response.push_str(&fragment.text);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.state = StreamState::Failed;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.state = StreamState::Completed;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
