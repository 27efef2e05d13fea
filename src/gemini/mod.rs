//! Upstream generation client (Google Gemini).
//!
//! The relay only needs "send a turn, receive a sequence of text fragments,
//! then a final history". That contract is the [`GenerationClient`] trait;
//! [`GeminiClient`] implements it over HTTP and [`ChatSession`] layers the
//! conversation history on top.

pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod streaming;
pub mod types;

pub use chat::{ChatSession, ChatStream};
pub use client::GeminiClient;
pub use config::GeminiConfig;
pub use error::{UpstreamError, UpstreamResult};
pub use types::{Content, Fragment, GenerateRequest, History, Part, Role, Tool};

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy, finite stream of reply fragments.
pub type FragmentStream = BoxStream<'static, UpstreamResult<Fragment>>;

/// A service that can stream a generated reply.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Start generating a reply for `request`.
    ///
    /// Resolves once the service has accepted the request; fragments are
    /// then pulled from the returned stream.
    async fn stream_generate(&self, request: GenerateRequest) -> UpstreamResult<FragmentStream>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted generation client for tests.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::StreamExt;

    use super::*;

    /// Replays fixed fragments, optionally failing part way.
    pub struct ScriptedClient {
        fragments: Vec<String>,
        fail_after: Option<usize>,
        fail_to_start: bool,
        calls: AtomicUsize,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedClient {
        pub fn new(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(ToString::to_string).collect(),
                fail_after: None,
                fail_to_start: false,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Emit an error after `count` fragments.
        pub fn failing_after(mut self, count: usize) -> Self {
            self.fail_after = Some(count);
            self
        }

        /// Reject the request before any fragment.
        pub fn failing_to_start(mut self) -> Self {
            self.fail_to_start = true;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<GenerateRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn stream_generate(&self, request: GenerateRequest) -> UpstreamResult<FragmentStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);

            if self.fail_to_start {
                return Err(UpstreamError::Api {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }

            let mut items: Vec<UpstreamResult<Fragment>> = self
                .fragments
                .iter()
                .take(self.fail_after.unwrap_or(usize::MAX))
                .map(|text| Ok(Fragment::new(text.clone())))
                .collect();
            if self.fail_after.is_some() {
                items.push(Err(UpstreamError::Api {
                    status: 500,
                    body: "stream interrupted".to_string(),
                }));
            }

            Ok(futures::stream::iter(items).boxed())
        }
    }
}
