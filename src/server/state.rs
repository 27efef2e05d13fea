//! Application state shared across all request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AssistantConfig;
use crate::gemini::{GeminiClient, GenerationClient, UpstreamResult};
use crate::session::SessionStore;

/// Limits and locations for uploaded attachments.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Directory temporary upload files are created in.
    pub dir: PathBuf,
    /// Largest accepted image, in bytes.
    pub max_image_bytes: usize,
}

/// Shared application state.
pub struct AppState {
    /// Client for the generation service.
    pub generator: Arc<dyn GenerationClient>,
    /// Conversation histories by session id.
    pub sessions: SessionStore,
    /// Upload handling settings.
    pub uploads: UploadSettings,
    /// Directory served for unmatched paths, if any.
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    /// Build the state from configuration, connecting to Gemini.
    ///
    /// # Errors
    /// Returns an error if the Gemini client cannot be created.
    pub fn from_config(config: &AssistantConfig) -> UpstreamResult<Arc<Self>> {
        let client = GeminiClient::new(config.gemini.clone())?;
        tracing::info!("Gemini model: {}", client.model());

        let state = Self::new(Arc::new(client), config.uploads.clone());
        Ok(Arc::new(state.with_static_dir(config.static_dir.clone())))
    }

    /// State around an arbitrary generation client.
    #[must_use]
    pub fn new(generator: Arc<dyn GenerationClient>, uploads: UploadSettings) -> Self {
        Self {
            generator,
            sessions: SessionStore::new(),
            uploads,
            static_dir: None,
        }
    }

    /// Serve static assets from `dir` for unmatched paths.
    #[must_use]
    pub fn with_static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }
}
