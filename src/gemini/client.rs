//! HTTP client for the Gemini streaming endpoint.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::debug;

use super::config::GeminiConfig;
use super::error::{UpstreamError, UpstreamResult};
use super::streaming::{fragments, sse_data};
use super::types::{Content, GenerateRequest, Tool};
use super::{FragmentStream, GenerationClient};

/// Request body as sent on the wire.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

/// Gemini API client.
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    /// Build a client from its configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> UpstreamResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UpstreamError::HttpClient(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn wire_request<'a>(&self, request: &'a GenerateRequest) -> WireRequest<'a> {
        let generation_config = (self.config.max_output_tokens.is_some()
            || self.config.temperature.is_some())
        .then_some(WireGenerationConfig {
            max_output_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        });

        WireRequest {
            contents: &request.contents,
            tools: (!request.tools.is_empty()).then_some(request.tools.as_slice()),
            generation_config,
        }
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn stream_generate(&self, request: GenerateRequest) -> UpstreamResult<FragmentStream> {
        debug!(
            model = %self.config.model,
            turns = request.contents.len(),
            tools = request.tools.len(),
            "Gemini API streaming request"
        );

        let response = self
            .http
            .post(self.config.stream_url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&self.wire_request(&request))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes_stream().map_err(std::io::Error::other);
        Ok(fragments(sse_data(bytes)).boxed())
    }
}
