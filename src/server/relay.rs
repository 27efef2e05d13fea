//! The streaming relay: one user turn in, newline-delimited fragments out.
//!
//! A turn moves through [`TurnPhase`]s. Everything up to the upstream call
//! answering happens inside the handler, so failures there still become a
//! JSON error with a proper status. Once streaming starts the status is
//! already 200; fragments are pumped by a background task and an upstream
//! failure aborts the body instead.
//!
//! In conversational mode the session is leased for the whole turn and the
//! new history is committed only when the upstream stream ends cleanly. The
//! pump drains upstream even if the caller disconnects, so the exchange is
//! still recorded.

use std::fmt;
use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use super::error::RelayError;
use super::extract::TurnRequest;
use super::state::AppState;
use crate::gemini::{ChatSession, ChatStream, Fragment, History, Tool};
use crate::session::{Mode, SessionId, SessionLease};

/// Content type of the streamed reply.
pub const STREAM_CONTENT_TYPE: &str = "application/json";

const CHANNEL_CAPACITY: usize = 16;

/// Where a turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Body read, not yet checked.
    Received,
    /// Required fields present.
    Validated,
    /// Waiting for the session and the upstream call.
    ResolvingSession,
    /// Fragments are being forwarded.
    Streaming,
    /// Upstream ended cleanly.
    Completed,
    /// Turn ended with an error.
    Failed,
}

impl TurnPhase {
    /// Lowercase name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::ResolvingSession => "resolving_session",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `POST /generate`: conversational turn with session history.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    request: TurnRequest,
) -> Result<Response, RelayError> {
    relay_turn(state, request, Mode::Conversational).await
}

/// `POST /search`: single grounded turn, no history.
pub async fn search(
    State(state): State<Arc<AppState>>,
    request: TurnRequest,
) -> Result<Response, RelayError> {
    relay_turn(state, request, Mode::Search).await
}

/// Run one turn and return the streaming response.
///
/// # Errors
/// Returns an error, before any byte is streamed, when a field is missing,
/// the image cannot be processed, or the upstream call is refused.
// The lease is held across the whole turn and handed to the pump.
#[allow(clippy::significant_drop_tightening)]
pub async fn relay_turn(
    state: Arc<AppState>,
    request: TurnRequest,
    mode: Mode,
) -> Result<Response, RelayError> {
    let turn = request.validate().inspect_err(|e| {
        warn!(mode = %mode, phase = %TurnPhase::Received, error = %e, "rejected turn");
    })?;
    let session_id = turn.session_id.clone();
    debug!(session_id = %session_id, mode = %mode, phase = %TurnPhase::Validated, "turn accepted");

    let parts = turn
        .into_parts(state.uploads.max_image_bytes)
        .await
        .inspect_err(|e| {
            error!(session_id = %session_id, phase = %TurnPhase::Failed, error = %e, "failed to process image");
        })?;

    debug!(session_id = %session_id, phase = %TurnPhase::ResolvingSession, "opening upstream stream");
    let (lease, chat) = if mode.uses_history() {
        let lease = state.sessions.checkout(&session_id).await;
        let chat = ChatSession::new(Arc::clone(&state.generator), lease.history());
        (Some(lease), chat)
    } else {
        let chat = ChatSession::new(Arc::clone(&state.generator), History::new())
            .with_tools(vec![Tool::google_search()]);
        (None, chat)
    };

    let stream = chat.send_message_stream(parts).await.inspect_err(|e| {
        error!(session_id = %session_id, mode = %mode, phase = %TurnPhase::Failed, error = %e, "upstream call failed");
    })?;

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(pump(stream, lease, tx, session_id, mode));

    Ok(([(CONTENT_TYPE, STREAM_CONTENT_TYPE)], Body::from_stream(rx)).into_response())
}

/// Response body side of a turn: encodes fragments as lines and notices
/// when the caller has gone away.
struct BodySink {
    tx: mpsc::Sender<io::Result<Bytes>>,
    session_id: SessionId,
    connected: bool,
}

impl BodySink {
    const fn new(tx: mpsc::Sender<io::Result<Bytes>>, session_id: SessionId) -> Self {
        Self {
            tx,
            session_id,
            connected: true,
        }
    }

    /// Send one `{"text":…}\n` line. Failures after a disconnect are ignored.
    async fn forward(&mut self, fragment: &Fragment) {
        if !self.connected {
            return;
        }
        let mut line = match serde_json::to_vec(fragment) {
            Ok(line) => line,
            Err(e) => {
                error!(session_id = %self.session_id, error = %e, "failed to encode fragment");
                return;
            }
        };
        line.push(b'\n');

        if self.tx.send(Ok(Bytes::from(line))).await.is_err() {
            self.connected = false;
            info!(session_id = %self.session_id, "client disconnected, draining upstream");
        }
    }

    /// End the body with an error so the caller sees a broken stream.
    async fn abort(&mut self, message: String) {
        if self.connected {
            let _ = self.tx.send(Err(io::Error::other(message))).await;
        }
    }
}

/// Forward fragments to the body channel and commit the history on success.
///
/// The channel is closed only after the commit, so a caller that has read the
/// whole body can rely on the history being stored.
async fn pump(
    mut stream: ChatStream,
    lease: Option<SessionLease>,
    tx: mpsc::Sender<io::Result<Bytes>>,
    session_id: SessionId,
    mode: Mode,
) {
    debug!(session_id = %session_id, phase = %TurnPhase::Streaming, "streaming reply");
    let mut sink = BodySink::new(tx, session_id.clone());
    let mut fragments = 0usize;

    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                fragments += 1;
                sink.forward(&fragment).await;
            }
            Err(e) => {
                error!(
                    session_id = %session_id,
                    mode = %mode,
                    phase = %TurnPhase::Failed,
                    fragments,
                    error = %e,
                    "upstream stream failed"
                );
                sink.abort(e.to_string()).await;
                return;
            }
        }
    }

    let response_len = stream.response_text().len();
    commit(stream, lease, &session_id);

    info!(
        session_id = %session_id,
        mode = %mode,
        phase = %TurnPhase::Completed,
        fragments,
        response_len,
        "turn completed"
    );
    drop(sink);
}

fn commit(stream: ChatStream, lease: Option<SessionLease>, session_id: &SessionId) {
    if let (Some(lease), Some(history)) = (lease, stream.into_history()) {
        debug!(session_id = %session_id, turns = history.len(), "committing history");
        lease.commit(history);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use axum::Router;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::gemini::testing::ScriptedClient;
    use crate::gemini::Role;
    use crate::server::create_router;
    use crate::server::state::UploadSettings;

    const BOUNDARY: &str = "relay-test-boundary";

    struct Harness {
        client: Arc<ScriptedClient>,
        state: Arc<AppState>,
        router: Router,
        uploads: tempfile::TempDir,
    }

    fn harness(client: ScriptedClient) -> Harness {
        let uploads = tempfile::tempdir().unwrap();
        let client = Arc::new(client);
        let settings = UploadSettings {
            dir: uploads.path().to_path_buf(),
            max_image_bytes: 1024,
        };
        let state = Arc::new(AppState::new(client.clone(), settings));
        Harness {
            client,
            router: create_router(Arc::clone(&state)),
            state,
            uploads,
        }
    }

    fn multipart(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post(path: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> Response {
        router.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn reply_text(body: &str) -> String {
        body.lines()
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str::<Fragment>(line).unwrap().text)
            .collect()
    }

    fn upload_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    fn session(token: &str) -> SessionId {
        SessionId::parse(token).unwrap()
    }

    #[tokio::test]
    async fn test_missing_prompt_is_rejected_without_upstream_call() {
        let h = harness(ScriptedClient::new(&["unused"]));

        let response = send(&h.router, post("/generate", multipart(&[("sessionId", "s1")], None))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Prompt and sessionId are required" }));
        assert_eq!(h.client.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_session_id_is_rejected() {
        let h = harness(ScriptedClient::new(&["unused"]));

        let body = multipart(&[("prompt", "hi"), ("sessionId", "")], None);
        let response = send(&h.router, post("/search", body)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.client.calls(), 0);
    }

    #[tokio::test]
    async fn test_fragments_are_streamed_in_order() {
        let h = harness(ScriptedClient::new(&["Bitcoin ", "is a ", "cryptocurrency."]));

        let body = multipart(&[("prompt", "What is Bitcoin?"), ("sessionId", "s1")], None);
        let response = send(&h.router, post("/generate", body)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], STREAM_CONTENT_TYPE);
        let text = body_text(response).await;
        assert_eq!(text.lines().count(), 3);
        assert_eq!(reply_text(&text), "Bitcoin is a cryptocurrency.");
    }

    #[tokio::test]
    async fn test_second_turn_sees_first_exchange() {
        let h = harness(ScriptedClient::new(&["A cryptocurrency."]));

        let first = multipart(&[("prompt", "What is Bitcoin?"), ("sessionId", "s1")], None);
        body_text(send(&h.router, post("/generate", first)).await).await;

        let history = h.state.sessions.get(&session("s1")).await.unwrap();
        assert_eq!(history.len(), 2);

        let second = multipart(&[("prompt", "Who made it?"), ("sessionId", "s1")], None);
        body_text(send(&h.router, post("/generate", second)).await).await;

        let request = h.client.last_request().unwrap();
        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[0].text(), "What is Bitcoin?");
        assert_eq!(request.contents[1].role, Role::Model);
        assert_eq!(request.contents[1].text(), "A cryptocurrency.");
        assert_eq!(request.contents[2].text(), "Who made it?");
        assert!(request.tools.is_empty());

        assert_eq!(h.state.sessions.get(&session("s1")).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let h = harness(ScriptedClient::new(&["ok"]));

        let first = multipart(&[("prompt", "one"), ("sessionId", "s1")], None);
        body_text(send(&h.router, post("/generate", first)).await).await;
        let other = multipart(&[("prompt", "two"), ("sessionId", "s2")], None);
        body_text(send(&h.router, post("/generate", other)).await).await;

        let request = h.client.last_request().unwrap();
        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.contents[0].text(), "two");
    }

    #[tokio::test]
    async fn test_search_is_grounded_and_stateless() {
        let h = harness(ScriptedClient::new(&["Price is ", "up."]));

        let body = multipart(&[("prompt", "BTC price today?"), ("sessionId", "s1")], None);
        let response = send(&h.router, post("/search", body)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(reply_text(&body_text(response).await), "Price is up.");

        let request = h.client.last_request().unwrap();
        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.tools, vec![Tool::google_search()]);
        assert!(h.state.sessions.get(&session("s1")).await.is_none());
    }

    #[tokio::test]
    async fn test_image_is_sent_after_text_and_removed() {
        let h = harness(ScriptedClient::new(&["A coin."]));

        let body = multipart(
            &[("prompt", "What is this?"), ("sessionId", "s1")],
            Some(("coin.png", b"png bytes")),
        );
        let response = send(&h.router, post("/generate", body)).await;

        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await;

        let request = h.client.last_request().unwrap();
        let parts = &request.contents[0].parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].as_text(), Some("What is this?"));
        assert!(parts[1].as_text().is_none());
        assert_eq!(upload_count(h.uploads.path()), 0);
    }

    #[tokio::test]
    async fn test_empty_image_fails_and_is_removed() {
        let h = harness(ScriptedClient::new(&["unused"]));

        let body = multipart(
            &[("prompt", "What is this?"), ("sessionId", "s1")],
            Some(("coin.png", b"")),
        );
        let response = send(&h.router, post("/generate", body)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Failed to process image" }));
        assert_eq!(h.client.calls(), 0);
        assert_eq!(upload_count(h.uploads.path()), 0);
    }

    #[tokio::test]
    async fn test_oversized_image_fails_like_any_bad_image() {
        for size in [2 * 1024, 70 * 1024] {
            let h = harness(ScriptedClient::new(&["unused"]));

            let image = vec![0u8; size];
            let body = multipart(
                &[("prompt", "What is this?"), ("sessionId", "s1")],
                Some(("coin.png", image.as_slice())),
            );
            let response = send(&h.router, post("/generate", body)).await;

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{size} bytes");
            let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
            assert_eq!(json, serde_json::json!({ "error": "Failed to process image" }));
            assert_eq!(h.client.calls(), 0);
            assert_eq!(upload_count(h.uploads.path()), 0);
        }
    }

    #[tokio::test]
    async fn test_missing_prompt_wins_over_oversized_image() {
        let h = harness(ScriptedClient::new(&["unused"]));

        let image = vec![0u8; 70 * 1024];
        let body = multipart(&[("sessionId", "s1")], Some(("coin.png", image.as_slice())));
        let response = send(&h.router, post("/generate", body)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Prompt and sessionId are required" }));
        assert_eq!(upload_count(h.uploads.path()), 0);
    }

    #[tokio::test]
    async fn test_unselected_file_input_is_ignored() {
        let h = harness(ScriptedClient::new(&["ok"]));

        let body = multipart(&[("prompt", "hi"), ("sessionId", "s1")], Some(("", b"")));
        let response = send(&h.router, post("/generate", body)).await;

        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await;
        assert_eq!(h.client.last_request().unwrap().contents[0].parts.len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_refusal_is_a_json_error() {
        let h = harness(ScriptedClient::new(&[]).failing_to_start());

        let body = multipart(&[("prompt", "hi"), ("sessionId", "s1")], None);
        let response = send(&h.router, post("/generate", body)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Failed to generate response" }));
        assert!(h.state.sessions.get(&session("s1")).await.is_none());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_aborts_body_and_skips_history() {
        let h = harness(ScriptedClient::new(&["one ", "two ", "three"]).failing_after(2));

        let body = multipart(&[("prompt", "hi"), ("sessionId", "s1")], None);
        let response = send(&h.router, post("/generate", body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let mut frames = response.into_body().into_data_stream();
        let mut received = Vec::new();
        let mut failed = false;
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(bytes) => received.extend_from_slice(&bytes),
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }

        assert!(failed);
        assert_eq!(reply_text(&String::from_utf8(received).unwrap()), "one two ");
        assert!(h.state.sessions.get(&session("s1")).await.is_none());
    }

    #[tokio::test]
    async fn test_disconnected_client_still_records_history() {
        let h = harness(ScriptedClient::new(&["a", "b", "c"]));

        let body = multipart(&[("prompt", "hi"), ("sessionId", "s1")], None);
        let response = send(&h.router, post("/generate", body)).await;
        drop(response);

        let history = tokio::time::timeout(
            Duration::from_secs(1),
            h.state.sessions.get(&session("s1")),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(history.contents()[1].text(), "abc");
    }

    #[tokio::test]
    async fn test_json_body_is_accepted() {
        let h = harness(ScriptedClient::new(&["hello"]));

        let request = Request::builder()
            .method("POST")
            .uri("/generate")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"prompt":"hi","sessionId":"s1"}"#))
            .unwrap();
        let response = send(&h.router, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(reply_text(&body_text(response).await), "hello");
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_bad_request() {
        let h = harness(ScriptedClient::new(&["unused"]));

        let request = Request::builder()
            .method("POST")
            .uri("/generate")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = send(&h.router, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.client.calls(), 0);
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(TurnPhase::ResolvingSession.to_string(), "resolving_session");
        assert_eq!(TurnPhase::Completed.as_str(), "completed");
    }
}
