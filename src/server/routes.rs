//! HTTP routes for the assistant API.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::services::ServeDir;

use super::relay::{generate, search};
use super::state::AppState;
use crate::session::Mode;

/// Room left in the body limit for the text fields and multipart framing.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state
        .uploads
        .max_image_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);

    let router = Router::new()
        .route("/health", get(health_check))
        .route(Mode::Conversational.path(), post(generate))
        .route(Mode::Search.path(), post(search))
        .layer(DefaultBodyLimit::max(body_limit));

    let router = match &state.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "crypto-assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.len()
    }))
}
