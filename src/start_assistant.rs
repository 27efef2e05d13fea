//! Startup helpers for the crypto assistant server.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use crate::config::AssistantConfig;
use crate::server::{self, AppState};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run the server (used by the `crypto-assistant` binary).
///
/// Stops gracefully on Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting crypto assistant v{}", env!("CARGO_PKG_VERSION"));

    match start() {
        Ok(()) => {
            tracing::info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

fn start() -> Result<(), BoxError> {
    let config = AssistantConfig::from_env().map_err(|e| format!("Invalid configuration: {e}"))?;
    let rt = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create runtime: {e}"))?;
    rt.block_on(serve(&config))
        .map_err(|e| format!("Server error: {e}"))?;
    Ok(())
}

/// Initialize application state without starting the server.
///
/// Creates the upload directory if needed.
///
/// # Errors
/// Returns an error if the upload directory or the Gemini client cannot be
/// created.
pub async fn initialize(
    config: &AssistantConfig,
) -> Result<Arc<AppState>, BoxError> {
    tokio::fs::create_dir_all(&config.uploads.dir)
        .await
        .map_err(|e| format!("Failed to create upload dir {}: {e}", config.uploads.dir.display()))?;
    tracing::info!("Upload directory: {}", config.uploads.dir.display());

    if let Some(dir) = &config.static_dir {
        tracing::info!("Serving static files from {}", dir.display());
    }

    AppState::from_config(config).map_err(|e| format!("Failed to create state: {e}").into())
}

/// Run server with graceful shutdown.
///
/// # Errors
/// Returns an error if the server fails.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> Result<(), BoxError>
where
    F: Future<Output = ()> + Send + 'static,
{
    server::run_server_with_shutdown(state, port, shutdown_signal).await
}

async fn serve(config: &AssistantConfig) -> Result<(), BoxError> {
    let state = initialize(config).await?;
    run_server_with_shutdown(state, config.port, shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
