//! HTTP service
//!
//! Builds the axum router over [`AppState`], runs the listener with graceful
//! shutdown and, when configured, the hourly storage retention task.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use routes::IMAGE_TYPE_HEADER;
pub use state::AppState;

use crate::error::Result;
use crate::services::FileStorageService;
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Extra body allowance for multipart framing on top of the file limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// How often retention cleanup runs
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(3600);

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let prefix = state.config.api_prefix.clone();
    let body_limit = state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    let api = routes::api_routes();
    let app = Router::new().route("/", get(routes::root));
    let app = if prefix.is_empty() {
        app.merge(api)
    } else {
        app.nest(&prefix, api)
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Periodically delete stored files older than `retention_days`
pub fn spawn_retention_task(storage: FileStorageService, retention_days: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RETENTION_INTERVAL);
        loop {
            interval.tick().await;
            match storage.cleanup_old_files(retention_days).await {
                Ok(deleted) if deleted > 0 => info!(deleted, retention_days, "Storage retention pass"),
                Ok(_) => {},
                Err(e) => warn!(error = %e, "Storage retention pass failed"),
            }
        }
    })
}

/// Bind and serve until Ctrl+C or SIGTERM
///
/// # Errors
/// - `Io` when the listener cannot bind or the server fails
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.bind_address();

    let retention = match (&state.storage, state.config.storage_retention_days) {
        (Some(storage), Some(days)) => Some(spawn_retention_task(storage.clone(), days)),
        _ => None,
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        api_prefix = %state.config.api_prefix,
        max_file_size = state.config.max_file_size,
        storage_enabled = state.storage.is_some(),
        models_dir = %state.config.models_dir.display(),
        "Server ready and accepting connections"
    );

    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = retention {
        handle.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received terminate signal"),
    }

    info!("Shutting down gracefully");
}
