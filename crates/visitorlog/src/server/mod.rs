//! HTTP API for the server-side visitor log.
//!
//! ```text
//! GET    /api/visitors?limit=N   -> { records, count, stored_file }
//! POST   /api/visitors           -> 201 { ok, stored, stored_file }
//! DELETE /api/visitors           -> { ok, stored: 0, stored_file }
//! ```
//!
//! The same routes answer under `/codex/api/visitors`.

mod handlers;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{API_PATH, CODEX_API_PATH};
use crate::config::Config;
use crate::error::Result;
use crate::storage::Storage;

/// Shared server state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The visitor log.
    pub storage: Arc<Mutex<Storage>>,
    /// Upper bound for `limit`.
    pub max_list_limit: usize,
    /// Location reported to clients as `stored_file`.
    pub stored_file: String,
}

impl AppState {
    /// State over an opened store.
    #[must_use]
    pub fn new(storage: Storage, max_list_limit: usize) -> Self {
        let stored_file = storage.path().display().to_string();
        Self {
            storage: Arc::new(Mutex::new(storage)),
            max_list_limit: max_list_limit.max(1),
            stored_file,
        }
    }
}

/// Build the router.
///
/// Non-API paths are served from `static_dir` when one is given.
pub fn build_app(state: AppState, max_body_bytes: usize, static_dir: Option<PathBuf>) -> Router {
    let mut api = Router::new();
    for path in [API_PATH, CODEX_API_PATH] {
        let visitors = get(handlers::list_visitors)
            .post(handlers::append_visitor)
            .delete(handlers::clear_visitors)
            .options(handlers::visitors_options);
        api = api
            .route(path, visitors.clone())
            .route(&format!("{path}/"), visitors);
    }

    let app = Router::new()
        .route("/livez", get(handlers::livez))
        .merge(api)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.layer(TraceLayer::new_for_http())
}

/// Open the configured store and serve until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the listener fails.
pub async fn serve(config: &Config) -> Result<()> {
    let storage =
        Storage::open(config.database_path())?.with_max_records(config.storage.max_records);
    let state = AppState::new(storage, config.server.max_list_limit);
    let app = build_app(
        state,
        config.server.max_body_bytes,
        config.server.static_dir.clone(),
    );

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    let local = listener.local_addr()?;

    info!(addr = %local, "Serving visitor API at http://{local}{API_PATH} and {CODEX_API_PATH}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        () = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
