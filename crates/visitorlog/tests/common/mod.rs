//! Common test utilities.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use visitorlog::server::{self, AppState};
use visitorlog::{LocalCache, Record, RecordDraft, RemoteStore, Storage};

pub const FIREFOX_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Body limit used by test apps.
pub const TEST_BODY_LIMIT: usize = 128_000;

/// App over an in-memory store with the given cap.
pub fn test_app_with_cap(max_records: usize) -> Router {
    let storage = Storage::open_in_memory()
        .unwrap()
        .with_max_records(max_records);
    server::build_app(AppState::new(storage, 5000), TEST_BODY_LIMIT, None)
}

/// App over an in-memory store with the default cap.
pub fn test_app() -> Router {
    test_app_with_cap(400)
}

/// A finalized record from `ip`, as a browser would capture it.
pub fn sample_record(ip: &str) -> Record {
    RecordDraft {
        page: "/codex/index.html".to_string(),
        reason: "initial-load".to_string(),
        ip: ip.to_string(),
        browser: "Firefox".to_string(),
        os: "Linux".to_string(),
        timezone: "Europe/Berlin".to_string(),
        user_agent: FIREFOX_UA.to_string(),
        ..RecordDraft::default()
    }
    .finalize()
}

/// A server bound to an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Serve `app` on `127.0.0.1:0`.
    pub async fn spawn(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    /// API URL under the root path.
    pub fn api_url(&self) -> String {
        format!("http://{}/api/visitors", self.addr)
    }

    /// Remote client for this server.
    pub fn remote(&self) -> RemoteStore {
        RemoteStore::new(self.api_url(), Duration::from_secs(5)).unwrap()
    }

    /// Stop accepting connections and wait for the server to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap();
        }
    }
}

/// A remote client pointed at a closed port.
pub fn unreachable_remote() -> RemoteStore {
    RemoteStore::new("http://127.0.0.1:9/api/visitors", Duration::from_millis(500)).unwrap()
}

/// A cache in `dir` with the default key.
pub fn cache_in(dir: &tempfile::TempDir) -> LocalCache {
    LocalCache::new(dir.path().join("cache"), "codex-visitor-log-v1", 400)
}
