use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Uri;
use axum::routing::{delete, get, post};
use axum::Router;
use fileindex::path::key_from_request_path;
use fileindex::{CacheStore, SyncTrigger};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{ServerError, ServerResult};

pub mod error;
pub mod files;
pub mod list;

/// Shared state handed to every handler.
pub struct ServerState {
    pub store: Arc<CacheStore>,
    /// Directory that cache entries and uploads live under.
    pub base_dir: PathBuf,
    sync: Option<SyncTrigger>,
}

impl ServerState {
    pub fn new(store: Arc<CacheStore>, base_dir: PathBuf) -> Self {
        Self {
            store,
            base_dir,
            sync: None,
        }
    }

    pub fn with_sync_trigger(mut self, trigger: SyncTrigger) -> Self {
        self.sync = Some(trigger);
        self
    }

    /// Asks the sync thread to pick up a file change early.
    pub(crate) fn request_sync(&self) {
        if let Some(trigger) = &self.sync {
            trigger.request_sync();
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);
    Router::new()
        .route("/health", get(health))
        .route("/list", get(list::list))
        .route("/list/group", get(list::list_grouped))
        .route("/detail/*key", get(list::detail))
        .route("/cycle", get(list::cycle))
        .route(
            "/content/*key",
            get(files::content).delete(files::delete_content),
        )
        .route("/delete/*key", delete(files::delete))
        // Uploads are streamed to disk, so no body size cap applies.
        .route(
            "/upload",
            post(files::upload).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/upload/",
            post(files::upload).layer(DefaultBodyLimit::disable()),
        )
        .with_state(state)
        .layer(cors)
}

/// A running HTTP listener. Dropping it stops accepting connections.
pub struct Server {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl Server {
    /// Binds `addr` and starts serving `state` on a background task.
    pub async fn start(state: Arc<ServerState>, addr: SocketAddr) -> ServerResult<Self> {
        let app = router(state);
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(Server {
            addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signals graceful shutdown. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }
    }

    /// Waits until the serve loop exits.
    pub async fn wait(mut self) -> ServerResult<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.await
            .map_err(|error| ServerError::Io(std::io::Error::other(error)))??;
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Maps a request path under `prefix` (e.g. `/detail`) to a cache key.
pub(crate) fn request_key(uri: &Uri, prefix: &str) -> String {
    let tail = uri.path().strip_prefix(prefix).unwrap_or(uri.path());
    key_from_request_path(tail)
}
