//! Transfer endpoints.
//!
//! ```text
//! GET <base>/meta/{game_id}            MessagePack FolderManifest
//! GET <base>/load/{game_id}/{rel_path} file bytes, Range / If-Range aware
//! ```
//!
//! Manifest generation and file opening are blocking and run on the blocking
//! pool; file bodies are streamed.

mod range;

pub use range::{parse_range, RangeSpec, ServePlan};

use std::io::{ErrorKind, SeekFrom};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, IF_RANGE, LAST_MODIFIED, RANGE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::http_date::format_http_date;
use crate::manifest::{DirectoryLibrary, GameFile, HeedManifestStore, ManifestService};

/// Default path prefix of the transfer endpoints.
pub const DEFAULT_BASE_PATH: &str = "/api/server/library/download";

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:6699";

/// Settings for the transfer server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Root holding one folder per game id.
    pub library_root: PathBuf,
    /// Directory of the manifest database.
    pub manifest_db: PathBuf,
    /// Path prefix the endpoints are mounted under.
    pub base_path: String,
    /// Generate missing manifests at startup.
    pub backfill_on_start: bool,
}

impl ServerConfig {
    pub fn new(library_root: impl Into<PathBuf>, manifest_db: impl Into<PathBuf>) -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 6699)),
            library_root: library_root.into(),
            manifest_db: manifest_db.into(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            backfill_on_start: true,
        }
    }

    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_backfill_on_start(mut self, enabled: bool) -> Self {
        self.backfill_on_start = enabled;
        self
    }
}

#[derive(Clone)]
struct AppState {
    manifests: Arc<ManifestService>,
}

/// Build the router with the endpoints mounted under `base_path`.
pub fn router(manifests: Arc<ManifestService>, base_path: &str) -> Router {
    let routes = Router::new()
        .route("/meta/:game_id", get(meta))
        .route("/load/:game_id/*rel_path", get(load))
        .with_state(AppState { manifests });

    let base = base_path.trim_end_matches('/');
    if base.is_empty() {
        routes
    } else {
        Router::new().nest(base, routes)
    }
}

/// Transfer server bound to its listen address.
pub struct TransferServer {
    listener: TcpListener,
    router: Router,
    manifests: Arc<ManifestService>,
    backfill_on_start: bool,
}

impl TransferServer {
    /// Open the manifest store and bind the listener.
    pub async fn bind(config: &ServerConfig) -> SyncResult<Self> {
        let store = HeedManifestStore::open(&config.manifest_db)?;
        let manifests = Arc::new(ManifestService::new(
            Arc::new(DirectoryLibrary::new(&config.library_root)),
            Arc::new(store),
        ));

        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|e| SyncError::Init {
                component: "listener",
                reason: format!("{}: {e}", config.listen),
            })?;

        Ok(Self {
            router: router(Arc::clone(&manifests), &config.base_path),
            listener,
            manifests,
            backfill_on_start: config.backfill_on_start,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SyncResult<SocketAddr> {
        self.listener.local_addr().map_err(|e| SyncError::Init {
            component: "listener",
            reason: e.to_string(),
        })
    }

    pub fn manifests(&self) -> &Arc<ManifestService> {
        &self.manifests
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> SyncResult<()> {
        if self.backfill_on_start {
            let manifests = Arc::clone(&self.manifests);
            tokio::task::spawn_blocking(move || match manifests.backfill() {
                Ok(0) => debug!("no manifests to backfill"),
                Ok(n) => info!(count = n, "backfilled manifests"),
                Err(e) => error!(error = %e, "manifest backfill failed"),
            });
        }

        info!(addr = %self.local_addr()?, "transfer server listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| SyncError::Init {
                component: "server",
                reason: e.to_string(),
            })
    }
}

fn error_response(e: SyncError) -> Response {
    let status = match &e {
        SyncError::GameNotFound(_) => StatusCode::NOT_FOUND,
        SyncError::GameIncomplete(_) => StatusCode::CONFLICT,
        SyncError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        SyncError::ReadFailed { source, .. } if source.kind() == ErrorKind::NotFound => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(error = %e, "request failed");
    } else {
        debug!(error = %e, status = %status, "request rejected");
    }

    (status, e.to_string()).into_response()
}

async fn blocking<T, F>(f: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> SyncResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(error_response(e)),
        Err(e) => {
            error!(error = %e, "blocking task failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

async fn meta(State(state): State<AppState>, Path(game_id): Path<u64>) -> Response {
    let manifests = state.manifests;
    let result = blocking(move || {
        let mut buf = Vec::new();
        manifests.write_manifest(game_id, &mut buf)?;
        Ok(buf)
    })
    .await;

    match result {
        Ok(buf) => (
            [(CONTENT_TYPE, HeaderValue::from_static("application/msgpack"))],
            buf,
        )
            .into_response(),
        Err(response) => response,
    }
}

async fn load(
    State(state): State<AppState>,
    Path((game_id, rel_path)): Path<(u64, String)>,
    headers: HeaderMap,
) -> Response {
    let manifests = state.manifests;
    let game_file = match blocking(move || manifests.open_file(game_id, &rel_path)).await {
        Ok(file) => file,
        Err(response) => return response,
    };

    let range = headers.get(RANGE).and_then(|v| v.to_str().ok());
    let if_range = headers.get(IF_RANGE).and_then(|v| v.to_str().ok());
    let plan = ServePlan::for_request(range, if_range, game_file.size, game_file.modified);

    match stream_file(game_file, plan).await {
        Ok(response) => response,
        Err(e) => error_response(e),
    }
}

async fn stream_file(game_file: GameFile, plan: ServePlan) -> SyncResult<Response> {
    let GameFile {
        file,
        path,
        size,
        modified,
    } = game_file;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(&format_http_date(modified)) {
        headers.insert(LAST_MODIFIED, value);
    }

    let (status, start, len) = match plan {
        ServePlan::Full => (StatusCode::OK, 0, size),
        ServePlan::Partial { start, end } => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes {start}-{end}/{size}")) {
                headers.insert(CONTENT_RANGE, value);
            }
            (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
        }
        ServePlan::Unsatisfiable => {
            warn!(file = %path.display(), size, "unsatisfiable range");
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                headers.insert(CONTENT_RANGE, value);
            }
            return Ok((StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response());
        }
    };

    let mut file = tokio::fs::File::from_std(file);
    if start > 0 {
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| SyncError::ReadFailed {
                path: path.clone(),
                source: e,
            })?;
    }

    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );

    let body = Body::from_stream(ReaderStream::new(file.take(len)));
    Ok((status, headers, body).into_response())
}
