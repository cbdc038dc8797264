//! Client side of the transfer endpoints.

use std::io::Read;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::header::{IF_RANGE, RANGE};
use reqwest::{StatusCode, Url};
use tracing::debug;

use super::config::DownloaderConfig;
use crate::error::{SyncError, SyncResult};
use crate::http_date::format_http_date;
use crate::manifest::FolderManifest;
use crate::store::Chunk;

/// Idle connections are dropped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Deadline for establishing a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the manifest request.
const MANIFEST_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Upper bound on idle pooled connections per host.
const MAX_IDLE_PER_HOST: usize = 512;

/// One byte-range request.
#[derive(Debug, Clone)]
pub struct RangeRequest<'a> {
    pub game_id: u64,
    /// Path relative to the game folder, `/` separated.
    pub rel_path: &'a str,
    pub chunk: Chunk,
    /// Source modification time the chunk state was recorded against.
    pub if_range: DateTime<Utc>,
}

/// Transport used by the downloader.
///
/// Implementations must be callable from many pool threads at once.
pub trait TransferClient: Send + Sync {
    /// Fetch and decode the manifest of a game.
    fn fetch_manifest(&self, game_id: u64) -> SyncResult<FolderManifest>;

    /// Start a range request and return a reader over exactly the requested
    /// bytes.
    ///
    /// Must fail when the peer answers with anything but a partial response,
    /// since a full body would be written at the chunk's offset.
    fn fetch_range(&self, request: &RangeRequest<'_>) -> SyncResult<Box<dyn Read + Send>>;
}

/// [`TransferClient`] over blocking reqwest.
///
/// Must not be used from inside an async runtime context.
#[derive(Debug, Clone)]
pub struct HttpTransferClient {
    client: Client,
    base: Url,
    chunk_timeout: Duration,
}

impl HttpTransferClient {
    /// Build a client for the endpoints under `config.server_url`.
    pub fn new(config: &DownloaderConfig) -> SyncResult<Self> {
        let base = Url::parse(config.server_url.trim_end_matches('/')).map_err(|e| {
            SyncError::InvalidConfig(format!("server url {}: {e}", config.server_url))
        })?;
        if base.cannot_be_a_base() {
            return Err(SyncError::InvalidConfig(format!(
                "server url {} cannot carry a path",
                config.server_url
            )));
        }

        let idle_per_host = config
            .max_concurrent_files
            .saturating_mul(config.max_concurrent_chunks)
            .min(MAX_IDLE_PER_HOST);

        let client = Client::builder()
            .user_agent(concat!("frost/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(idle_per_host)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Init {
                component: "http client",
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base,
            chunk_timeout: config.chunk_timeout,
        })
    }

    /// `<base>/meta/<game id>`
    pub fn manifest_url(&self, game_id: u64) -> Url {
        self.endpoint(&["meta", &game_id.to_string()])
    }

    /// `<base>/load/<game id>/<escaped rel path>`
    pub fn load_url(&self, game_id: u64, rel_path: &str) -> Url {
        let mut segments = vec!["load".to_string(), game_id.to_string()];
        segments.extend(rel_path.split('/').map(str::to_string));
        self.endpoint(&segments)
    }

    fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment.as_ref());
            }
        }
        url
    }
}

fn send_error(url: &Url, timeout: Duration, e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout {
            url: url.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        SyncError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Turn an error status into [`SyncError::HttpStatus`] carrying the body text.
fn check_status(url: &Url, response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.as_u16() >= 400 {
        let body = response.text().unwrap_or_default();
        return Err(SyncError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }
    Ok(response)
}

impl TransferClient for HttpTransferClient {
    fn fetch_manifest(&self, game_id: u64) -> SyncResult<FolderManifest> {
        let url = self.manifest_url(game_id);
        debug!(url = %url, "fetching manifest");

        let response = self
            .client
            .get(url.clone())
            .timeout(MANIFEST_TIMEOUT)
            .send()
            .map_err(|e| send_error(&url, MANIFEST_TIMEOUT, e))?;
        let response = check_status(&url, response)?;

        FolderManifest::from_msgpack(response).map_err(|e| SyncError::MetadataFetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn fetch_range(&self, request: &RangeRequest<'_>) -> SyncResult<Box<dyn Read + Send>> {
        let url = self.load_url(request.game_id, request.rel_path);

        let response = self
            .client
            .get(url.clone())
            .header(RANGE, request.chunk.range_header())
            .header(IF_RANGE, format_http_date(request.if_range))
            .timeout(self.chunk_timeout)
            .send()
            .map_err(|e| send_error(&url, self.chunk_timeout, e))?;
        let response = check_status(&url, response)?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(SyncError::RangeNotSatisfied {
                status: response.status().as_u16(),
            });
        }

        Ok(Box::new(response))
    }
}
