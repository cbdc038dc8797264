//! Downloader settings.

use std::path::PathBuf;
use std::time::Duration;

/// Default size of a chunk (128 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 128 * 1024 * 1024;

/// Default number of files transferred at once per game.
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 50;

/// Default number of chunks transferred at once per file.
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 100;

/// Default deadline for a single range request (30 minutes).
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default base URL of the transfer endpoints.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:6699/api/server/library/download";

/// Interval at which live progress is pushed to the sink.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Settings for client-side transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    /// Base URL of the transfer endpoints (`<base>/meta`, `<base>/load`).
    pub server_url: String,
    /// Root under which each game lands in `<root>/<game id>`.
    pub download_dir: PathBuf,
    pub chunk_size: u64,
    pub max_concurrent_files: usize,
    pub max_concurrent_chunks: usize,
    /// Deadline for one range request including its body.
    pub chunk_timeout: Duration,
    pub progress_interval: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            download_dir: default_download_dir(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl DownloaderConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Set the chunk size. Zero is raised to one byte.
    pub fn with_chunk_size(mut self, size: u64) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the per-game file concurrency. Zero is raised to one.
    pub fn with_max_concurrent_files(mut self, n: usize) -> Self {
        self.max_concurrent_files = n.max(1);
        self
    }

    /// Set the per-file chunk concurrency. Zero is raised to one.
    pub fn with_max_concurrent_chunks(mut self, n: usize) -> Self {
        self.max_concurrent_chunks = n.max(1);
        self
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// `<download dir>/frost`, or `./downloads` when the platform has none.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .map(|d| d.join("frost"))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}
