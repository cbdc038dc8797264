//! Per-game transfer orchestration.
//!
//! A [`Transfer`] drives one game through its status lifecycle: fetch the
//! manifest, then set up and download every file on a bounded set of file
//! workers, each of which fans its chunks out on its own chunk pool.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::TransferClient;
use super::config::DownloaderConfig;
use super::file::ChunkedDownloader;
use super::progress::{ProgressCounters, ProgressReporter, ProgressSink, TransferProgress};
use super::state::{StatusUpdate, TransferStatus};
use crate::error::{SyncError, SyncResult};
use crate::manifest::FolderManifest;
use crate::store::{ChunkStore, FileProgress};

/// One in-flight game transfer.
pub struct Transfer {
    game_id: u64,
    dest: PathBuf,
    config: DownloaderConfig,
    client: Arc<dyn TransferClient>,
    store: Arc<dyn ChunkStore>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    counters: Arc<ProgressCounters>,
    status: Mutex<StatusUpdate>,
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("game_id", &self.game_id)
            .field("dest", &self.dest)
            .field("status", &self.status.lock().status)
            .finish()
    }
}

impl Transfer {
    pub fn new(
        game_id: u64,
        dest: impl Into<PathBuf>,
        config: DownloaderConfig,
        client: Arc<dyn TransferClient>,
        store: Arc<dyn ChunkStore>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            game_id,
            dest: dest.into(),
            config,
            client,
            store,
            sink,
            cancel: CancellationToken::new(),
            counters: Arc::new(ProgressCounters::new()),
            status: Mutex::new(StatusUpdate::queued(game_id)),
        }
    }

    pub fn game_id(&self) -> u64 {
        self.game_id
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Latest status update.
    pub fn status(&self) -> StatusUpdate {
        self.status.lock().clone()
    }

    /// Live byte and file counts.
    pub fn counters(&self) -> TransferProgress {
        self.counters.snapshot()
    }

    /// Per-file chunk-store progress.
    pub fn progress(&self) -> SyncResult<Vec<FileProgress>> {
        self.store.progress()
    }

    /// Request cancellation. In-flight chunks stop at their next read.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn set_status(&self, status: TransferStatus, message: impl Into<String>) {
        let update = {
            let mut current = self.status.lock();
            current.transition(status, message);
            current.clone()
        };
        self.sink.report_status(&update);
    }

    /// Run the transfer to a terminal status.
    pub fn run(&self) -> TransferStatus {
        let started = Instant::now();
        self.sink.report_status(&self.status());

        let status = match self.run_inner() {
            Ok(()) => {
                self.sink.on_complete(self.game_id, &self.dest);
                self.set_status(TransferStatus::Complete, "download complete");
                TransferStatus::Complete
            }
            Err(e) if e.is_cancelled() => {
                self.set_status(TransferStatus::Cancelled, "download cancelled");
                TransferStatus::Cancelled
            }
            Err(SyncError::MetadataFetchFailed { reason, .. }) => {
                self.set_status(
                    TransferStatus::Error,
                    format!("could not download metadata: {reason}"),
                );
                TransferStatus::Error
            }
            Err(e) => {
                self.set_status(TransferStatus::Error, e.to_string());
                TransferStatus::Error
            }
        };

        info!(
            game = self.game_id,
            status = %status,
            elapsed = ?started.elapsed(),
            "transfer finished"
        );
        status
    }

    fn run_inner(&self) -> SyncResult<()> {
        self.set_status(TransferStatus::Metadata, "downloading metadata");

        let manifest = self.client.fetch_manifest(self.game_id).map_err(|e| match e {
            e @ SyncError::MetadataFetchFailed { .. } => e,
            e => SyncError::MetadataFetchFailed {
                url: format!("meta/{}", self.game_id),
                reason: e.to_string(),
            },
        })?;

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.set_status(
            TransferStatus::Downloading,
            format!("downloading {} files", manifest.files.len()),
        );
        self.download_files(&manifest)
    }

    fn download_files(&self, manifest: &FolderManifest) -> SyncResult<()> {
        let downloader = ChunkedDownloader::new(
            self.game_id,
            &self.dest,
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            self.config.max_concurrent_chunks,
            self.config.chunk_size,
            self.cancel.clone(),
            Arc::clone(&self.counters),
        );

        self.counters
            .set_totals(manifest.total_size, manifest.files.len());

        let reporter = ProgressReporter::start(
            self.game_id,
            Arc::clone(&self.counters),
            Arc::clone(&self.sink),
            self.config.progress_interval,
        );

        let failures: Mutex<Vec<(String, SyncError)>> = Mutex::new(Vec::new());
        let next = AtomicUsize::new(0);
        let workers = self
            .config
            .max_concurrent_files
            .min(manifest.files.len())
            .max(1);

        debug!(game = self.game_id, workers, files = manifest.files.len(), "starting file workers");

        thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(entry) = manifest.files.get(index) else {
                        break;
                    };
                    if self.cancel.is_cancelled() {
                        break;
                    }

                    match downloader.download(entry) {
                        Ok(()) => self.counters.file_completed(),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => {
                            warn!(file = %entry.rel_path, error = %e, "error downloading file");
                            self.counters.file_failed();
                            failures.lock().push((entry.rel_path.clone(), e));
                        }
                    }
                });
            }
        });

        reporter.stop();

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut failures = failures.into_inner();
        if failures.is_empty() {
            return Ok(());
        }

        failures.sort_by(|a, b| a.0.cmp(&b.0));
        let message = failures
            .iter()
            .map(|(file, e)| format!("{file}: {e}"))
            .collect::<Vec<_>>()
            .join("\n");

        Err(SyncError::DownloadFailed {
            url: format!("{} of {} files", failures.len(), manifest.files.len()),
            reason: format!("error occurred while downloading files:\n{message}"),
        })
    }
}
