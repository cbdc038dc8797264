//! Progress reporting for game transfers.
//!
//! Chunk workers bump atomic counters; a dedicated reporter thread polls them
//! and pushes snapshots to the transfer's [`ProgressSink`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::state::{StatusUpdate, TransferStatus};

/// Receiver of transfer status and progress.
///
/// Called from pool and reporter threads; implementations must be cheap and
/// must not block for long.
pub trait ProgressSink: Send + Sync {
    /// A status transition happened.
    fn report_status(&self, update: &StatusUpdate);

    /// Periodic byte and file counts while downloading.
    fn report_progress(&self, _game_id: u64, _progress: &TransferProgress) {}

    /// Every file landed and verified; called before the `Complete` status.
    fn on_complete(&self, _game_id: u64, _dest: &Path) {}
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn report_status(&self, update: &StatusUpdate) {
        match update.status {
            TransferStatus::Error => {
                warn!(game = update.game_id, message = %update.message, "transfer failed")
            }
            status => info!(game = update.game_id, status = %status, "transfer status"),
        }
    }

    fn report_progress(&self, game_id: u64, progress: &TransferProgress) {
        debug!(
            game = game_id,
            complete = progress.complete_bytes(),
            total = progress.total_bytes,
            files_done = progress.files_completed,
            files = progress.total_files,
            "transfer progress"
        );
    }
}

/// Point-in-time counts for one transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes written during this session.
    pub bytes_written: u64,
    /// Bytes already complete in the chunk store when the session started.
    pub bytes_resumed: u64,
    /// Sum of all file sizes in the manifest.
    pub total_bytes: u64,
    pub files_completed: usize,
    pub files_failed: usize,
    pub total_files: usize,
}

impl TransferProgress {
    /// Bytes on disk that need no further transfer.
    pub fn complete_bytes(&self) -> u64 {
        (self.bytes_resumed + self.bytes_written).min(self.total_bytes)
    }

    /// Fraction complete in `0.0..=1.0`; an empty transfer counts as done.
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.complete_bytes() as f64 / self.total_bytes as f64
        }
    }
}

/// Shared counters bumped by file and chunk workers.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    bytes_written: AtomicU64,
    bytes_resumed: AtomicU64,
    total_bytes: AtomicU64,
    files_completed: AtomicUsize,
    files_failed: AtomicUsize,
    total_files: AtomicUsize,
    done: AtomicBool,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the totals once the manifest is known.
    pub fn set_totals(&self, total_bytes: u64, total_files: usize) {
        self.total_bytes.store(total_bytes, Ordering::SeqCst);
        self.total_files.store(total_files, Ordering::SeqCst);
    }

    pub fn add_resumed(&self, bytes: u64) {
        self.bytes_resumed.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn add_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn file_completed(&self) {
        self.files_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> TransferProgress {
        TransferProgress {
            bytes_written: self.bytes_written.load(Ordering::SeqCst),
            bytes_resumed: self.bytes_resumed.load(Ordering::SeqCst),
            total_bytes: self.total_bytes.load(Ordering::SeqCst),
            files_completed: self.files_completed.load(Ordering::SeqCst),
            files_failed: self.files_failed.load(Ordering::SeqCst),
            total_files: self.total_files.load(Ordering::SeqCst),
        }
    }

    /// Signal the reporter to send its final snapshot and exit.
    pub fn signal_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Granularity at which the reporter notices [`ProgressCounters::signal_done`].
const DONE_POLL: Duration = Duration::from_millis(20);

/// Background thread pushing counter snapshots to a sink.
///
/// Stops (after one final report) when dropped.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    counters: Arc<ProgressCounters>,
}

impl ProgressReporter {
    pub fn start(
        game_id: u64,
        counters: Arc<ProgressCounters>,
        sink: Arc<dyn ProgressSink>,
        interval: Duration,
    ) -> Self {
        let worker_counters = Arc::clone(&counters);

        let handle = thread::Builder::new()
            .name(format!("frost-progress-{game_id}"))
            .spawn(move || {
                let mut since_report = Duration::ZERO;
                while !worker_counters.is_done() {
                    if since_report >= interval {
                        sink.report_progress(game_id, &worker_counters.snapshot());
                        since_report = Duration::ZERO;
                    }
                    let step = DONE_POLL.min(interval.max(Duration::from_millis(1)));
                    thread::sleep(step);
                    since_report += step;
                }

                // Final report
                sink.report_progress(game_id, &worker_counters.snapshot());
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "failed to start progress reporter");
                None
            }
        };

        Self { handle, counters }
    }

    /// Stop the reporter and wait for its final report.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.counters.signal_done();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    /// Sink recording everything it receives.
    #[derive(Default)]
    pub struct RecordingSink {
        pub statuses: Mutex<Vec<StatusUpdate>>,
        pub progress: Mutex<Vec<TransferProgress>>,
        pub completed: Mutex<Vec<(u64, PathBuf)>>,
    }

    impl RecordingSink {
        pub fn status_sequence(&self) -> Vec<TransferStatus> {
            self.statuses.lock().iter().map(|u| u.status).collect()
        }

        pub fn last_status(&self) -> Option<StatusUpdate> {
            self.statuses.lock().last().cloned()
        }
    }

    impl ProgressSink for RecordingSink {
        fn report_status(&self, update: &StatusUpdate) {
            self.statuses.lock().push(update.clone());
        }

        fn report_progress(&self, _game_id: u64, progress: &TransferProgress) {
            self.progress.lock().push(progress.clone());
        }

        fn on_complete(&self, game_id: u64, dest: &Path) {
            self.completed.lock().push((game_id, dest.to_path_buf()));
        }
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = ProgressCounters::new();
        counters.set_totals(1000, 3);
        counters.add_resumed(400);
        counters.add_written(250);
        counters.add_written(50);
        counters.file_completed();
        counters.file_failed();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.bytes_written, 300);
        assert_eq!(snapshot.complete_bytes(), 700);
        assert_eq!(snapshot.files_completed, 1);
        assert_eq!(snapshot.files_failed, 1);
        assert_eq!(snapshot.total_files, 3);
        assert!((snapshot.ratio() - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_transfer_ratio() {
        assert_eq!(TransferProgress::default().ratio(), 1.0);
    }

    #[test]
    fn test_reporter_sends_final_snapshot() {
        let counters = Arc::new(ProgressCounters::new());
        let sink = Arc::new(RecordingSink::default());

        let reporter = ProgressReporter::start(
            1,
            Arc::clone(&counters),
            sink.clone(),
            Duration::from_millis(5),
        );
        counters.set_totals(10, 1);
        counters.add_written(10);
        reporter.stop();

        let progress = sink.progress.lock();
        assert!(!progress.is_empty());
        assert_eq!(progress.last().unwrap().bytes_written, 10);
        assert!(counters.is_done());
    }

    #[test]
    fn test_reporter_stops_on_drop() {
        let counters = Arc::new(ProgressCounters::new());
        let sink = Arc::new(RecordingSink::default());
        {
            let _reporter = ProgressReporter::start(
                2,
                Arc::clone(&counters),
                sink.clone(),
                Duration::from_secs(60),
            );
        }
        assert!(counters.is_done());
        assert_eq!(sink.progress.lock().len(), 1);
    }
}
