//! Chunked, resumable download of a single file.
//!
//! A file is set up once (allocated to its final size and partitioned into
//! chunks registered in the chunk store), then every chunk that is not yet
//! complete is fetched with a range request and written at its offset. After
//! all chunk workers returned, the file is verified against the manifest
//! checksum.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::ThreadPoolBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{RangeRequest, TransferClient};
use super::progress::ProgressCounters;
use crate::checksum::calculate_file_checksum;
use crate::config::format_size;
use crate::error::{SyncError, SyncResult};
use crate::manifest::FileManifest;
use crate::store::{partition, Chunk, ChunkState, ChunkStore};

/// Buffer size for copying response bodies (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Chunk-store key of a destination file.
pub fn store_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Downloads files of one game into a destination folder.
///
/// Shared by every file worker of a transfer. Each file gets its own chunk
/// pool of at most `max_concurrent_chunks` threads.
pub struct ChunkedDownloader {
    game_id: u64,
    dest_root: PathBuf,
    client: Arc<dyn TransferClient>,
    store: Arc<dyn ChunkStore>,
    max_concurrent_chunks: usize,
    chunk_size: u64,
    cancel: CancellationToken,
    counters: Arc<ProgressCounters>,
}

impl ChunkedDownloader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        game_id: u64,
        dest_root: impl Into<PathBuf>,
        client: Arc<dyn TransferClient>,
        store: Arc<dyn ChunkStore>,
        max_concurrent_chunks: usize,
        chunk_size: u64,
        cancel: CancellationToken,
        counters: Arc<ProgressCounters>,
    ) -> Self {
        Self {
            game_id,
            dest_root: dest_root.into(),
            client,
            store,
            max_concurrent_chunks: max_concurrent_chunks.max(1),
            chunk_size: chunk_size.max(1),
            cancel,
            counters,
        }
    }

    /// Local path of a manifest entry.
    pub fn dest_path(&self, entry: &FileManifest) -> PathBuf {
        entry
            .rel_path
            .split('/')
            .fold(self.dest_root.clone(), |path, part| path.join(part))
    }

    /// Set up and transfer one file.
    pub fn download(&self, entry: &FileManifest) -> SyncResult<()> {
        let dest = self.dest_path(entry);
        self.setup(entry, &dest)?;
        self.transfer(entry, &dest)
    }

    /// Allocate the destination file and register its chunks, unless a
    /// previous run already did so for the same source version.
    pub fn setup(&self, entry: &FileManifest, dest: &Path) -> SyncResult<()> {
        let key = store_key(dest);

        if self.store.get(&key)?.is_some() {
            if let Some(local) = local_state(dest) {
                if local.size == entry.size && entry.mod_time <= local.modified {
                    debug!(file = %key, "resuming existing setup");
                    return Ok(());
                }
                info!(
                    file = %key,
                    source_mtime = %entry.mod_time,
                    local_mtime = %local.modified,
                    "source changed since setup, starting over"
                );
            }
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let file = File::create(dest).map_err(|e| SyncError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;
        file.set_len(entry.size).map_err(|e| SyncError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        let chunks = partition(entry.size, self.chunk_size);
        self.store.add(&key, &chunks)?;

        debug!(file = %key, size = entry.size, chunks = chunks.len(), "set up file");
        Ok(())
    }

    /// Fetch every incomplete chunk, then verify the whole file.
    pub fn transfer(&self, entry: &FileManifest, dest: &Path) -> SyncResult<()> {
        let key = store_key(dest);
        let started = Instant::now();

        let chunks = self
            .store
            .get(&key)?
            .ok_or_else(|| SyncError::FileNotRegistered(key.clone()))?;

        let pending: Vec<(usize, Chunk)> = chunks
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, c)| !c.is_complete())
            .collect();

        // Counted after setup, so a restarted file contributes nothing
        let resumed: u64 = chunks.iter().filter(|c| c.is_complete()).map(|c| c.len()).sum();
        self.counters.add_resumed(resumed);

        if !pending.is_empty() {
            let file = OpenOptions::new()
                .write(true)
                .open(dest)
                .map_err(|e| SyncError::WriteFailed {
                    path: dest.to_path_buf(),
                    source: e,
                })?;

            debug!(file = %key, pending = pending.len(), total = chunks.len(), "transferring chunks");

            let pool = ThreadPoolBuilder::new()
                .num_threads(self.max_concurrent_chunks.min(pending.len()))
                .thread_name(|i| format!("frost-chunk-{i}"))
                .build()
                .map_err(|e| SyncError::Init {
                    component: "chunk pool",
                    reason: e.to_string(),
                })?;

            let file = &file;
            let key = key.as_str();
            pool.scope(|s| {
                for (index, chunk) in pending {
                    s.spawn(move |_| self.run_chunk(entry, key, file, index, chunk));
                }
            });
        }

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.verify(entry, dest, &key)?;

        info!(file = %key, size = entry.size, elapsed = ?started.elapsed(), "download complete");
        Ok(())
    }

    fn run_chunk(&self, entry: &FileManifest, key: &str, file: &File, index: usize, chunk: Chunk) {
        if self.cancel.is_cancelled() {
            return;
        }

        let state = match self.fetch_chunk(entry, file, chunk) {
            Ok(()) => ChunkState::Complete,
            Err(SyncError::Cancelled) => return,
            Err(e) => {
                warn!(
                    file = %key,
                    start = chunk.start,
                    end = chunk.end,
                    error = %e,
                    "error occurred while downloading chunk"
                );
                ChunkState::Error
            }
        };

        if let Err(e) = self.store.update(key, index, &chunk.with_state(state)) {
            warn!(file = %key, index, error = %e, "failed to update chunk state");
        }
    }

    fn fetch_chunk(&self, entry: &FileManifest, file: &File, chunk: Chunk) -> SyncResult<()> {
        let request = RangeRequest {
            game_id: self.game_id,
            rel_path: &entry.rel_path,
            chunk,
            if_range: entry.mod_time,
        };
        let mut body = self.client.fetch_range(&request)?;

        let expected = chunk.len();
        let mut written = 0u64;
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let n = body.read(&mut buffer).map_err(|e| SyncError::DownloadFailed {
                url: entry.rel_path.clone(),
                reason: format!("read error: {e}"),
            })?;
            if n == 0 {
                break;
            }
            if written + n as u64 > expected {
                return Err(SyncError::DownloadFailed {
                    url: entry.rel_path.clone(),
                    reason: format!("peer sent more than the {expected} requested bytes"),
                });
            }

            write_at(file, &buffer[..n], chunk.start + written).map_err(|e| {
                SyncError::WriteFailed {
                    path: self.dest_path(entry),
                    source: e,
                }
            })?;

            written += n as u64;
            self.counters.add_written(n as u64);
        }

        if written != expected {
            return Err(SyncError::DownloadFailed {
                url: entry.rel_path.clone(),
                reason: format!("short body: got {written} of {expected} bytes"),
            });
        }

        Ok(())
    }

    fn verify(&self, entry: &FileManifest, dest: &Path, key: &str) -> SyncResult<()> {
        let chunks = self
            .store
            .get(key)?
            .ok_or_else(|| SyncError::FileNotRegistered(key.to_string()))?;

        let missing = chunks.iter().filter(|c| !c.is_complete()).count();
        if missing > 0 {
            return Err(SyncError::IncompleteFile {
                path: dest.to_path_buf(),
                missing,
                total: chunks.len(),
            });
        }

        let actual = calculate_file_checksum(dest)?;
        if actual != entry.checksum {
            let actual_size = fs::metadata(dest).map(|m| m.len()).unwrap_or(0);

            // Complete chunks hold bad bytes; make the next resume refetch them
            if let Err(e) = self.store.reset(key) {
                warn!(file = %key, error = %e, "failed to reset chunks after checksum mismatch");
            }

            return Err(SyncError::ChecksumMismatch {
                path: dest.to_path_buf(),
                expected: entry.checksum.clone(),
                actual,
                expected_size: format_size(entry.size),
                actual_size: format_size(actual_size),
            });
        }

        Ok(())
    }
}

struct LocalState {
    size: u64,
    modified: DateTime<Utc>,
}

fn local_state(path: &Path) -> Option<LocalState> {
    let metadata = fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    Some(LocalState {
        size: metadata.len(),
        modified: modified.into(),
    })
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_write(buf, offset)?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero));
        }
        buf = &buf[n..];
        offset += n as u64;
    }
    Ok(())
}
