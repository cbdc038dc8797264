//! Persistent per-chunk transfer state.
//!
//! Every destination folder owns one chunk store. The store maps the absolute
//! path of each file being transferred to an existence marker and its ordered
//! list of chunk records, so an interrupted transfer can resume by skipping
//! chunks that already completed.
//!
//! # Key layout
//!
//! ```text
//! f:<abs path>                  -> file marker
//! c:<abs path>:<%010d ordinal>  -> Chunk (bincode)
//! ```
//!
//! Ordinals are zero padded so a prefix scan returns chunks in byte order.

mod chunk;
mod heed_store;

pub use chunk::{partition, Chunk, ChunkState, FileProgress};
pub use heed_store::{HeedChunkStore, CACHE_DIR};

use crate::error::SyncResult;

/// Chunk-state table shared by every chunk worker of a transfer.
///
/// Each mutating call is a single atomic unit: registering a file together
/// with its partition commits or fails as a whole, and a chunk update never
/// observes a half-written sibling.
pub trait ChunkStore: Send + Sync {
    /// Register `file` and its initial chunk partition.
    ///
    /// Replaces any chunk list previously registered for the same file.
    fn add(&self, file: &str, chunks: &[Chunk]) -> SyncResult<()>;

    /// Get the ordered chunk list for `file`, or `None` if it was never added.
    fn get(&self, file: &str) -> SyncResult<Option<Vec<Chunk>>>;

    /// Replace chunk `index` of `file`.
    ///
    /// Fails with [`SyncError::ChunkNotFound`](crate::SyncError::ChunkNotFound)
    /// if the pair was never registered.
    fn update(&self, file: &str, index: usize, chunk: &Chunk) -> SyncResult<()>;

    /// All registered file paths.
    fn file_list(&self) -> SyncResult<Vec<String>>;

    /// Number of chunks registered for `file`.
    fn chunk_len(&self, file: &str) -> SyncResult<usize>;

    /// Per-file completed vs remaining bytes, taken from one consistent snapshot.
    fn progress(&self) -> SyncResult<Vec<FileProgress>>;

    /// Put every chunk of `file` back into the queued state.
    fn reset(&self, file: &str) -> SyncResult<()>;
}
