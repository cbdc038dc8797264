//! Chunk records and partitioning.

use serde::{Deserialize, Serialize};

/// Transfer state of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkState {
    /// Not yet transferred.
    Queued,
    /// Bytes written and acknowledged.
    Complete,
    /// Last attempt failed; retried on the next resume.
    Error,
}

/// Inclusive byte range `[start, end]` of a file plus its transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub start: u64,
    pub end: u64,
    pub state: ChunkState,
}

impl Chunk {
    /// Create a queued chunk covering `[start, end]`.
    pub fn queued(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            state: ChunkState::Queued,
        }
    }

    /// Number of bytes covered by the chunk (the range is inclusive).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a chunk covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn is_complete(&self) -> bool {
        self.state == ChunkState::Complete
    }

    /// Copy of this chunk with a different state.
    pub fn with_state(self, state: ChunkState) -> Self {
        Self { state, ..self }
    }

    /// Value for an HTTP `Range` header.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Split a file of `size` bytes into contiguous queued chunks of `chunk_size`.
///
/// The final chunk is truncated to the remainder. A zero-byte file has no
/// chunks. A `chunk_size` of zero is treated as one byte.
pub fn partition(size: u64, chunk_size: u64) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(size.div_ceil(chunk_size) as usize);

    let mut start = 0;
    while start < size {
        let end = start.saturating_add(chunk_size - 1).min(size - 1);
        chunks.push(Chunk::queued(start, end));
        start = end + 1;
    }

    chunks
}

/// Byte accounting for one file in a chunk store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProgress {
    /// Absolute path of the file.
    pub file: String,
    /// Bytes covered by complete chunks.
    pub complete: u64,
    /// Bytes covered by queued or failed chunks.
    pub remaining: u64,
}

impl FileProgress {
    /// Sum chunk ranges by state.
    pub fn from_chunks(file: impl Into<String>, chunks: &[Chunk]) -> Self {
        let (complete, remaining) = chunks.iter().fold((0, 0), |(done, left), c| {
            if c.is_complete() {
                (done + c.len(), left)
            } else {
                (done, left + c.len())
            }
        });

        Self {
            file: file.into(),
            complete,
            remaining,
        }
    }

    /// Total size of the file.
    pub fn total(&self) -> u64 {
        self.complete + self.remaining
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}
