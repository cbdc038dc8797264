//! Error types for the synchronization engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while scanning, serving or downloading a game folder.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", .path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file or directory.
    #[error("failed to write {}: {source}", .path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to walk a directory tree.
    #[error("failed to walk {}: {reason}", .path.display())]
    WalkFailed { path: PathBuf, reason: String },

    /// The embedded key-value store reported an error.
    #[error("store error: {0}")]
    Store(#[from] heed::Error),

    /// A stored record could not be encoded or decoded.
    #[error("corrupt store record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// A chunk update referenced a chunk that was never registered.
    #[error("chunk index {index} not found for file {file}")]
    ChunkNotFound { file: String, index: usize },

    /// A file expected in the chunk store was not registered.
    #[error("file {0} is not registered in the chunk store")]
    FileNotRegistered(String),

    /// Game is not known to the library.
    #[error("game {0} not found")]
    GameNotFound(u64),

    /// Game exists but its download has not completed.
    #[error("game {0} is not complete")]
    GameIncomplete(u64),

    /// A manifest was persisted without receiving a storage id.
    #[error("manifest for game {0} was persisted with id 0")]
    ManifestIdUnset(u64),

    /// Failed to encode or decode a manifest on the wire.
    #[error("manifest codec error: {0}")]
    ManifestCodec(String),

    /// Failed to fetch the remote manifest.
    #[error("failed to fetch manifest from {url}: {reason}")]
    MetadataFetchFailed { url: String, reason: String },

    /// A range request did not produce the requested bytes.
    #[error("failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The server answered with an error status.
    #[error("error downloading {url}: {status}: {body}")]
    HttpStatus { url: String, status: u16, body: String },

    /// The server ignored the range request or the source file changed.
    #[error("server did not support range or file changed: status {status}")]
    RangeNotSatisfied { status: u16 },

    /// Network timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// Not every chunk of a file was transferred.
    #[error("{missing} of {total} chunks missing for {}", .path.display())]
    IncompleteFile {
        path: PathBuf,
        missing: usize,
        total: usize,
    },

    /// Checksum verification failed.
    #[error(
        "checksum mismatch for {}, expected: {expected} != got: {actual}, expected size: {expected_size}, got size: {actual_size}",
        .path.display()
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
        expected_size: String,
        actual_size: String,
    },

    /// A transfer for this game is already running.
    #[error("a transfer for game {0} is already active")]
    TransferAlreadyActive(u64),

    /// The transfer was cancelled.
    #[error("transfer cancelled")]
    Cancelled,

    /// Invalid path provided.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to build an HTTP client or thread pool.
    #[error("failed to initialize {component}: {reason}")]
    Init { component: &'static str, reason: String },
}

impl SyncError {
    /// Whether the error was caused by cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<rmp_serde::encode::Error> for SyncError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::ManifestCodec(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SyncError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::ManifestCodec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_not_found_display() {
        let err = SyncError::ChunkNotFound {
            file: "/games/1/data.pak".to_string(),
            index: 7,
        };
        assert_eq!(
            err.to_string(),
            "chunk index 7 not found for file /games/1/data.pak"
        );
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = SyncError::ChecksumMismatch {
            path: PathBuf::from("/games/1/data.pak"),
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
            expected_size: "1.0 MiB".to_string(),
            actual_size: "1.0 MiB".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("checksum mismatch"));
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
        assert!(msg.contains("1.0 MiB"));
    }

    #[test]
    fn test_io_source_is_exposed() {
        use std::error::Error;

        let err = SyncError::ReadFailed {
            path: PathBuf::from("/nope"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn test_is_cancelled() {
        assert!(SyncError::Cancelled.is_cancelled());
        assert!(!SyncError::GameNotFound(1).is_cancelled());
    }
}
