//! Client-side game transfers.
//!
//! # Architecture
//!
//! ```text
//! DownloadService ──► TransferRegistry (one Transfer per game)
//!        │
//!        ▼
//!    Transfer::run ── fetch manifest ──► file workers (max_concurrent_files)
//!                                             │
//!                                             ▼
//!                                    ChunkedDownloader
//!                                      setup ─► chunk pool (max_concurrent_chunks)
//!                                               range request ─► positional write
//!                                               ChunkStore::update
//!                                      verify checksum
//! ```
//!
//! Transfers resume from the chunk store in `<dest>/.frost.cache`: chunks
//! recorded as complete are never requested again.

mod client;
mod config;
mod file;
mod orchestrator;
mod progress;
mod registry;
mod service;
mod state;

pub use client::{HttpTransferClient, RangeRequest, TransferClient};
pub use config::{
    default_download_dir, DownloaderConfig, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_TIMEOUT,
    DEFAULT_MAX_CONCURRENT_CHUNKS, DEFAULT_MAX_CONCURRENT_FILES, DEFAULT_SERVER_URL,
};
pub use file::{store_key, ChunkedDownloader};
pub use orchestrator::Transfer;
pub use progress::{
    LogProgressSink, ProgressCounters, ProgressReporter, ProgressSink, TransferProgress,
};
pub use registry::TransferRegistry;
pub use service::{DownloadService, TransferHandle};
pub use state::{StatusUpdate, TransferStatus};
