//! Frost - resumable game library mirroring.
//!
//! A library host serves completed game folders over HTTP: a MessagePack
//! manifest per game plus `Range`-aware file endpoints. Clients mirror a game
//! by splitting every file into fixed-size chunks, fetching them in parallel,
//! writing them in place and recording progress in an embedded chunk store so
//! an interrupted transfer picks up where it stopped. Each finished file is
//! verified against the xxh3-128 checksum from the manifest.
//!
//! # Modules
//!
//! - [`manifest`] - folder scanning, manifest persistence and game lookup
//! - [`store`] - chunk partitioning and the persistent chunk store
//! - [`download`] - client transfers, progress and the per-game registry
//! - [`server`] - the HTTP transfer endpoints
//! - [`config`] - INI configuration and environment overrides
//! - [`logging`] - tracing subscriber setup

pub mod checksum;
pub mod config;
pub mod download;
pub mod error;
pub mod http_date;
pub mod logging;
pub mod manifest;
pub mod server;
pub mod store;

pub use error::{SyncError, SyncResult};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
