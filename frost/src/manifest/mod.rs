//! Folder manifests.
//!
//! A [`FolderManifest`] describes every file of one game folder by relative
//! path, size, modification time and content checksum. The server builds it
//! with [`ManifestBuilder`], persists it in a [`ManifestStore`] and serves it
//! through [`ManifestService`]; the client uses it to drive a transfer.

mod builder;
mod service;
mod store;
mod types;

pub use builder::{ManifestBuilder, ManifestChange, ScanOutcome};
pub use service::{DirectoryLibrary, GameFile, GameLibrary, ManifestService, INCOMPLETE_MARKER};
pub use store::{HeedManifestStore, ManifestStore};
pub use types::{FileManifest, FolderManifest};
