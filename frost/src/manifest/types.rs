//! Manifest data types and their wire encoding.

use std::io::Read;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// Description of a single file in a game folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    /// Path relative to the game folder, `/` separated.
    pub rel_path: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time of the source file.
    pub mod_time: DateTime<Utc>,
    /// Content checksum (lowercase hex).
    pub checksum: String,
}

/// Content-addressed description of every file of one game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderManifest {
    /// Storage id, assigned when the manifest is first persisted.
    pub id: u64,
    /// Owning game.
    pub game_id: u64,
    /// Sum of all file sizes.
    pub total_size: u64,
    /// Files in stable order.
    pub files: Vec<FileManifest>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FolderManifest {
    /// Create an empty, unpersisted manifest for a game.
    pub fn new(game_id: u64) -> Self {
        Self {
            game_id,
            ..Default::default()
        }
    }

    /// Find a file entry by relative path.
    pub fn file(&self, rel_path: &str) -> Option<&FileManifest> {
        self.files.iter().find(|f| f.rel_path == rel_path)
    }

    /// Encode as MessagePack with named fields.
    pub fn to_msgpack(&self) -> SyncResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decode a manifest directly from a reader.
    pub fn from_msgpack<R: Read>(reader: R) -> SyncResult<Self> {
        Ok(rmp_serde::from_read(reader)?)
    }
}
