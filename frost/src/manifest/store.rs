//! Persistent manifest table.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use heed::byteorder::BigEndian;
use heed::types::{Bytes, Str, U64};
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use tracing::debug;

use super::types::FolderManifest;
use crate::error::{SyncError, SyncResult};

const DEFAULT_MAP_SIZE: usize = 256 * 1024 * 1024;
const NEXT_ID_KEY: &str = "next_id";

/// Storage for folder manifests, one per game.
pub trait ManifestStore: Send + Sync {
    /// Load the manifest of `game_id`, if any.
    fn get(&self, game_id: u64) -> SyncResult<Option<FolderManifest>>;

    /// Insert or update the manifest keyed by its game id.
    ///
    /// A manifest for a game that is already stored keeps the stored id. New
    /// manifests receive a fresh non-zero id. `created_at` is set when unset.
    /// The assigned values are written back into `manifest`.
    fn put(&self, manifest: &mut FolderManifest) -> SyncResult<()>;

    /// Remove the manifest of `game_id`. Returns whether one existed.
    fn delete(&self, game_id: u64) -> SyncResult<bool>;

    /// Game ids that have a manifest, ascending.
    fn game_ids(&self) -> SyncResult<Vec<u64>>;
}

/// [`ManifestStore`] backed by an LMDB environment.
pub struct HeedManifestStore {
    env: Env,
    manifests: Database<U64<BigEndian>, Bytes>,
    meta: Database<Str, U64<BigEndian>>,
    path: PathBuf,
}

impl std::fmt::Debug for HeedManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeedManifestStore")
            .field("path", &self.path)
            .finish()
    }
}

impl HeedManifestStore {
    /// Open (or create) the store in directory `path`.
    pub fn open(path: &Path) -> SyncResult<Self> {
        fs::create_dir_all(path).map_err(|e| SyncError::CreateDirFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        // SAFETY: the directory is owned by this store and opened once per process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(DEFAULT_MAP_SIZE)
                .max_dbs(2)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let manifests = env.create_database(&mut wtxn, Some("manifests"))?;
        let meta = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        debug!(path = %path.display(), "opened manifest store");

        Ok(Self {
            env,
            manifests,
            meta,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn next_id(&self, wtxn: &mut RwTxn) -> SyncResult<u64> {
        let id = self.meta.get(wtxn, NEXT_ID_KEY)?.unwrap_or(1);
        self.meta.put(wtxn, NEXT_ID_KEY, &(id + 1))?;
        Ok(id)
    }
}

fn decode(game_id: u64, bytes: &[u8]) -> SyncResult<FolderManifest> {
    FolderManifest::from_msgpack(bytes).map_err(|e| SyncError::CorruptRecord {
        key: format!("manifest:{game_id}"),
        reason: e.to_string(),
    })
}

impl ManifestStore for HeedManifestStore {
    fn get(&self, game_id: u64) -> SyncResult<Option<FolderManifest>> {
        let rtxn = self.env.read_txn()?;
        match self.manifests.get(&rtxn, &game_id)? {
            Some(bytes) => Ok(Some(decode(game_id, bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, manifest: &mut FolderManifest) -> SyncResult<()> {
        let mut wtxn = self.env.write_txn()?;

        let existing = match self.manifests.get(&wtxn, &manifest.game_id)? {
            Some(bytes) => Some(decode(manifest.game_id, bytes)?),
            None => None,
        };

        manifest.id = match &existing {
            Some(stored) if stored.id != 0 => stored.id,
            _ => self.next_id(&mut wtxn)?,
        };
        if manifest.created_at.is_none() {
            manifest.created_at = existing
                .as_ref()
                .and_then(|m| m.created_at)
                .or_else(|| Some(Utc::now()));
        }

        let bytes = manifest.to_msgpack()?;
        self.manifests
            .put(&mut wtxn, &manifest.game_id, bytes.as_slice())?;
        wtxn.commit()?;

        debug!(game = manifest.game_id, id = manifest.id, "saved manifest");
        Ok(())
    }

    fn delete(&self, game_id: u64) -> SyncResult<bool> {
        let mut wtxn = self.env.write_txn()?;
        let existed = self.manifests.delete(&mut wtxn, &game_id)?;
        wtxn.commit()?;
        Ok(existed)
    }

    fn game_ids(&self) -> SyncResult<Vec<u64>> {
        let rtxn = self.env.read_txn()?;
        let mut ids = Vec::new();
        for entry in self.manifests.iter(&rtxn)? {
            let (game_id, _) = entry?;
            ids.push(game_id);
        }
        Ok(ids)
    }
}
