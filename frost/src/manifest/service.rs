//! Server-side manifest generation and file access.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::builder::{ManifestBuilder, ScanOutcome};
use super::store::ManifestStore;
use super::types::FolderManifest;
use crate::error::{SyncError, SyncResult};

/// Marker file that flags a game folder as still being downloaded.
pub const INCOMPLETE_MARKER: &str = ".incomplete";

/// Resolves game ids to their on-disk folders.
pub trait GameLibrary: Send + Sync {
    /// Folder of a completed game.
    ///
    /// Fails with [`SyncError::GameNotFound`] or [`SyncError::GameIncomplete`].
    fn game_folder(&self, game_id: u64) -> SyncResult<PathBuf>;

    /// Ids of every completed game.
    fn complete_games(&self) -> SyncResult<Vec<u64>>;
}

/// Library where each game lives in `<root>/<game id>`.
///
/// A game is complete unless its folder contains [`INCOMPLETE_MARKER`].
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl GameLibrary for DirectoryLibrary {
    fn game_folder(&self, game_id: u64) -> SyncResult<PathBuf> {
        let folder = self.root.join(game_id.to_string());
        if !folder.is_dir() {
            return Err(SyncError::GameNotFound(game_id));
        }
        if folder.join(INCOMPLETE_MARKER).exists() {
            return Err(SyncError::GameIncomplete(game_id));
        }
        Ok(folder)
    }

    fn complete_games(&self) -> SyncResult<Vec<u64>> {
        let entries = fs::read_dir(&self.root).map_err(|e| SyncError::ReadFailed {
            path: self.root.clone(),
            source: e,
        })?;

        let mut games = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SyncError::ReadFailed {
                path: self.root.clone(),
                source: e,
            })?;
            let Some(game_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
            else {
                continue;
            };
            let path = entry.path();
            if path.is_dir() && !path.join(INCOMPLETE_MARKER).exists() {
                games.push(game_id);
            }
        }

        games.sort_unstable();
        Ok(games)
    }
}

/// An opened game file ready to be served.
#[derive(Debug)]
pub struct GameFile {
    pub file: File,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Generates, persists and serves folder manifests.
pub struct ManifestService {
    library: Arc<dyn GameLibrary>,
    store: Arc<dyn ManifestStore>,
    builder: ManifestBuilder,
    /// Serializes scans of the same game.
    locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl ManifestService {
    pub fn new(library: Arc<dyn GameLibrary>, store: Arc<dyn ManifestStore>) -> Self {
        Self {
            library,
            store,
            builder: ManifestBuilder::new(),
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ManifestStore> {
        &self.store
    }

    /// Generate (or refresh) the manifest of `game_id` and persist it.
    pub fn generate(&self, game_id: u64) -> SyncResult<FolderManifest> {
        self.refresh(game_id).map(|outcome| outcome.manifest)
    }

    /// Like [`generate`](Self::generate) but also returns the scan diff.
    pub fn refresh(&self, game_id: u64) -> SyncResult<ScanOutcome> {
        let folder = self.library.game_folder(game_id)?;

        let lock = self.locks.entry(game_id).or_default().clone();
        let _guard = lock.lock();

        let previous = self.store.get(game_id)?;
        if previous.is_none() {
            debug!(game = game_id, "no previous manifest found, generating from scratch");
        }

        let mut outcome = self.builder.scan(game_id, &folder, previous.as_ref())?;

        if previous.is_none() || !outcome.is_unchanged() {
            outcome.manifest.updated_at = Some(Utc::now());
            self.store.put(&mut outcome.manifest)?;
            info!(
                game = game_id,
                changes = outcome.changes.len(),
                size = outcome.manifest.total_size,
                "saved manifest"
            );
        }

        if outcome.manifest.id == 0 {
            error!(game = game_id, "manifest id is 0 after saving");
            return Err(SyncError::ManifestIdUnset(game_id));
        }

        Ok(outcome)
    }

    /// Generate the manifest and write it as MessagePack with named fields.
    pub fn write_manifest<W: Write>(&self, game_id: u64, writer: &mut W) -> SyncResult<()> {
        let manifest = self.generate(game_id)?;
        rmp_serde::encode::write_named(writer, &manifest)?;
        Ok(())
    }

    /// Generate manifests for every complete game that has none yet.
    ///
    /// Returns the number of manifests created.
    pub fn backfill(&self) -> SyncResult<usize> {
        let existing: HashSet<u64> = self.store.game_ids()?.into_iter().collect();
        let missing: Vec<u64> = self
            .library
            .complete_games()?
            .into_iter()
            .filter(|id| !existing.contains(id))
            .collect();

        if missing.is_empty() {
            debug!("all games have manifests");
            return Ok(0);
        }

        info!(count = missing.len(), "generating missing manifests");
        // One game at a time; each scan already fans out over the pool
        for &game_id in &missing {
            self.generate(game_id)?;
        }

        Ok(missing.len())
    }

    /// Open a file of a complete game for serving.
    ///
    /// `rel_path` must be a relative, `/` separated path without `..`.
    pub fn open_file(&self, game_id: u64, rel_path: &str) -> SyncResult<GameFile> {
        validate_rel_path(rel_path)?;
        let path = self.library.game_folder(game_id)?.join(rel_path);

        let file = File::open(&path).map_err(|e| SyncError::ReadFailed {
            path: path.clone(),
            source: e,
        })?;
        let metadata = file.metadata().map_err(|e| SyncError::ReadFailed {
            path: path.clone(),
            source: e,
        })?;
        if !metadata.is_file() {
            return Err(SyncError::InvalidPath(format!("{rel_path} is not a file")));
        }
        let modified = metadata
            .modified()
            .map_err(|e| SyncError::ReadFailed {
                path: path.clone(),
                source: e,
            })?
            .into();

        Ok(GameFile {
            file,
            path,
            size: metadata.len(),
            modified,
        })
    }
}

/// Reject paths that could escape the game folder.
fn validate_rel_path(rel_path: &str) -> SyncResult<()> {
    if rel_path.is_empty() || rel_path.contains('\\') {
        return Err(SyncError::InvalidPath(rel_path.to_string()));
    }
    let safe = Path::new(rel_path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(SyncError::InvalidPath(rel_path.to_string()));
    }
    Ok(())
}
