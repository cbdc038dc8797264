//! Incremental manifest builder.
//!
//! Walks a game folder and produces a [`FolderManifest`], reusing entries of a
//! previous manifest whose modification time did not change. Per-file work
//! runs on the caller's rayon pool; every result travels through one bounded
//! channel to a single aggregating thread outside the pool, which keeps entry
//! order stable:
//!
//! ```text
//! walk ──► par_iter (stat + hash) ──► sync_channel(5) ──► aggregate
//!                                                          ├─ previous index: replace in place
//!                                                          └─ new file: append
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::types::{FileManifest, FolderManifest};
use crate::checksum::calculate_file_checksum;
use crate::error::{SyncError, SyncResult};
use crate::store::CACHE_DIR;

/// Capacity of the result channel between file workers and the aggregator.
const RESULT_CHANNEL_CAPACITY: usize = 5;

/// A difference between the previous and the freshly scanned manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestChange {
    /// File did not exist in the previous manifest.
    Added(String),
    /// File existed but its modification time changed.
    Modified(String),
    /// File is gone from the folder.
    Removed(String),
}

impl ManifestChange {
    pub fn rel_path(&self) -> &str {
        match self {
            Self::Added(p) | Self::Modified(p) | Self::Removed(p) => p,
        }
    }
}

/// Result of a folder scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// The rebuilt manifest (not yet persisted).
    pub manifest: FolderManifest,
    /// Incremental diff against the previous manifest.
    pub changes: Vec<ManifestChange>,
    /// Entries taken from the previous manifest without hashing.
    pub reused: usize,
    /// Files that were hashed.
    pub hashed: usize,
}

impl ScanOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Where a per-file result lands in the new manifest.
#[derive(Debug)]
struct MetaResult {
    /// Index in the previous manifest, `None` for new files.
    index: Option<usize>,
    entry: FileManifest,
    /// Whether the entry was recomputed.
    hashed: bool,
}

/// Builds folder manifests.
#[derive(Debug, Default, Clone)]
pub struct ManifestBuilder;

impl ManifestBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Scan `root` and build the manifest for `game_id`.
    ///
    /// The returned manifest carries over `id` and timestamps from `previous`;
    /// persisting it is up to the caller.
    ///
    /// # Errors
    ///
    /// Any walk, stat or read failure aborts the scan; no partial manifest is
    /// returned.
    pub fn scan(
        &self,
        game_id: u64,
        root: &Path,
        previous: Option<&FolderManifest>,
    ) -> SyncResult<ScanOutcome> {
        let started = Instant::now();
        let paths = collect_files(root)?;

        let prev_files: &[FileManifest] = previous.map(|m| m.files.as_slice()).unwrap_or(&[]);
        let prev_index: HashMap<&str, usize> = prev_files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.rel_path.as_str(), i))
            .collect();

        let (tx, rx) = mpsc::sync_channel(RESULT_CHANNEL_CAPACITY);

        // The aggregator blocks on the channel and must not hold a pool worker
        let aggregated = thread::scope(|s| {
            let aggregator = s.spawn(move || aggregate(rx, prev_files));

            paths.par_iter().for_each_with(tx, |tx, path| {
                let result = gather_meta(root, path, prev_files, &prev_index);
                // Only fails if the aggregator panicked
                let _ = tx.send(result);
            });

            aggregator
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })?;

        let manifest = FolderManifest {
            id: previous.map(|m| m.id).unwrap_or(0),
            game_id,
            total_size: aggregated.total_size,
            files: aggregated.files,
            created_at: previous.and_then(|m| m.created_at),
            updated_at: previous.and_then(|m| m.updated_at),
        };

        info!(
            game = game_id,
            files = manifest.files.len(),
            reused = aggregated.reused,
            hashed = aggregated.hashed,
            changes = aggregated.changes.len(),
            elapsed = ?started.elapsed(),
            "completed manifest scan"
        );

        Ok(ScanOutcome {
            manifest,
            changes: aggregated.changes,
            reused: aggregated.reused,
            hashed: aggregated.hashed,
        })
    }
}

struct Aggregated {
    files: Vec<FileManifest>,
    changes: Vec<ManifestChange>,
    total_size: u64,
    reused: usize,
    hashed: usize,
}

/// Single consumer merging per-file results into index-stable order.
fn aggregate(
    rx: Receiver<SyncResult<MetaResult>>,
    prev_files: &[FileManifest],
) -> SyncResult<Aggregated> {
    let mut slots: Vec<Option<FileManifest>> = vec![None; prev_files.len()];
    let mut appended = Vec::new();
    let mut changes = Vec::new();
    let mut total_size = 0u64;
    let mut reused = 0;
    let mut hashed = 0;
    let mut first_error = None;

    // Keep draining after an error so no worker blocks on a full channel
    for result in rx {
        let meta = match result {
            Ok(meta) => meta,
            Err(e) => {
                first_error.get_or_insert(e);
                continue;
            }
        };

        debug!(file = %meta.entry.rel_path, size = meta.entry.size, "got metadata");
        total_size += meta.entry.size;

        if meta.hashed {
            hashed += 1;
        } else {
            reused += 1;
        }

        match meta.index {
            Some(index) => {
                if meta.hashed {
                    changes.push(ManifestChange::Modified(meta.entry.rel_path.clone()));
                }
                slots[index] = Some(meta.entry);
            }
            None => {
                changes.push(ManifestChange::Added(meta.entry.rel_path.clone()));
                appended.push(meta.entry);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    let mut files = Vec::with_capacity(slots.len() + appended.len());
    for (slot, prev) in slots.into_iter().zip(prev_files) {
        match slot {
            Some(entry) => files.push(entry),
            None => changes.push(ManifestChange::Removed(prev.rel_path.clone())),
        }
    }

    // Arrival order is nondeterministic; path order keeps scans reproducible
    appended.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files.extend(appended);
    changes.sort_by(|a, b| a.rel_path().cmp(b.rel_path()));

    Ok(Aggregated {
        files,
        changes,
        total_size,
        reused,
        hashed,
    })
}

fn gather_meta(
    root: &Path,
    path: &Path,
    prev_files: &[FileManifest],
    prev_index: &HashMap<&str, usize>,
) -> SyncResult<MetaResult> {
    let rel_path = relative_path(root, path)?;

    let metadata = fs::metadata(path).map_err(|e| SyncError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mod_time: DateTime<Utc> = metadata
        .modified()
        .map_err(|e| SyncError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?
        .into();

    let index = prev_index.get(rel_path.as_str()).copied();
    let miss_reason = match index.map(|i| &prev_files[i]) {
        Some(prev) if prev.mod_time == mod_time => {
            debug!(file = %rel_path, "using cached metadata");
            return Ok(MetaResult {
                index,
                entry: prev.clone(),
                hashed: false,
            });
        }
        Some(prev) => format!("file modified prev {}, cur: {}", prev.mod_time, mod_time),
        None => "file not found".to_string(),
    };

    info!(reason = %miss_reason, file = %rel_path, "metadata cache miss");

    let checksum = calculate_file_checksum(path)?;

    Ok(MetaResult {
        index,
        entry: FileManifest {
            rel_path,
            size: metadata.len(),
            mod_time,
            checksum,
        },
        hashed: true,
    })
}

/// All regular files below `root`, skipping any chunk-store directory.
fn collect_files(root: &Path) -> SyncResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_name() != CACHE_DIR);

    for entry in walker {
        let entry = entry.map_err(|e| SyncError::WalkFailed {
            path: e.path().unwrap_or(root).to_path_buf(),
            reason: e.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// `path` relative to `root`, `/` separated.
pub(crate) fn relative_path(root: &Path, path: &Path) -> SyncResult<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| SyncError::InvalidPath(format!("{} is outside the root", path.display())))?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                SyncError::InvalidPath(format!("{} is not valid UTF-8", path.display()))
            })?),
            _ => {
                return Err(SyncError::InvalidPath(format!(
                    "unexpected component in {}",
                    path.display()
                )))
            }
        }
    }

    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, data: &[u8]) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(&path).unwrap().write_all(data).unwrap();
        path
    }

    #[test]
    fn test_first_scan_hashes_everything() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b.txt", b"bbbb");
        write(temp.path(), "a/nested.bin", b"aa");

        let outcome = ManifestBuilder::new().scan(7, temp.path(), None).unwrap();

        assert_eq!(outcome.hashed, 2);
        assert_eq!(outcome.reused, 0);
        assert_eq!(outcome.manifest.game_id, 7);
        assert_eq!(outcome.manifest.total_size, 6);
        let paths: Vec<_> = outcome.manifest.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a/nested.bin", "b.txt"]);
        assert_eq!(
            outcome.changes,
            vec![
                ManifestChange::Added("a/nested.bin".to_string()),
                ManifestChange::Added("b.txt".to_string()),
            ]
        );
    }

    #[test]
    fn test_rescan_unchanged_reuses_all_entries() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "one.bin", &[1u8; 5000]);
        write(temp.path(), "dir/two.bin", &[2u8; 300]);
        write(temp.path(), "dir/three.bin", b"three");

        let builder = ManifestBuilder::new();
        let first = builder.scan(1, temp.path(), None).unwrap();
        let second = builder.scan(1, temp.path(), Some(&first.manifest)).unwrap();

        assert_eq!(second.hashed, 0);
        assert_eq!(second.reused, 3);
        assert!(second.is_unchanged());
        assert_eq!(
            second.manifest.to_msgpack().unwrap(),
            first.manifest.to_msgpack().unwrap()
        );
    }

    #[test]
    fn test_modified_file_is_rehashed_in_place() {
        let temp = TempDir::new().unwrap();
        let a = write(temp.path(), "a.bin", b"unchanged");
        let b = write(temp.path(), "b.bin", b"original");
        set_file_mtime(&a, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
        set_file_mtime(&b, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        let builder = ManifestBuilder::new();
        let first = builder.scan(1, temp.path(), None).unwrap();
        let b_index = first
            .manifest
            .files
            .iter()
            .position(|f| f.rel_path == "b.bin")
            .unwrap();

        File::create(&b).unwrap().write_all(b"replaced").unwrap();
        set_file_mtime(&b, FileTime::from_unix_time(1_600_000_500, 0)).unwrap();

        let second = builder.scan(1, temp.path(), Some(&first.manifest)).unwrap();

        assert_eq!(second.hashed, 1);
        assert_eq!(second.reused, 1);
        assert_eq!(
            second.changes,
            vec![ManifestChange::Modified("b.bin".to_string())]
        );
        assert_eq!(
            second.manifest.file("a.bin").unwrap().checksum,
            first.manifest.file("a.bin").unwrap().checksum
        );
        assert_ne!(
            second.manifest.file("b.bin").unwrap().checksum,
            first.manifest.file("b.bin").unwrap().checksum
        );
        assert_eq!(second.manifest.files[b_index].rel_path, "b.bin");
    }

    #[test]
    fn test_same_mtime_trusts_cached_checksum() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "a.bin", b"first");
        set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        let builder = ManifestBuilder::new();
        let first = builder.scan(1, temp.path(), None).unwrap();

        // Same length, same mtime: the cache hit path must not rehash
        File::create(&path).unwrap().write_all(b"other").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        let second = builder.scan(1, temp.path(), Some(&first.manifest)).unwrap();
        assert_eq!(second.hashed, 0);
        assert_eq!(second.manifest, first.manifest);
    }

    #[test]
    fn test_new_files_append_and_removed_files_drop() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "keep.bin", b"keep");
        let gone = write(temp.path(), "gone.bin", b"gone");

        let builder = ManifestBuilder::new();
        let first = builder.scan(1, temp.path(), None).unwrap();

        fs::remove_file(gone).unwrap();
        write(temp.path(), "added.bin", b"added!");

        let second = builder.scan(1, temp.path(), Some(&first.manifest)).unwrap();

        let paths: Vec<_> = second.manifest.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["keep.bin", "added.bin"]);
        assert_eq!(second.manifest.total_size, 10);
        assert_eq!(
            second.changes,
            vec![
                ManifestChange::Added("added.bin".to_string()),
                ManifestChange::Removed("gone.bin".to_string()),
            ]
        );
    }

    #[test]
    fn test_chunk_store_directory_is_skipped() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "game.bin", b"data");
        write(temp.path(), &format!("{CACHE_DIR}/data.mdb"), b"lmdb");

        let outcome = ManifestBuilder::new().scan(1, temp.path(), None).unwrap();
        assert_eq!(outcome.manifest.files.len(), 1);
        assert_eq!(outcome.manifest.files[0].rel_path, "game.bin");
    }

    #[test]
    fn test_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let result = ManifestBuilder::new().scan(1, &temp.path().join("missing"), None);
        assert!(matches!(result, Err(SyncError::WalkFailed { .. })));
    }

    #[test]
    fn test_scan_keeps_previous_identity() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.bin", b"a");

        let mut previous = ManifestBuilder::new().scan(9, temp.path(), None).unwrap().manifest;
        previous.id = 12;
        previous.created_at = Some(Utc::now());

        let outcome = ManifestBuilder::new()
            .scan(9, temp.path(), Some(&previous))
            .unwrap();
        assert_eq!(outcome.manifest.id, 12);
        assert_eq!(outcome.manifest.created_at, previous.created_at);
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/games/1");
        let path = root.join("a").join("b").join("c.bin");
        assert_eq!(relative_path(root, &path).unwrap(), "a/b/c.bin");
        assert!(relative_path(root, Path::new("/elsewhere/x")).is_err());
    }
}
