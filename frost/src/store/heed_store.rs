//! LMDB-backed chunk store.

use std::fs;
use std::path::{Path, PathBuf};

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use tracing::debug;

use super::chunk::{Chunk, ChunkState, FileProgress};
use super::ChunkStore;
use crate::error::{SyncError, SyncResult};

/// Name of the chunk-store directory inside a destination folder.
pub const CACHE_DIR: &str = ".frost.cache";

/// Upper bound of the memory map. LMDB only allocates what it uses.
const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

/// Width of the zero-padded chunk ordinal.
const ORDINAL_WIDTH: usize = 10;

const FILE_PREFIX: &str = "f:";
const FILE_MARKER: &[u8] = &[1];

/// Chunk store persisted in an LMDB environment.
///
/// Only one instance may be open per directory within a process; dropping it
/// releases the environment so it can be reopened.
pub struct HeedChunkStore {
    env: Env,
    db: Database<Str, Bytes>,
    path: PathBuf,
}

impl std::fmt::Debug for HeedChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeedChunkStore")
            .field("path", &self.path)
            .finish()
    }
}

impl HeedChunkStore {
    /// Open (or create) a store in `path`.
    pub fn open(path: &Path) -> SyncResult<Self> {
        fs::create_dir_all(path).map_err(|e| SyncError::CreateDirFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        // SAFETY: the environment directory is private to this store and is
        // never opened twice in one process (heed rejects a second open).
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(DEFAULT_MAP_SIZE)
                .max_dbs(1)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let db: Database<Str, Bytes> = env.create_database(&mut wtxn, Some("chunks"))?;
        wtxn.commit()?;

        debug!(path = %path.display(), "opened chunk store");

        Ok(Self {
            env,
            db,
            path: path.to_path_buf(),
        })
    }

    /// Open the store belonging to a destination folder.
    pub fn open_in(folder: &Path) -> SyncResult<Self> {
        Self::open(&folder.join(CACHE_DIR))
    }

    /// Directory holding the LMDB files.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_chunks(&self, txn: &RoTxn, file: &str) -> SyncResult<Vec<Chunk>> {
        let prefix = chunk_prefix(file);
        let mut chunks = Vec::new();

        for entry in self.db.prefix_iter(txn, prefix.as_str())? {
            let (key, value) = entry?;
            if !is_ordinal(&key[prefix.len()..]) {
                // Belongs to a file whose path extends this one
                continue;
            }
            chunks.push(decode_chunk(key, value)?);
        }

        Ok(chunks)
    }

    fn chunk_keys(&self, txn: &RoTxn, file: &str) -> SyncResult<Vec<String>> {
        let prefix = chunk_prefix(file);
        let mut keys = Vec::new();

        for entry in self.db.prefix_iter(txn, prefix.as_str())? {
            let (key, _) = entry?;
            if is_ordinal(&key[prefix.len()..]) {
                keys.push(key.to_string());
            }
        }

        Ok(keys)
    }

    fn read_file_list(&self, txn: &RoTxn) -> SyncResult<Vec<String>> {
        let mut files = Vec::new();
        for entry in self.db.prefix_iter(txn, FILE_PREFIX)? {
            let (key, _) = entry?;
            files.push(key[FILE_PREFIX.len()..].to_string());
        }
        Ok(files)
    }
}

impl ChunkStore for HeedChunkStore {
    fn add(&self, file: &str, chunks: &[Chunk]) -> SyncResult<()> {
        let mut wtxn = self.env.write_txn()?;

        // Drop records left over from an earlier, different partition
        let stale = self.chunk_keys(&wtxn, file)?;
        for key in &stale {
            self.db.delete(&mut wtxn, key)?;
        }

        self.db.put(&mut wtxn, &file_key(file), FILE_MARKER)?;
        for (i, chunk) in chunks.iter().enumerate() {
            let key = chunk_key(file, i);
            let value = encode_chunk(&key, chunk)?;
            self.db.put(&mut wtxn, &key, &value)?;
        }

        wtxn.commit()?;
        Ok(())
    }

    fn get(&self, file: &str) -> SyncResult<Option<Vec<Chunk>>> {
        let rtxn = self.env.read_txn()?;
        if self.db.get(&rtxn, &file_key(file))?.is_none() {
            return Ok(None);
        }
        self.read_chunks(&rtxn, file).map(Some)
    }

    fn update(&self, file: &str, index: usize, chunk: &Chunk) -> SyncResult<()> {
        let key = chunk_key(file, index);
        let mut wtxn = self.env.write_txn()?;

        if self.db.get(&wtxn, &key)?.is_none() {
            return Err(SyncError::ChunkNotFound {
                file: file.to_string(),
                index,
            });
        }

        let value = encode_chunk(&key, chunk)?;
        self.db.put(&mut wtxn, &key, &value)?;
        wtxn.commit()?;
        Ok(())
    }

    fn file_list(&self) -> SyncResult<Vec<String>> {
        let rtxn = self.env.read_txn()?;
        self.read_file_list(&rtxn)
    }

    fn chunk_len(&self, file: &str) -> SyncResult<usize> {
        let rtxn = self.env.read_txn()?;
        Ok(self.chunk_keys(&rtxn, file)?.len())
    }

    fn progress(&self) -> SyncResult<Vec<FileProgress>> {
        let rtxn = self.env.read_txn()?;
        let files = self.read_file_list(&rtxn)?;

        files
            .into_iter()
            .map(|file| {
                let chunks = self.read_chunks(&rtxn, &file)?;
                Ok(FileProgress::from_chunks(file, &chunks))
            })
            .collect()
    }

    fn reset(&self, file: &str) -> SyncResult<()> {
        let mut wtxn = self.env.write_txn()?;
        if self.db.get(&wtxn, &file_key(file))?.is_none() {
            return Err(SyncError::FileNotRegistered(file.to_string()));
        }

        let chunks = self.read_chunks(&wtxn, file)?;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let key = chunk_key(file, i);
            let value = encode_chunk(&key, &chunk.with_state(ChunkState::Queued))?;
            self.db.put(&mut wtxn, &key, &value)?;
        }

        wtxn.commit()?;
        Ok(())
    }
}

fn file_key(file: &str) -> String {
    format!("{FILE_PREFIX}{file}")
}

fn chunk_prefix(file: &str) -> String {
    format!("c:{file}:")
}

fn chunk_key(file: &str, index: usize) -> String {
    format!("c:{file}:{index:0width$}", width = ORDINAL_WIDTH)
}

fn is_ordinal(suffix: &str) -> bool {
    suffix.len() == ORDINAL_WIDTH && suffix.bytes().all(|b| b.is_ascii_digit())
}

fn encode_chunk(key: &str, chunk: &Chunk) -> SyncResult<Vec<u8>> {
    bincode::serialize(chunk).map_err(|e| SyncError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode_chunk(key: &str, value: &[u8]) -> SyncResult<Chunk> {
    bincode::deserialize(value).map_err(|e| SyncError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
