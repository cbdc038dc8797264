//! Registry of in-flight transfers, at most one per game.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::orchestrator::Transfer;
use crate::error::{SyncError, SyncResult};

/// Concurrent map from game id to its active transfer.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    active: DashMap<u64, Arc<Transfer>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the transfer built by `make` unless `game_id` is already active.
    ///
    /// `make` runs while the slot is reserved, so two racing callers never
    /// both build a transfer for the same game.
    pub fn register<F>(&self, game_id: u64, make: F) -> SyncResult<Arc<Transfer>>
    where
        F: FnOnce() -> SyncResult<Transfer>,
    {
        match self.active.entry(game_id) {
            Entry::Occupied(_) => Err(SyncError::TransferAlreadyActive(game_id)),
            Entry::Vacant(slot) => {
                let transfer = Arc::new(make()?);
                slot.insert(Arc::clone(&transfer));
                Ok(transfer)
            }
        }
    }

    pub fn get(&self, game_id: u64) -> Option<Arc<Transfer>> {
        self.active.get(&game_id).map(|t| Arc::clone(t.value()))
    }

    pub fn remove(&self, game_id: u64) -> Option<Arc<Transfer>> {
        self.active.remove(&game_id).map(|(_, t)| t)
    }

    pub fn contains(&self, game_id: u64) -> bool {
        self.active.contains_key(&game_id)
    }

    /// Active game ids, ascending.
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.active.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
