//! Entry point for client-side game transfers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use dashmap::DashMap;
use tracing::{error, info};

use super::client::{HttpTransferClient, TransferClient};
use super::config::DownloaderConfig;
use super::orchestrator::Transfer;
use super::progress::ProgressSink;
use super::registry::TransferRegistry;
use super::state::{StatusUpdate, TransferStatus};
use crate::error::{SyncError, SyncResult};
use crate::store::{FileProgress, HeedChunkStore};

/// Starts, tracks and cancels game transfers.
pub struct DownloadService {
    config: DownloaderConfig,
    client: Arc<dyn TransferClient>,
    sink: Arc<dyn ProgressSink>,
    registry: Arc<TransferRegistry>,
    /// Chunk stores still referenced by a transfer or its handle.
    stores: DashMap<PathBuf, Weak<HeedChunkStore>>,
}

impl DownloadService {
    pub fn new(
        config: DownloaderConfig,
        client: Arc<dyn TransferClient>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            client,
            sink,
            registry: Arc::new(TransferRegistry::new()),
            stores: DashMap::new(),
        }
    }

    /// Service talking HTTP to `config.server_url`.
    pub fn from_config(config: DownloaderConfig, sink: Arc<dyn ProgressSink>) -> SyncResult<Self> {
        let client = HttpTransferClient::new(&config)?;
        Ok(Self::new(config, Arc::new(client), sink))
    }

    /// Share a registry with other services.
    pub fn with_registry(mut self, registry: Arc<TransferRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TransferRegistry> {
        &self.registry
    }

    /// Start downloading `game_id` into `<root>/<game_id>`.
    ///
    /// Fails with [`SyncError::TransferAlreadyActive`] while another transfer
    /// of the same game runs. A finished or failed transfer can be started
    /// again and resumes from the chunk store.
    pub fn download(&self, game_id: u64, root: &Path) -> SyncResult<TransferHandle> {
        let dest = root.join(game_id.to_string());

        let transfer = self.registry.register(game_id, || {
            let store = self.chunk_store(&dest)?;
            Ok(Transfer::new(
                game_id,
                dest.clone(),
                self.config.clone(),
                Arc::clone(&self.client),
                store,
                Arc::clone(&self.sink),
            ))
        })?;

        info!(game = game_id, dest = %dest.display(), "starting transfer");

        let worker = Arc::clone(&transfer);
        let registry = Arc::clone(&self.registry);
        let spawned = thread::Builder::new()
            .name(format!("frost-transfer-{game_id}"))
            .spawn(move || {
                let status = worker.run();
                registry.remove(game_id);
                status
            });

        match spawned {
            Ok(handle) => Ok(TransferHandle {
                transfer,
                handle: Some(handle),
            }),
            Err(e) => {
                self.registry.remove(game_id);
                Err(SyncError::Init {
                    component: "transfer thread",
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Download into the configured download directory.
    pub fn download_default(&self, game_id: u64) -> SyncResult<TransferHandle> {
        let root = self.config.download_dir.clone();
        self.download(game_id, &root)
    }

    /// Cancel an active transfer. Returns whether one was found.
    pub fn cancel(&self, game_id: u64) -> bool {
        match self.registry.get(game_id) {
            Some(transfer) => {
                transfer.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of active transfers.
    pub fn active(&self) -> Vec<u64> {
        self.registry.ids()
    }

    /// Latest status of an active transfer.
    pub fn status(&self, game_id: u64) -> Option<StatusUpdate> {
        self.registry.get(game_id).map(|t| t.status())
    }

    /// Chunk-store progress of an active transfer.
    pub fn progress(&self, game_id: u64) -> SyncResult<Option<Vec<FileProgress>>> {
        match self.registry.get(game_id) {
            Some(transfer) => transfer.progress().map(Some),
            None => Ok(None),
        }
    }

    fn chunk_store(&self, dest: &Path) -> SyncResult<Arc<HeedChunkStore>> {
        if let Some(store) = self.stores.get(dest).and_then(|w| w.upgrade()) {
            return Ok(store);
        }

        let store = Arc::new(HeedChunkStore::open_in(dest)?);
        self.stores
            .insert(dest.to_path_buf(), Arc::downgrade(&store));
        self.stores.retain(|_, w| w.strong_count() > 0);
        Ok(store)
    }
}

/// Handle to a started transfer.
pub struct TransferHandle {
    transfer: Arc<Transfer>,
    handle: Option<JoinHandle<TransferStatus>>,
}

impl TransferHandle {
    pub fn game_id(&self) -> u64 {
        self.transfer.game_id()
    }

    pub fn transfer(&self) -> &Arc<Transfer> {
        &self.transfer
    }

    pub fn cancel(&self) {
        self.transfer.cancel();
    }

    pub fn status(&self) -> StatusUpdate {
        self.transfer.status()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Block until the transfer reaches a terminal status.
    pub fn wait(mut self) -> TransferStatus {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(status)) => status,
            Some(Err(_)) => {
                error!(game = self.game_id(), "transfer thread panicked");
                TransferStatus::Error
            }
            None => self.transfer.status().status,
        }
    }
}
