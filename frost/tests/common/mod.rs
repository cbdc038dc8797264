//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use frost::checksum::checksum_bytes;
use frost::download::{
    DownloaderConfig, LogProgressSink, RangeRequest, Transfer, TransferClient, TransferStatus,
};
use frost::manifest::{FileManifest, FolderManifest};
use frost::server::{ServerConfig, TransferServer};
use frost::store::HeedChunkStore;
use frost::{SyncError, SyncResult};
use parking_lot::Mutex;
use rand::Rng;
use tokio_util::sync::CancellationToken;

/// `len` random bytes.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rng().fill(&mut buf[..]);
    buf
}

/// Manifest entry for `data`, stamped with a fixed past mtime.
pub fn entry(rel_path: &str, data: &[u8]) -> FileManifest {
    FileManifest {
        rel_path: rel_path.to_string(),
        size: data.len() as u64,
        mod_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        checksum: checksum_bytes(data),
    }
}

/// Manifest for the given files.
pub fn manifest(game_id: u64, files: &[(&str, &[u8])]) -> FolderManifest {
    let files: Vec<FileManifest> = files.iter().map(|(p, d)| entry(p, d)).collect();
    FolderManifest {
        id: 1,
        game_id,
        total_size: files.iter().map(|f| f.size).sum(),
        files,
        created_at: None,
        updated_at: None,
    }
}

/// In-memory peer that records every range request.
pub struct RecordingClient {
    pub manifest: FolderManifest,
    pub files: HashMap<String, Vec<u8>>,
    /// Requests starting at or beyond this offset fail.
    pub fail_from: Option<u64>,
    /// Delay before each range response.
    pub latency: Duration,
    pub requests: Mutex<Vec<(String, u64, u64)>>,
    in_flight: Mutex<HashMap<String, usize>>,
    pub peak_total: AtomicUsize,
    pub peak_per_file: AtomicUsize,
    pub peak_files: AtomicUsize,
}

impl RecordingClient {
    pub fn new(manifest: FolderManifest, files: HashMap<String, Vec<u8>>) -> Self {
        Self {
            manifest,
            files,
            fail_from: None,
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
            peak_total: AtomicUsize::new(0),
            peak_per_file: AtomicUsize::new(0),
            peak_files: AtomicUsize::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requested_files(&self) -> HashSet<String> {
        self.requests.lock().iter().map(|r| r.0.clone()).collect()
    }

    fn enter(&self, rel_path: &str) {
        let mut in_flight = self.in_flight.lock();
        let count = in_flight.entry(rel_path.to_string()).or_default();
        *count += 1;
        let per_file = *count;
        let total: usize = in_flight.values().sum();
        let files = in_flight.values().filter(|&&n| n > 0).count();
        self.peak_per_file.fetch_max(per_file, Ordering::SeqCst);
        self.peak_total.fetch_max(total, Ordering::SeqCst);
        self.peak_files.fetch_max(files, Ordering::SeqCst);
    }

    fn leave(&self, rel_path: &str) {
        if let Some(count) = self.in_flight.lock().get_mut(rel_path) {
            *count -= 1;
        }
    }
}

impl TransferClient for RecordingClient {
    fn fetch_manifest(&self, _game_id: u64) -> SyncResult<FolderManifest> {
        Ok(self.manifest.clone())
    }

    fn fetch_range(&self, request: &RangeRequest<'_>) -> SyncResult<Box<dyn Read + Send>> {
        let chunk = request.chunk;
        self.requests
            .lock()
            .push((request.rel_path.to_string(), chunk.start, chunk.end));

        self.enter(request.rel_path);
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        self.leave(request.rel_path);

        if self.fail_from.is_some_and(|offset| chunk.start >= offset) {
            return Err(SyncError::HttpStatus {
                url: request.rel_path.to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let data = self.files.get(request.rel_path).ok_or(SyncError::HttpStatus {
            url: request.rel_path.to_string(),
            status: 404,
            body: "not found".to_string(),
        })?;
        let end = (chunk.end as usize + 1).min(data.len());
        Ok(Box::new(Cursor::new(data[chunk.start as usize..end].to_vec())))
    }
}

/// Run one transfer to completion against `client`, with a freshly opened
/// chunk store that is closed again on return.
pub fn run_transfer(
    game_id: u64,
    dest: &Path,
    config: DownloaderConfig,
    client: Arc<dyn TransferClient>,
) -> (TransferStatus, String) {
    let store = Arc::new(HeedChunkStore::open_in(dest).unwrap());
    let transfer = Transfer::new(
        game_id,
        dest,
        config,
        client,
        store,
        Arc::new(LogProgressSink),
    );
    let status = transfer.run();
    (status, transfer.status().message)
}

/// Transfer server running on its own runtime thread.
pub struct TestServer {
    pub addr: SocketAddr,
    pub base_url: String,
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Serve `library_root` on an ephemeral port.
    pub fn start(library_root: &Path, manifest_db: &Path) -> Self {
        let config = ServerConfig::new(library_root, manifest_db)
            .with_listen(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_backfill_on_start(false);
        let base_path = config.base_path.clone();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let (tx, rx) = mpsc::channel();

        let thread = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let server = TransferServer::bind(&config).await.unwrap();
                tx.send(server.local_addr().unwrap()).unwrap();
                server.run(token).await.unwrap();
            });
        });

        let addr = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        Self {
            addr,
            base_url: format!("http://{addr}{base_path}"),
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Write `data` to `root/rel_path`, creating parents.
pub fn write_file(root: &Path, rel_path: &str, data: &[u8]) -> PathBuf {
    let path = root.join(rel_path);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, data).unwrap();
    path
}
