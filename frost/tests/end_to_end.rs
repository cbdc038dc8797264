//! Real server and HTTP client over loopback.

mod common;

use std::fs;
use std::io::Read;
use std::sync::Arc;

use filetime::FileTime;
use frost::download::{
    store_key, DownloadService, DownloaderConfig, HttpTransferClient, LogProgressSink,
    RangeRequest, TransferClient, TransferStatus,
};
use frost::http_date::format_http_date;
use frost::manifest::FolderManifest;
use frost::store::{ChunkState, ChunkStore, HeedChunkStore};
use frost::SyncResult;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_RANGES, CONTENT_RANGE, IF_RANGE, LAST_MODIFIED, RANGE};
use reqwest::StatusCode;
use tempfile::TempDir;

use common::{random_bytes, write_file, TestServer};

struct Fixture {
    server: TestServer,
    temp: TempDir,
}

fn fixture(files: &[(&str, Vec<u8>)]) -> Fixture {
    let temp = TempDir::new().unwrap();
    let game = temp.path().join("library").join("7");
    for (path, data) in files {
        write_file(&game, path, data);
    }
    let server = TestServer::start(&temp.path().join("library"), &temp.path().join("db"));
    Fixture { server, temp }
}

#[test]
fn test_download_mirrors_game() {
    let big = random_bytes(300 * 1024);
    let small = random_bytes(17);
    let fx = fixture(&[
        ("Game.exe", big.clone()),
        ("data/levels/level 1.pak", small.clone()),
        ("empty.cfg", Vec::new()),
    ]);

    let config = DownloaderConfig::new(&fx.server.base_url)
        .with_chunk_size(64 * 1024)
        .with_max_concurrent_files(2)
        .with_max_concurrent_chunks(4);
    let service = DownloadService::from_config(config, Arc::new(LogProgressSink)).unwrap();
    let root = fx.temp.path().join("downloads");

    let handle = service.download(7, &root).unwrap();
    assert_eq!(handle.wait(), TransferStatus::Complete);

    let dest = root.join("7");
    assert_eq!(fs::read(dest.join("Game.exe")).unwrap(), big);
    assert_eq!(fs::read(dest.join("data/levels/level 1.pak")).unwrap(), small);
    assert_eq!(fs::read(dest.join("empty.cfg")).unwrap(), Vec::<u8>::new());

    // A second run finds everything complete
    let handle = service.download(7, &root).unwrap();
    assert_eq!(handle.wait(), TransferStatus::Complete);
    assert!(service.active().is_empty());
}

#[test]
fn test_meta_endpoint() {
    let fx = fixture(&[("a.bin", random_bytes(100))]);
    let client = Client::new();

    let response = client.get(fx.server.url("meta/7")).send().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let manifest = FolderManifest::from_msgpack(response).unwrap();
    assert_eq!(manifest.game_id, 7);
    assert_ne!(manifest.id, 0);
    assert_eq!(manifest.total_size, 100);

    let missing = client.get(fx.server.url("meta/8")).send().unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert!(!missing.text().unwrap().is_empty());
}

#[test]
fn test_range_requests() {
    let data = random_bytes(1000);
    let fx = fixture(&[("file.bin", data.clone())]);
    let client = Client::new();
    let url = fx.server.url("load/7/file.bin");

    let full = client.get(&url).send().unwrap();
    assert_eq!(full.status(), StatusCode::OK);
    assert_eq!(full.headers()[ACCEPT_RANGES], "bytes");
    let last_modified = full.headers()[LAST_MODIFIED].to_str().unwrap().to_string();
    assert_eq!(full.bytes().unwrap().as_ref(), data.as_slice());

    let partial = client.get(&url).header(RANGE, "bytes=10-19").send().unwrap();
    assert_eq!(partial.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(partial.headers()[CONTENT_RANGE], "bytes 10-19/1000");
    assert_eq!(partial.bytes().unwrap().as_ref(), &data[10..20]);

    let suffix = client.get(&url).header(RANGE, "bytes=-5").send().unwrap();
    assert_eq!(suffix.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(suffix.bytes().unwrap().as_ref(), &data[995..]);

    let matching = client
        .get(&url)
        .header(RANGE, "bytes=0-3")
        .header(IF_RANGE, &last_modified)
        .send()
        .unwrap();
    assert_eq!(matching.status(), StatusCode::PARTIAL_CONTENT);

    let stale = format_http_date(chrono::Utc::now() - chrono::Duration::days(400));
    let changed = client
        .get(&url)
        .header(RANGE, "bytes=0-3")
        .header(IF_RANGE, stale)
        .send()
        .unwrap();
    assert_eq!(changed.status(), StatusCode::OK);
    assert_eq!(changed.bytes().unwrap().len(), 1000);

    let beyond = client.get(&url).header(RANGE, "bytes=5000-").send().unwrap();
    assert_eq!(beyond.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(beyond.headers()[CONTENT_RANGE], "bytes */1000");
}

#[test]
fn test_load_rejects_bad_paths() {
    let fx = fixture(&[("file.bin", random_bytes(10))]);
    let client = Client::new();

    let missing = client.get(fx.server.url("load/7/nope.bin")).send().unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let unknown_game = client.get(fx.server.url("load/9/file.bin")).send().unwrap();
    assert_eq!(unknown_game.status(), StatusCode::NOT_FOUND);

    let escape = client
        .get(fx.server.url("load/7/..%2F..%2Fdb"))
        .send()
        .unwrap();
    assert!(escape.status().is_client_error());
}

#[test]
fn test_incomplete_game_is_conflict() {
    let fx = fixture(&[("file.bin", random_bytes(10)), (".incomplete", Vec::new())]);
    let response = Client::new().get(fx.server.url("meta/7")).send().unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

/// Ranges go to the server, the manifest is one fetched earlier.
struct PinnedManifestClient {
    manifest: FolderManifest,
    http: HttpTransferClient,
}

impl TransferClient for PinnedManifestClient {
    fn fetch_manifest(&self, _game_id: u64) -> SyncResult<FolderManifest> {
        Ok(self.manifest.clone())
    }

    fn fetch_range(&self, request: &RangeRequest<'_>) -> SyncResult<Box<dyn Read + Send>> {
        self.http.fetch_range(request)
    }
}

#[test]
fn test_source_changed_after_manifest_fails_only_that_file() {
    let stable = random_bytes(5000);
    let fx = fixture(&[("stable.bin", stable.clone()), ("moving.bin", random_bytes(5000))]);

    let config = DownloaderConfig::new(&fx.server.base_url)
        .with_chunk_size(2048)
        .with_max_concurrent_chunks(2);
    let http = HttpTransferClient::new(&config).unwrap();
    let manifest = http.fetch_manifest(7).unwrap();

    // The server now answers If-Range for moving.bin with a full 200 body
    let moving = fx.temp.path().join("library/7/moving.bin");
    let later = FileTime::from_unix_time(FileTime::now().unix_seconds() + 3600, 0);
    filetime::set_file_mtime(&moving, later).unwrap();

    let client = PinnedManifestClient { manifest, http };
    let service = DownloadService::new(config, Arc::new(client), Arc::new(LogProgressSink));
    let root = fx.temp.path().join("downloads");

    let handle = service.download(7, &root).unwrap();
    let transfer = Arc::clone(handle.transfer());
    assert_eq!(handle.wait(), TransferStatus::Error);
    let message = transfer.status().message;
    assert!(message.contains("moving.bin"), "{message}");
    assert!(!message.contains("stable.bin"), "{message}");
    drop(transfer);

    let dest = root.join("7");
    assert_eq!(fs::read(dest.join("stable.bin")).unwrap(), stable);

    let store = HeedChunkStore::open_in(&dest).unwrap();
    let moving_chunks = store
        .get(&store_key(&dest.join("moving.bin")))
        .unwrap()
        .unwrap();
    assert_eq!(moving_chunks.len(), 3);
    assert!(moving_chunks.iter().all(|c| c.state == ChunkState::Error));
    let stable_chunks = store
        .get(&store_key(&dest.join("stable.bin")))
        .unwrap()
        .unwrap();
    assert!(stable_chunks.iter().all(|c| c.state == ChunkState::Complete));
}
