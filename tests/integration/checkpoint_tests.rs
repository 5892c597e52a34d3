//! Resume behavior across runs, for both checkpoint backends

use crate::{create_test_config, html, index_linking, mount_open_robots};
use docsweep::checkpoint::{
    open_checkpoint, CheckpointError, CheckpointMetadata, CheckpointResult, CheckpointStore,
    CrawlRecord, JsonCheckpoint, QueuedUrl, RecordStatus,
};
use docsweep::config::Config;
use docsweep::crawler::{Coordinator, MemoryReader, MemorySample, SkipReason};
use docsweep::output::{NullProcessor, StopReason};
use docsweep::CrawlError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn checkpointed(server: &MockServer, dir: &TempDir, file: &str) -> Config {
    let mut config = create_test_config(server, dir.path());
    config.checkpoint.enabled = true;
    config.checkpoint.checkpoint_file = file.to_string();
    config.checkpoint.checkpoint_interval_pages = 1;
    config
}

async fn crawl(config: Config) -> docsweep::Result<docsweep::CrawlSummary> {
    Coordinator::new(config)?
        .with_processor(Arc::new(NullProcessor))
        .run()
        .await
}

/// JSON store that can be told to fail metadata reads or every write
struct ScriptedStore {
    inner: JsonCheckpoint,
    unreadable_metadata: bool,
    failing_writes: bool,
    begun: Arc<AtomicBool>,
}

impl ScriptedStore {
    fn new(dir: &TempDir) -> Self {
        Self {
            inner: JsonCheckpoint::open(&dir.path().join("scripted.json")).unwrap(),
            unreadable_metadata: false,
            failing_writes: false,
            begun: Arc::new(AtomicBool::new(false)),
        }
    }

    fn write_error() -> CheckpointError {
        std::io::Error::new(std::io::ErrorKind::Other, "disk full").into()
    }
}

impl CheckpointStore for ScriptedStore {
    fn metadata(&self) -> CheckpointResult<Option<CheckpointMetadata>> {
        if self.unreadable_metadata {
            return Err(CheckpointError::Corrupt("bad metadata row".to_string()));
        }
        self.inner.metadata()
    }

    fn begin(&mut self, config_name: &str, fingerprint: &str) -> CheckpointResult<()> {
        self.begun.store(true, Ordering::SeqCst);
        self.inner.begin(config_name, fingerprint)
    }

    fn reset(&mut self) -> CheckpointResult<()> {
        self.inner.reset()
    }

    fn load(&self) -> CheckpointResult<HashMap<String, CrawlRecord>> {
        self.inner.load()
    }

    fn get(&self, url: &str) -> CheckpointResult<Option<CrawlRecord>> {
        self.inner.get(url)
    }

    fn save(&mut self, records: &[CrawlRecord], marker: u64) -> CheckpointResult<()> {
        if self.failing_writes {
            return Err(Self::write_error());
        }
        self.inner.save(records, marker)
    }

    fn save_queue(&mut self, queue: &[QueuedUrl]) -> CheckpointResult<()> {
        if self.failing_writes {
            return Err(Self::write_error());
        }
        self.inner.save_queue(queue)
    }

    fn load_queue(&self) -> CheckpointResult<Vec<QueuedUrl>> {
        self.inner.load_queue()
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// Reports the process at 99% of system memory
struct Saturated;

impl MemoryReader for Saturated {
    fn sample(&mut self) -> Option<MemorySample> {
        Some(MemorySample {
            resident_bytes: 99,
            total_bytes: 100,
        })
    }
}

async fn mount_small_site(server: &MockServer) {
    mount_open_robots(server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&index_linking(&["/a".to_string(), "/b".to_string()])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html("<p>a</p>"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<p>b</p>"))
        .mount(server)
        .await;
}

async fn completed_pages_not_refetched(file: &str) {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_small_site(&server).await;

    let first = crawl(checkpointed(&server, &dir, file)).await.unwrap();
    assert_eq!(first.completed, 3);

    let config = checkpointed(&server, &dir, file);
    let store = open_checkpoint(&config.checkpoint, &config.checkpoint_path()).unwrap();
    let records = store.load().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records
        .values()
        .all(|r| r.status == RecordStatus::Completed && r.content_hash.is_some()));
    drop(store);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>should not be fetched</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let second = crawl(config).await.unwrap();
    assert_eq!(second.completed, 0);
    assert_eq!(second.skip_reasons[&SkipReason::AlreadyCompleted], 1);
}

#[tokio::test]
async fn test_resume_skips_completed_json() {
    completed_pages_not_refetched("state/checkpoint.json").await;
}

#[tokio::test]
async fn test_resume_skips_completed_sqlite() {
    completed_pages_not_refetched("state/checkpoint.db").await;
}

#[tokio::test]
async fn test_interrupted_crawl_resumes_remaining_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_small_site(&server).await;

    let mut config = checkpointed(&server, &dir, "checkpoint.json");
    config.crawling.max_pages = Some(2);
    let first = crawl(config).await.unwrap();
    assert_eq!(first.completed, 2);
    assert_eq!(first.stop_reason, StopReason::MaxPages);

    server.reset().await;
    mount_open_robots(&server).await;
    for done in ["/", "/a"] {
        Mock::given(method("GET"))
            .and(path(done))
            .respond_with(html("<p>done already</p>"))
            .expect(0)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<p>b</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let second = crawl(checkpointed(&server, &dir, "checkpoint.json")).await.unwrap();
    assert_eq!(second.completed, 1);
    assert_eq!(second.stop_reason, StopReason::Exhausted);
}

#[tokio::test]
async fn test_failed_pages_retried_on_resume() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_open_robots(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = checkpointed(&server, &dir, "checkpoint.json");
    config.crawling.max_retries = 0;
    let first = crawl(config.clone()).await.unwrap();
    assert_eq!(first.failed, 1);

    server.reset().await;
    mount_open_robots(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>back</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let second = crawl(config).await.unwrap();
    assert_eq!(second.completed, 1);
}

#[tokio::test]
async fn test_fingerprint_mismatch_is_an_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_small_site(&server).await;

    crawl(checkpointed(&server, &dir, "checkpoint.json")).await.unwrap();

    let mut changed = checkpointed(&server, &dir, "checkpoint.json");
    changed.site.start_urls.push(format!("{}/a", server.uri()));
    let result = crawl(changed.clone()).await;
    assert!(matches!(result, Err(CrawlError::FingerprintMismatch { .. })));

    // Settings outside the fingerprint do not invalidate the checkpoint
    let mut tuned = checkpointed(&server, &dir, "checkpoint.json");
    tuned.crawling.per_domain_concurrent_requests = 2;
    assert!(crawl(tuned).await.is_ok());

    let summary = Coordinator::new(changed)
        .unwrap()
        .with_processor(Arc::new(NullProcessor))
        .reset_checkpoint(true)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.completed, 3);
}

#[tokio::test]
async fn test_detect_changes_revalidates_with_etag() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_open_robots(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>v1</p>").insert_header("etag", "\"v1\""))
        .mount(&server)
        .await;

    let mut config = checkpointed(&server, &dir, "checkpoint.json");
    config.checkpoint.detect_changes = true;
    let first = crawl(config.clone()).await.unwrap();
    assert_eq!(first.completed, 1);

    server.reset().await;
    mount_open_robots(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let second = crawl(config.clone()).await.unwrap();
    assert_eq!(second.skip_reasons[&SkipReason::Unchanged], 1);

    let store = open_checkpoint(&config.checkpoint, &config.checkpoint_path()).unwrap();
    let records = store.load().unwrap();
    assert!(records.values().all(|r| r.status == RecordStatus::Completed));
}

#[tokio::test]
async fn test_failing_checkpoint_writes_degrade_resume() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_small_site(&server).await;

    let mut store = ScriptedStore::new(&dir);
    store.failing_writes = true;
    let summary = Coordinator::new(checkpointed(&server, &dir, "unused.json"))
        .unwrap()
        .with_processor(Arc::new(NullProcessor))
        .with_checkpoint(Box::new(store))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.completed, 3);
    assert!(summary.resume_degraded);
    // one failure per outcome plus the final save
    assert_eq!(summary.checkpoint_errors, 4);
}

#[tokio::test]
async fn test_unopenable_checkpoint_degrades_resume() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_small_site(&server).await;
    std::fs::write(dir.path().join("blocker"), "not a directory").unwrap();

    let summary = crawl(checkpointed(&server, &dir, "blocker/checkpoint.json"))
        .await
        .unwrap();

    assert_eq!(summary.completed, 3);
    assert!(summary.resume_degraded);
    assert_eq!(summary.checkpoint_errors, 1);
}

#[tokio::test]
async fn test_unreadable_metadata_leaves_checkpoint_untouched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_small_site(&server).await;

    let mut store = ScriptedStore::new(&dir);
    store.unreadable_metadata = true;
    let begun = store.begun.clone();
    let summary = Coordinator::new(checkpointed(&server, &dir, "unused.json"))
        .unwrap()
        .with_processor(Arc::new(NullProcessor))
        .with_checkpoint(Box::new(store))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.completed, 3);
    assert!(summary.resume_degraded);
    assert_eq!(summary.checkpoint_errors, 1);
    assert!(!begun.load(Ordering::SeqCst));
    assert!(!dir.path().join("scripted.json").exists());
}

#[tokio::test]
async fn test_memory_pressure_stops_and_checkpoints() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_small_site(&server).await;

    let mut config = checkpointed(&server, &dir, "checkpoint.json");
    config.checkpoint.checkpoint_interval_pages = 100;
    config.crawling.global_concurrent_requests = 1;
    config.crawling.per_domain_concurrent_requests = 1;
    let summary = Coordinator::new(config.clone())
        .unwrap()
        .with_processor(Arc::new(NullProcessor))
        .with_memory_reader(Box::new(Saturated))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::HighMemory);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.frontier_remaining, 2);

    let store = open_checkpoint(&config.checkpoint, &config.checkpoint_path()).unwrap();
    assert_eq!(store.load().unwrap().len(), 1);
    assert_eq!(store.load_queue().unwrap().len(), 2);
    drop(store);

    let resumed = crawl(config).await.unwrap();
    assert_eq!(resumed.completed, 2);
    assert_eq!(resumed.skip_reasons[&SkipReason::AlreadyCompleted], 1);
}
