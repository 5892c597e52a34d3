//! Pipeline mode: pages flow through the bounded queue and every queued
//! page is processed before the crawl returns

use crate::{create_test_config, html, index_linking, mount_open_robots};
use docsweep::crawler::Coordinator;
use docsweep::output::{FetchedPage, PageProcessor};
use docsweep::plugins::{Plugin, PluginManager};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer};

/// Slow processor that remembers what it saved
#[derive(Default)]
struct SlowRecorder {
    saved: Mutex<Vec<String>>,
}

impl PageProcessor for SlowRecorder {
    fn convert(&self, page: &FetchedPage) -> anyhow::Result<String> {
        std::thread::sleep(Duration::from_millis(20));
        Ok(page.body_text().into_owned())
    }

    fn save(&self, page: &FetchedPage, _content: &str) -> anyhow::Result<Option<PathBuf>> {
        self.saved.lock().unwrap().push(page.url.path().to_string());
        Ok(None)
    }
}

#[derive(Default)]
struct CountingPlugin {
    fetched: AtomicUsize,
    converted: AtomicUsize,
    saved: AtomicUsize,
}

impl Plugin for CountingPlugin {
    fn name(&self) -> &str {
        "counting"
    }

    fn post_fetch(&self, _page: &FetchedPage) -> anyhow::Result<()> {
        self.fetched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn post_convert(&self, _page: &FetchedPage, content: String) -> anyhow::Result<String> {
        self.converted.fetch_add(1, Ordering::SeqCst);
        Ok(content)
    }

    fn post_save(
        &self,
        _page: &FetchedPage,
        _path: Option<&std::path::Path>,
    ) -> anyhow::Result<()> {
        self.saved.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Lets the test keep a handle on a plugin the manager owns
struct Shared(Arc<CountingPlugin>);

impl Plugin for Shared {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn post_fetch(&self, page: &FetchedPage) -> anyhow::Result<()> {
        self.0.post_fetch(page)
    }

    fn post_convert(&self, page: &FetchedPage, content: String) -> anyhow::Result<String> {
        self.0.post_convert(page, content)
    }

    fn post_save(&self, page: &FetchedPage, path: Option<&std::path::Path>) -> anyhow::Result<()> {
        self.0.post_save(page, path)
    }
}

async fn mount_site(server: &MockServer, pages: usize) {
    mount_open_robots(server).await;
    let links: Vec<String> = (0..pages).map(|i| format!("/doc/{}", i)).collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&index_linking(&links)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/doc/\d+$"))
        .respond_with(html("<main>doc</main>"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pipeline_drains_every_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_site(&server, 30).await;

    let mut config = create_test_config(&server, dir.path());
    config.pipeline.enabled = true;
    config.pipeline.process_workers = Some(2);
    config.pipeline.queue_maxsize = 10;

    let processor = Arc::new(SlowRecorder::default());
    let plugin = Arc::new(CountingPlugin::default());
    let mut plugins = PluginManager::new();
    plugins.register(Box::new(Shared(plugin.clone())));

    let mut coordinator = Coordinator::new(config)
        .unwrap()
        .with_processor(processor.clone())
        .with_plugins(plugins);
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.completed, 31);
    let stats = summary.pipeline.expect("pipeline stats");
    assert_eq!(stats.workers, 2);
    assert_eq!(stats.processed, 31);
    assert_eq!(stats.errors, 0);
    assert!(stats.peak_len <= 10);

    assert_eq!(processor.saved.lock().unwrap().len(), 31);
    assert_eq!(plugin.fetched.load(Ordering::SeqCst), 31);
    assert_eq!(plugin.converted.load(Ordering::SeqCst), 31);
    assert_eq!(plugin.saved.load(Ordering::SeqCst), 31);
}

#[tokio::test]
async fn test_pipeline_disabled_processes_inline() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_site(&server, 5).await;

    let mut config = create_test_config(&server, dir.path());
    config.pipeline.enabled = true;

    let processor = Arc::new(SlowRecorder::default());
    let mut coordinator = Coordinator::new(config)
        .unwrap()
        .with_processor(processor.clone())
        .pipeline(false);
    let summary = coordinator.run().await.unwrap();

    assert!(summary.pipeline.is_none());
    assert_eq!(processor.saved.lock().unwrap().len(), 6);
}

#[tokio::test]
async fn test_html_pages_written_to_output() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_site(&server, 3).await;

    let mut config = create_test_config(&server, dir.path());
    config.output.save_pages = true;
    config.pipeline.enabled = true;
    config.pipeline.process_workers = Some(1);

    let mut coordinator = Coordinator::new(config).unwrap();
    let summary = coordinator.run().await.unwrap();
    assert_eq!(summary.completed, 4);

    let url = url::Url::parse(&server.uri()).unwrap();
    let site_dir = dir.path().join("pages").join(format!(
        "{}_{}",
        url.host_str().unwrap(),
        url.port().unwrap()
    ));
    assert!(site_dir.join("index.html").exists());
    for i in 0..3 {
        let page = site_dir.join("doc").join(format!("{}.html", i));
        assert_eq!(std::fs::read_to_string(page).unwrap(), "<main>doc</main>");
    }
}
