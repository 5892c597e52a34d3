//! End-to-end crawl behavior: dedup, politeness limits, retries, robots,
//! page limits and sitemap seeding

use crate::{create_test_config, domain_of, html, index_linking, mount_open_robots};
use docsweep::crawler::{Coordinator, ErrorKind, SkipReason};
use docsweep::output::{MemoryEventSink, NullProcessor, OutcomeStatus, StopReason};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_open_robots(&server).await;

    let base = server.uri();
    let index = index_linking(&[
        "/guide/".to_string(),
        format!("{}/guide/#install", base),
        "/api".to_string(),
    ]);
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&index))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guide/"))
        .respond_with(html(r#"<a href="/">home</a> <a href="../api">api</a>"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(html(r#"<a href="/guide/">guide</a>"#))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(MemoryEventSink::new());
    let mut coordinator = Coordinator::new(create_test_config(&server, dir.path()))
        .unwrap()
        .with_sink(sink.clone())
        .with_processor(Arc::new(NullProcessor));
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(sink.with_status(OutcomeStatus::Completed).len(), 3);
    assert!(coordinator.frontier().stats().duplicate >= 3);
}

#[tokio::test]
async fn test_concurrency_caps_respected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_open_robots(&server).await;

    let pages: Vec<String> = (0..24).map(|i| format!("/p/{}", i)).collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&index_linking(&pages)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/p/\d+$"))
        .respond_with(html("<p>leaf</p>").set_delay(Duration::from_millis(80)))
        .expect(24)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server, dir.path());
    config.crawling.global_concurrent_requests = 8;
    config.crawling.per_domain_concurrent_requests = 3;

    let mut coordinator = Coordinator::new(config)
        .unwrap()
        .with_processor(Arc::new(NullProcessor));
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.completed, 25);
    let domain = coordinator.session().domain(&domain_of(&server));
    assert!(domain.permits.peak_in_flight() <= 3);
    assert!(domain.permits.peak_in_flight() >= 2);
    assert!(summary.peak_in_flight <= 8);
}

#[tokio::test]
async fn test_503_fails_after_four_attempts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_open_robots(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server, dir.path());
    config.crawling.max_retries = 3;

    let sink = Arc::new(MemoryEventSink::new());
    let mut coordinator = Coordinator::new(config)
        .unwrap()
        .with_sink(sink.clone())
        .with_processor(Arc::new(NullProcessor));
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures_for(&domain_of(&server), ErrorKind::Http5xx), 1);
    let failed = sink.with_status(OutcomeStatus::Failed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 4);
}

#[tokio::test]
async fn test_robots_disallowed_page_never_requested() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&index_linking(&[
            "/private/page".to_string(),
            "/public".to_string(),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(html("<p>secret</p>"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html("<p>hello</p>"))
        .mount(&server)
        .await;

    let mut coordinator = Coordinator::new(create_test_config(&server, dir.path()))
        .unwrap()
        .with_processor(Arc::new(NullProcessor));
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.skip_reasons[&SkipReason::RobotsDisallowed], 1);
}

#[tokio::test]
async fn test_max_pages_stops_with_frontier_left() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_open_robots(&server).await;

    let pages: Vec<String> = (1..=10).map(|i| format!("/chain/{}", i)).collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&index_linking(&pages)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/chain/\d+$"))
        .respond_with(html("<p>page</p>"))
        .mount(&server)
        .await;

    let mut config = create_test_config(&server, dir.path());
    config.crawling.max_pages = Some(5);
    config.crawling.depth_limit = Some(1);

    let mut coordinator = Coordinator::new(config)
        .unwrap()
        .with_processor(Arc::new(NullProcessor));
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.completed, 5);
    assert_eq!(summary.stop_reason, StopReason::MaxPages);
    assert!(summary.frontier_remaining >= 1);
    assert!(!coordinator.frontier().is_empty());
}

#[tokio::test]
async fn test_depth_limit_respected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/one">1</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/one"))
        .respond_with(html(r#"<a href="/two">2</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/two"))
        .respond_with(html("<p>too deep</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server, dir.path());
    config.crawling.depth_limit = Some(1);

    let mut coordinator = Coordinator::new(config)
        .unwrap()
        .with_processor(Arc::new(NullProcessor));
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(coordinator.frontier().stats().too_deep, 1);
}

#[tokio::test]
async fn test_sitemap_seeds_unlinked_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    "User-agent: *\nAllow: /\nSitemap: {}/sitemap.xml\n",
                    base
                )),
        )
        .mount(&server)
        .await;
    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/hidden/a</loc><priority>0.9</priority></url>
  <url><loc>{base}/hidden/b</loc><priority>0.1</priority></url>
  <url><loc>https://elsewhere.org/x</loc></url>
</urlset>"#
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sitemap.into_bytes(), "application/xml"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>no links</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/hidden/[ab]$"))
        .respond_with(html("<p>from sitemap</p>"))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server, dir.path());
    config.sitemap.enabled = true;
    config.sitemap.respect_priority = true;

    let mut coordinator = Coordinator::new(config)
        .unwrap()
        .with_processor(Arc::new(NullProcessor));
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.completed, 3);
}

#[tokio::test]
async fn test_failures_do_not_abort_crawl() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&index_linking(&[
            "/gone".to_string(),
            "/ok".to_string(),
            "/report.pdf".to_string(),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(html("<p>fine</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF".to_vec(), "application/pdf"))
        .mount(&server)
        .await;

    let mut coordinator = Coordinator::new(create_test_config(&server, dir.path()))
        .unwrap()
        .with_processor(Arc::new(NullProcessor));
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures_for(&domain_of(&server), ErrorKind::Http4xx), 1);
    assert_eq!(summary.skip_reasons[&SkipReason::NotHtml], 1);
}

#[tokio::test]
async fn test_429_cools_domain_down_then_retries() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_open_robots(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>welcome back</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(MemoryEventSink::new());
    let mut coordinator = Coordinator::new(create_test_config(&server, dir.path()))
        .unwrap()
        .with_sink(sink.clone())
        .with_processor(Arc::new(NullProcessor));
    let started = std::time::Instant::now();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
    let completed = sink.with_status(OutcomeStatus::Completed);
    assert_eq!(completed[0].attempts, 2);
    // the one-second backoff alone would not cover the Retry-After window
    assert!(started.elapsed() >= Duration::from_millis(1900));
}
