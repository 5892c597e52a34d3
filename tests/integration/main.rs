//! Integration tests for docsweep
//!
//! These tests run full crawls against wiremock servers, with checkpoints
//! and output written to temporary directories.

mod checkpoint_tests;
mod crawl_tests;
mod pipeline_tests;

use docsweep::config::Config;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for a mock server, with fast pacing
pub fn create_test_config(server: &MockServer, output_dir: &std::path::Path) -> Config {
    let mut config = Config::new(
        "integration",
        vec![format!("{}/", server.uri())],
        vec!["127.0.0.1".to_string()],
    );
    config.crawling.delay_between_requests = 0.001;
    config.crawling.rate_limiter_burst_size = 100;
    config.crawling.retry_backoff = 1.0;
    config.crawling.retry_jitter = 0.0;
    config.output.directory = output_dir.display().to_string();
    config.output.save_pages = false;
    config
}

/// HTML response with an explicit content type
pub fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

/// An index page linking to each path
pub fn index_linking(paths: &[String]) -> String {
    let links: String = paths
        .iter()
        .map(|p| format!(r#"<li><a href="{}">{}</a></li>"#, p, p))
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", links)
}

/// robots.txt that allows everything
pub async fn mount_open_robots(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /\n"))
        .mount(server)
        .await;
}

/// Host key the crawler uses for the mock server
pub fn domain_of(server: &MockServer) -> String {
    let url = url::Url::parse(&server.uri()).unwrap();
    docsweep::url::domain_key(&url).unwrap()
}
