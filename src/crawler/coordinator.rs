//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator owns the frontier and the checkpoint. It pulls entries,
//! decides from the checkpoint whether each needs fetching, spawns one
//! fetch task per URL (bounded by the global concurrency limit and
//! `max-pages`), and folds every terminal outcome back in:
//! - One checkpoint record update and one [`CrawlEvent`]
//! - Discovered links pushed to the frontier at depth + 1
//! - The page handed to the processor, inline or through the pipeline
//!
//! The checkpoint is saved every `checkpoint-interval-pages` outcomes and
//! once more at the end, including after a stop request. A fetch task that
//! panics still ends as a failed outcome, and crossing the memory abort
//! threshold flushes the checkpoint and stops the crawl.

use crate::checkpoint::{
    open_checkpoint, resume_action, CheckpointStore, CrawlRecord, RecordStatus, ResumeAction,
};
use crate::config::{compute_config_fingerprint, Config};
use crate::crawler::fetcher::{FetchError, Validators};
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::memory::{MemoryLevel, MemoryReader, MemoryWatch};
use crate::crawler::sitemap::{collect_entries, discover_sitemaps};
use crate::crawler::worker::{run_fetch, FetchOutcome, FetchReport, SkipReason};
use crate::output::{
    processor_from_config, CrawlEvent, CrawlSummary, EventSink, FetchedPage, OutcomeStatus,
    PageProcessor, Progress, StopReason, TracingEventSink,
};
use crate::pipeline::{process_page, Pipeline};
use crate::plugins::{self, PluginContext, PluginManager};
use crate::robots::RobotsRules;
use crate::session::CrawlSession;
use crate::url::domain_key;
use crate::{CrawlError, Result};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{self, JoinError, JoinSet};
use url::Url;

/// Outcomes between two progress reports
const PROGRESS_INTERVAL: u64 = 10;

/// What to do with a dequeued entry
enum Plan {
    Skip,
    Fetch {
        validators: Option<Validators>,
        previous_hash: Option<String>,
    },
}

/// Main crawler coordinator structure
pub struct Coordinator {
    session: Arc<CrawlSession>,
    frontier: Frontier,
    fingerprint: String,
    reset_checkpoint: bool,
    use_pipeline: bool,
    checkpoint: Option<Box<dyn CheckpointStore>>,
    /// canonical URL → latest record
    records: HashMap<String, CrawlRecord>,
    /// Records changed since the last save
    dirty: BTreeSet<String>,
    sink: Arc<dyn EventSink>,
    processor: Arc<dyn PageProcessor>,
    plugins: Arc<PluginManager>,
    pipeline: Option<Pipeline>,
    summary: CrawlSummary,
    outcomes_since_save: u64,
    memory: MemoryWatch,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawl configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to [`Coordinator::run`]
    /// * `Err(CrawlError)` - The HTTP client, URL filter or plugin list
    ///   could not be built
    pub fn new(config: Config) -> Result<Self> {
        let plugins = plugins::from_config(&config)?;
        let session = CrawlSession::new(config)?;
        Ok(Self::from_session(Arc::new(session)).with_plugins(plugins))
    }

    /// Creates a coordinator around an existing session
    pub fn from_session(session: Arc<CrawlSession>) -> Self {
        let config = session.config();
        let frontier = Frontier::new(
            session.filter().clone(),
            config.crawling.depth_limit,
            config.sitemap.enabled && config.sitemap.respect_priority,
        );

        Self {
            fingerprint: compute_config_fingerprint(config),
            use_pipeline: config.pipeline.enabled,
            processor: processor_from_config(config),
            summary: CrawlSummary::new(&config.name),
            frontier,
            reset_checkpoint: false,
            checkpoint: None,
            records: HashMap::new(),
            dirty: BTreeSet::new(),
            sink: Arc::new(TracingEventSink),
            plugins: Arc::new(PluginManager::new()),
            pipeline: None,
            outcomes_since_save: 0,
            memory: MemoryWatch::from_config(&config.crawling),
            session,
        }
    }

    /// Discards an existing checkpoint instead of resuming or refusing it
    pub fn reset_checkpoint(mut self, reset: bool) -> Self {
        self.reset_checkpoint = reset;
        self
    }

    /// Overrides `[pipeline].enabled`
    pub fn pipeline(mut self, enabled: bool) -> Self {
        self.use_pipeline = enabled;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn PageProcessor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginManager) -> Self {
        self.plugins = Arc::new(plugins);
        self
    }

    /// Uses `store` instead of opening the configured checkpoint file
    pub fn with_checkpoint(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.checkpoint = Some(store);
        self
    }

    /// Samples memory from `reader` instead of the operating system
    pub fn with_memory_reader(self, reader: Box<dyn MemoryReader>) -> Self {
        Self {
            memory: self.memory.with_reader(reader),
            ..self
        }
    }

    pub fn session(&self) -> &Arc<CrawlSession> {
        &self.session
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    /// Runs the crawl to completion
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlSummary)` - The crawl ran; individual pages may have failed
    /// * `Err(CrawlError)` - The checkpoint belongs to another configuration, or
    ///   a configured sitemap URL does not parse
    pub async fn run(&mut self) -> Result<CrawlSummary> {
        let started = Instant::now();
        self.open_checkpoint()?;
        self.seed().await?;

        self.plugins
            .pre_crawl(&PluginContext::from_config(self.session.config()));

        if self.use_pipeline {
            self.pipeline = Some(Pipeline::start(
                &self.session.config().pipeline,
                self.processor.clone(),
                self.plugins.clone(),
            ));
        }

        tracing::info!(
            name = %self.summary.name,
            frontier = self.frontier.len(),
            pipeline = self.use_pipeline,
            "Starting crawl"
        );

        self.crawl_loop(started).await;

        self.save_checkpoint();
        if let Some(pipeline) = self.pipeline.take() {
            self.summary.pipeline = Some(pipeline.shutdown().await);
        }

        self.summary.elapsed = started.elapsed();
        self.summary.frontier_remaining = self.frontier.len();
        self.summary.peak_in_flight = self.session.global_permits().peak_in_flight();
        self.plugins.post_crawl(&self.summary);
        self.summary.plugin_failures = self.plugins.failures();

        tracing::info!(
            completed = self.summary.completed,
            failed = self.summary.failed,
            skipped = self.summary.skipped,
            elapsed_ms = self.summary.elapsed.as_millis() as u64,
            stop = %self.summary.stop_reason,
            "Crawl finished"
        );

        Ok(self.summary.clone())
    }

    async fn crawl_loop(&mut self, started: Instant) {
        let global_limit = self.session.config().crawling.global_concurrent_requests.max(1);
        let max_pages = self.session.config().crawling.max_pages;
        let mut stop = self.session.stop_signal();
        let mut tasks: JoinSet<FetchReport> = JoinSet::new();
        let mut running: HashMap<task::Id, FrontierEntry> = HashMap::new();
        let mut spawned: u64 = 0;
        let mut pulling = true;

        loop {
            while pulling && tasks.len() < global_limit {
                if self.session.is_stopping() {
                    self.halt(StopReason::Interrupted);
                    pulling = false;
                    break;
                }
                if max_pages.map_or(false, |max| spawned >= max) {
                    tracing::info!(max_pages = spawned, "Page limit reached");
                    self.halt(StopReason::MaxPages);
                    pulling = false;
                    break;
                }
                let Some(entry) = self.frontier.dequeue() else {
                    break;
                };

                match self.plan(&entry) {
                    Plan::Skip => {
                        tracing::debug!(url = %entry.url, "Already completed");
                        self.finish_skipped(&entry, SkipReason::AlreadyCompleted, 0);
                        self.after_outcome(started);
                    }
                    Plan::Fetch {
                        validators,
                        previous_hash,
                    } => {
                        self.mark_pending(&entry);
                        spawned += 1;
                        let session = self.session.clone();
                        let target = entry.clone();
                        let handle = tasks.spawn(async move {
                            run_fetch(&session, &target, validators, previous_hash.as_deref())
                                .await
                        });
                        running.insert(handle.id(), entry);
                    }
                }
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next_with_id() => match joined {
                    Some(Ok((id, report))) => {
                        if let Some(entry) = running.remove(&id) {
                            self.handle_report(entry, report).await;
                            self.after_outcome(started);
                        }
                    }
                    Some(Err(e)) => match running.remove(&e.id()) {
                        Some(entry) => {
                            self.finish_aborted(&entry, e);
                            self.after_outcome(started);
                        }
                        None => tracing::error!(error = %e, "Unknown fetch task aborted"),
                    },
                    None => {}
                },
                changed = stop.changed(), if pulling => {
                    if changed.is_ok() && *stop.borrow() {
                        self.halt(StopReason::Interrupted);
                        pulling = false;
                    }
                }
            }
        }
    }

    /// Opens the checkpoint and loads prior progress
    ///
    /// A checkpoint whose metadata cannot be read is left untouched and the
    /// crawl runs without one, marked resume-degraded.
    fn open_checkpoint(&mut self) -> Result<()> {
        let session = self.session.clone();
        let config = session.config();

        let mut store = match self.checkpoint.take() {
            Some(store) => store,
            None if !config.checkpoint.enabled => return Ok(()),
            None => {
                let path = config.checkpoint_path();
                match open_checkpoint(&config.checkpoint, &path) {
                    Ok(store) => store,
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Checkpoint unavailable, resume is degraded"
                        );
                        self.degrade();
                        return Ok(());
                    }
                }
            }
        };
        let path = store.path().to_path_buf();

        if self.reset_checkpoint {
            tracing::info!(path = %path.display(), "Discarding checkpoint");
            if let Err(e) = store.reset() {
                tracing::warn!(error = %e, "Failed to reset checkpoint");
                self.degrade();
            }
        } else {
            // Some(meta) only for a checkpoint written by another configuration
            let foreign = store.is_resumable(&self.fingerprint).and_then(|resumable| {
                if resumable {
                    Ok(None)
                } else {
                    store.metadata()
                }
            });
            match foreign {
                Ok(None) => {}
                Ok(Some(meta)) => {
                    return Err(CrawlError::FingerprintMismatch {
                        stored: meta.config_fingerprint,
                        current: self.fingerprint.clone(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Checkpoint metadata unreadable, crawling without checkpoint"
                    );
                    self.degrade();
                    return Ok(());
                }
            }
        }

        let loaded = store
            .begin(&config.name, &self.fingerprint)
            .and_then(|_| store.load())
            .and_then(|records| Ok((records, store.load_queue()?)));

        match loaded {
            Ok((records, queue)) => {
                if !records.is_empty() || !queue.is_empty() {
                    tracing::info!(
                        backend = store.backend_name(),
                        records = records.len(),
                        queued = queue.len(),
                        "Resuming from checkpoint"
                    );
                }
                for queued in &queue {
                    self.frontier.restore(queued);
                }
                self.records = records;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load checkpoint, starting fresh");
                self.degrade();
            }
        }

        self.checkpoint = Some(store);
        Ok(())
    }

    /// Seeds the frontier from start URLs, unfinished records and sitemaps
    async fn seed(&mut self) -> Result<()> {
        let session = self.session.clone();
        let config = session.config();
        for start in &config.site.start_urls {
            self.frontier.enqueue_str(start, 0, None);
        }

        let now = Utc::now();
        let mut revisit: Vec<&CrawlRecord> = self
            .records
            .values()
            .filter(|r| resume_action(r, &config.checkpoint, now) != ResumeAction::Skip)
            .collect();
        revisit.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));
        for record in revisit {
            self.frontier
                .enqueue_str(&record.url, record.depth, record.discovered_from.as_deref());
        }

        if config.sitemap.enabled {
            self.seed_sitemaps().await?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`CrawlError::UrlParse`] for a configured sitemap URL that does not parse
    async fn seed_sitemaps(&mut self) -> Result<()> {
        let session = self.session.clone();
        let config = session.config();
        let mut roots = config
            .sitemap
            .urls
            .iter()
            .map(|u| Url::parse(u))
            .collect::<std::result::Result<Vec<Url>, _>>()?;

        if config.sitemap.auto_discover {
            let mut origins = BTreeSet::new();
            for start in &config.site.start_urls {
                let Ok(url) = Url::parse(start) else { continue };
                if !origins.insert(url.origin().ascii_serialization()) {
                    continue;
                }
                let robots = match session.robots_for(&url).await {
                    Ok(rules) => rules,
                    Err(e) => {
                        tracing::debug!(
                            url = %url,
                            error = %e,
                            "No robots.txt for sitemap discovery"
                        );
                        Arc::new(RobotsRules::allow_all())
                    }
                };
                for found in discover_sitemaps(&session, &url, &robots).await {
                    if !roots.contains(&found) {
                        roots.push(found);
                    }
                }
            }
        }

        if roots.is_empty() {
            tracing::debug!("No sitemaps found");
            return Ok(());
        }

        let entries = collect_entries(&session, roots, config.sitemap.max_urls).await;
        let mut accepted = 0;
        for entry in entries {
            let Ok(url) = Url::parse(&entry.loc) else { continue };
            if self
                .frontier
                .enqueue_with_priority(&url, 0, None, entry.priority.unwrap_or(0.0))
            {
                accepted += 1;
            }
        }
        tracing::info!(accepted, "Seeded frontier from sitemaps");
        Ok(())
    }

    fn plan(&self, entry: &FrontierEntry) -> Plan {
        let Some(record) = self.records.get(&entry.canonical) else {
            return Plan::Fetch {
                validators: None,
                previous_hash: None,
            };
        };

        let config = &self.session.config().checkpoint;
        match resume_action(record, config, Utc::now()) {
            ResumeAction::Skip => Plan::Skip,
            ResumeAction::Fetch => Plan::Fetch {
                validators: None,
                previous_hash: None,
            },
            ResumeAction::Revalidate(validators) => Plan::Fetch {
                validators: Some(validators),
                previous_hash: record.content_hash.clone(),
            },
        }
    }

    fn mark_pending(&mut self, entry: &FrontierEntry) {
        if self.records.contains_key(&entry.canonical) {
            return;
        }
        let record = CrawlRecord::pending(
            &entry.canonical,
            entry.depth,
            entry.discovered_from.as_deref(),
        );
        self.records.insert(entry.canonical.clone(), record);
        self.dirty.insert(entry.canonical.clone());
    }

    fn record_for(&self, entry: &FrontierEntry) -> CrawlRecord {
        self.records.get(&entry.canonical).cloned().unwrap_or_else(|| {
            CrawlRecord::pending(
                &entry.canonical,
                entry.depth,
                entry.discovered_from.as_deref(),
            )
        })
    }

    fn store_record(&mut self, record: CrawlRecord) {
        self.dirty.insert(record.url.clone());
        self.records.insert(record.url.clone(), record);
    }

    fn emit(&mut self, event: CrawlEvent) {
        self.sink.record(&event);
        self.summary.record(&event);
    }

    async fn handle_report(&mut self, entry: FrontierEntry, report: FetchReport) {
        let attempts = report.attempts;
        match report.outcome {
            FetchOutcome::Succeeded(page) => self.finish_succeeded(&entry, page, attempts).await,
            FetchOutcome::Failed { error, attempts } => self.finish_failed(&entry, error, attempts),
            FetchOutcome::Skipped { reason } => self.finish_skipped(&entry, reason, attempts),
        }
    }

    async fn finish_succeeded(&mut self, entry: &FrontierEntry, page: FetchedPage, attempts: u32) {
        let mut record = self.record_for(entry);
        record.status = RecordStatus::Completed;
        record.content_hash = Some(page.content_hash.clone());
        record.last_attempted_at = page.fetched_at;
        record.attempt_count = attempts;
        record.last_error = None;
        record.status_code = Some(page.status);
        record.etag = page.etag.clone();
        record.last_modified = page.last_modified.clone();
        self.store_record(record);

        self.emit(CrawlEvent {
            url: entry.url.to_string(),
            domain: domain_key(&entry.url).unwrap_or_default(),
            status: OutcomeStatus::Completed,
            attempts,
            error_kind: None,
            error: None,
            skip_reason: None,
        });

        self.plugins.post_fetch(&page);

        let next_depth = entry.depth + 1;
        let parent = page.url.to_string();
        let mut discovered = 0;
        for link in &page.links {
            if self.frontier.enqueue_str(link, next_depth, Some(&parent)) {
                discovered += 1;
            }
        }
        tracing::debug!(url = %entry.url, links = page.links.len(), discovered, "Links queued");

        self.process(page).await;
    }

    /// Hands a page downstream, through the pipeline when one is running
    async fn process(&mut self, page: FetchedPage) {
        let page = match &self.pipeline {
            Some(pipeline) => match pipeline.enqueue(page).await {
                Ok(()) => return,
                Err(page) => page,
            },
            None => page,
        };

        let url = page.url.to_string();
        let processor = self.processor.clone();
        let plugins = self.plugins.clone();
        let result =
            tokio::task::spawn_blocking(move || process_page(processor.as_ref(), &plugins, &page))
                .await;

        match result {
            Ok(Ok(path)) => tracing::debug!(url = %url, path = ?path, "Page processed"),
            Ok(Err(e)) => tracing::warn!(url = %url, error = %e, "Page processing failed"),
            Err(e) => tracing::error!(url = %url, error = %e, "Page processing panicked"),
        }
    }

    fn finish_failed(&mut self, entry: &FrontierEntry, error: FetchError, attempts: u32) {
        let mut record = self.record_for(entry);
        record.status = RecordStatus::Failed;
        record.last_attempted_at = Utc::now();
        record.attempt_count = attempts;
        record.last_error = Some(error.to_string());
        record.status_code = match &error {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        };
        self.store_record(record);

        self.emit(CrawlEvent {
            url: entry.url.to_string(),
            domain: domain_key(&entry.url).unwrap_or_default(),
            status: OutcomeStatus::Failed,
            attempts,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            skip_reason: None,
        });
    }

    /// Records a fetch task that panicked or was cancelled as failed
    fn finish_aborted(&mut self, entry: &FrontierEntry, error: JoinError) {
        tracing::error!(url = %entry.url, error = %error, "Fetch task aborted");
        let attempts = self
            .records
            .get(&entry.canonical)
            .map_or(1, |r| r.attempt_count + 1);
        self.finish_failed(entry, FetchError::Aborted(error.to_string()), attempts);
    }

    fn finish_skipped(&mut self, entry: &FrontierEntry, reason: SkipReason, attempts: u32) {
        match reason {
            // The completed record stands as it is
            SkipReason::AlreadyCompleted => {}
            SkipReason::Unchanged => {
                let mut record = self.record_for(entry);
                record.status = RecordStatus::Completed;
                record.last_attempted_at = Utc::now();
                self.store_record(record);
            }
            SkipReason::RobotsDisallowed | SkipReason::TooLarge | SkipReason::NotHtml => {
                let mut record = self.record_for(entry);
                record.status = RecordStatus::Skipped;
                record.last_attempted_at = Utc::now();
                record.attempt_count = attempts;
                record.last_error = Some(reason.to_string());
                self.store_record(record);
            }
        }

        self.emit(CrawlEvent {
            url: entry.url.to_string(),
            domain: domain_key(&entry.url).unwrap_or_default(),
            status: OutcomeStatus::Skipped,
            attempts,
            error_kind: None,
            error: None,
            skip_reason: Some(reason),
        });
    }

    /// Progress reporting and periodic checkpointing
    fn after_outcome(&mut self, started: Instant) {
        let total = self.summary.total();
        if total % PROGRESS_INTERVAL == 0 {
            let elapsed = started.elapsed().as_secs_f64();
            let progress = Progress {
                completed: self.summary.completed,
                failed: self.summary.failed,
                skipped: self.summary.skipped,
                frontier: self.frontier.len(),
                in_flight: self.session.global_permits().in_flight(),
                pages_per_sec: if elapsed > 0.0 {
                    self.summary.completed as f64 / elapsed
                } else {
                    0.0
                },
            };
            self.sink.progress(&progress);
        }

        self.outcomes_since_save += 1;
        let interval = self.session.config().checkpoint.checkpoint_interval_pages.max(1);
        if self.outcomes_since_save >= interval {
            self.save_checkpoint();
        }

        if self.memory.check() == MemoryLevel::Critical && !self.session.is_stopping() {
            self.halt(StopReason::HighMemory);
            self.save_checkpoint();
            self.session.request_stop();
        }
    }

    /// Sets why the crawl stopped pulling work; the first reason sticks
    fn halt(&mut self, reason: StopReason) {
        if self.summary.stop_reason == StopReason::Exhausted {
            self.summary.stop_reason = reason;
        }
    }

    /// Persists changed records and the frontier snapshot
    ///
    /// Failures are logged and mark the run as resume-degraded; the crawl
    /// continues either way.
    fn save_checkpoint(&mut self) {
        self.outcomes_since_save = 0;
        let Some(store) = self.checkpoint.as_mut() else {
            self.dirty.clear();
            return;
        };

        let batch: Vec<CrawlRecord> = self
            .dirty
            .iter()
            .filter_map(|url| self.records.get(url).cloned())
            .collect();
        let queue = self.frontier.pending_entries();
        let marker = self.summary.total();

        match store
            .save(&batch, marker)
            .and_then(|_| store.save_queue(&queue))
        {
            Ok(()) => {
                tracing::debug!(records = batch.len(), queued = queue.len(), "Checkpoint saved");
                self.dirty.clear();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Checkpoint save failed, resume is degraded");
                self.summary.checkpoint_errors += 1;
                self.summary.resume_degraded = true;
            }
        }
    }

    fn degrade(&mut self) {
        self.summary.checkpoint_errors += 1;
        self.summary.resume_degraded = true;
    }
}

/// Runs a complete crawl with the default sink and processor
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Crawl completed, possibly with failed pages
/// * `Err(CrawlError)` - Setup failed or the checkpoint was rejected
///
/// # Example
///
/// ```no_run
/// use docsweep::config::load_config;
/// use docsweep::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("docsweep.toml"))?;
/// let summary = run_crawl(config).await?;
/// println!("{} pages", summary.completed);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config) -> Result<CrawlSummary> {
    let mut coordinator = Coordinator::new(config)?;
    coordinator.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{MemoryEventSink, NullProcessor};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> Config {
        let mut config = Config::new(
            "unit",
            vec![format!("{}/", server.uri())],
            vec!["127.0.0.1".to_string()],
        );
        config.crawling.delay_between_requests = 0.001;
        config.crawling.retry_jitter = 0.0;
        config.crawling.retry_backoff = 1.0;
        config.output.save_pages = false;
        config
    }

    fn page(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
    }

    #[tokio::test]
    async fn test_follows_links_and_dedups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(page(
                r#"<a href="/a">a</a><a href="/b">b</a><a href="/a#top">a again</a>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(page(r#"<a href="/">home</a><a href="/b">b</a>"#))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(page("<p>leaf</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(MemoryEventSink::new());
        let mut coordinator = Coordinator::new(config_for(&server))
            .unwrap()
            .with_sink(sink.clone())
            .with_processor(Arc::new(NullProcessor));
        let summary = coordinator.run().await.unwrap();

        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.stop_reason, StopReason::Exhausted);
        assert_eq!(sink.events().len(), 3);
        assert!(coordinator.frontier().is_empty());
    }

    #[tokio::test]
    async fn test_stop_before_run_fetches_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(page("<p>x</p>"))
            .expect(0)
            .mount(&server)
            .await;

        let mut coordinator = Coordinator::new(config_for(&server))
            .unwrap()
            .with_processor(Arc::new(NullProcessor));
        coordinator.session().request_stop();
        let summary = coordinator.run().await.unwrap();

        assert_eq!(summary.total(), 0);
        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        assert_eq!(summary.frontier_remaining, 1);
    }

    #[tokio::test]
    async fn test_panicked_fetch_task_recorded_as_failed() {
        let config = Config::new(
            "unit",
            vec!["https://example.com/".to_string()],
            vec!["example.com".to_string()],
        );
        let sink = Arc::new(MemoryEventSink::new());
        let mut coordinator = Coordinator::new(config).unwrap().with_sink(sink.clone());

        let url = Url::parse("https://example.com/broken").unwrap();
        let entry = FrontierEntry {
            canonical: url.to_string(),
            url,
            depth: 1,
            discovered_from: None,
            priority: 0.0,
        };
        coordinator.mark_pending(&entry);

        let mut tasks: JoinSet<()> = JoinSet::new();
        let handle = tasks.spawn(async { panic!("extractor bug") });
        let error = tasks.join_next_with_id().await.unwrap().unwrap_err();
        assert!(error.is_panic());
        assert_eq!(error.id(), handle.id());

        coordinator.finish_aborted(&entry, error);

        assert_eq!(coordinator.summary.failed, 1);
        let record = &coordinator.records[&entry.canonical];
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.attempt_count, 1);
        assert!(record.last_error.as_deref().unwrap().starts_with("Fetch task aborted"));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, OutcomeStatus::Failed);
        assert_eq!(events[0].error_kind, Some(crate::crawler::ErrorKind::Internal));
    }

    #[tokio::test]
    async fn test_unparsable_sitemap_url_is_an_error() {
        let server = MockServer::start().await;
        let mut config = config_for(&server);
        config.sitemap.enabled = true;
        config.sitemap.auto_discover = false;
        config.sitemap.urls = vec!["::not a url::".to_string()];

        let mut coordinator = Coordinator::new(config)
            .unwrap()
            .with_processor(Arc::new(NullProcessor));
        assert!(matches!(
            coordinator.run().await,
            Err(CrawlError::UrlParse(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_plugin_rejected() {
        let mut config = Config::new(
            "unit",
            vec!["https://example.com/".to_string()],
            vec!["example.com".to_string()],
        );
        config.plugins.push(crate::config::PluginEntry {
            name: "does-not-exist".to_string(),
            enabled: true,
            options: toml::Table::new(),
        });
        assert!(matches!(
            Coordinator::new(config),
            Err(CrawlError::Config(_))
        ));
    }
}
