//! Producer/consumer pipeline between fetching and processing
//!
//! Fetch results are pushed onto a [`MemoryAwareQueue`]; a pool of consumer
//! tasks pops them and runs the [`PageProcessor`] plus the convert and save
//! plugin hooks. A full queue blocks the coordinator's push, which stops it
//! from launching further fetches until consumers catch up.

mod queue;

pub use queue::{MemoryAwareQueue, QueueClosed, QueueStats};

use crate::config::PipelineConfig;
use crate::output::{FetchedPage, PageProcessor};
use crate::plugins::PluginManager;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Pipeline counters reported in the summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub workers: usize,
    pub processed: u64,
    pub errors: u64,
    pub peak_len: usize,
    pub peak_memory_bytes: u64,
    pub producer_waits: u64,
}

/// A fetched page in transit to a consumer
#[derive(Debug)]
pub struct PipelineItem {
    pub page: FetchedPage,
    pub estimated_memory_bytes: u64,
}

impl PipelineItem {
    pub fn new(page: FetchedPage) -> Self {
        let estimated_memory_bytes = page.estimated_memory_bytes();
        Self {
            page,
            estimated_memory_bytes,
        }
    }
}

/// Converts, post-processes and saves one page
///
/// Shared by the inline path and the pipeline consumers.
pub fn process_page(
    processor: &dyn PageProcessor,
    plugins: &PluginManager,
    page: &FetchedPage,
) -> anyhow::Result<Option<PathBuf>> {
    let content = processor.convert(page)?;
    let content = plugins.post_convert(page, content);
    let path = processor.save(page, &content)?;
    plugins.post_save(page, path.as_deref());
    Ok(path)
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    errors: AtomicU64,
}

/// Running pipeline
pub struct Pipeline {
    queue: Arc<MemoryAwareQueue<PipelineItem>>,
    workers: JoinSet<()>,
    worker_count: usize,
    counters: Arc<Counters>,
}

impl Pipeline {
    /// Starts the consumer pool
    pub fn start(
        config: &PipelineConfig,
        processor: Arc<dyn PageProcessor>,
        plugins: Arc<PluginManager>,
    ) -> Self {
        let queue = Arc::new(MemoryAwareQueue::new(
            config.queue_maxsize,
            config.max_queue_memory_bytes(),
        ));
        let counters = Arc::new(Counters::default());
        let worker_count = config.worker_count().max(1);

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            workers.spawn(consume(
                id,
                queue.clone(),
                processor.clone(),
                plugins.clone(),
                counters.clone(),
            ));
        }
        info!(
            workers = worker_count,
            max_items = queue.max_items(),
            max_memory_mb = config.max_queue_memory_mb,
            "pipeline started"
        );

        Self {
            queue,
            workers,
            worker_count,
            counters,
        }
    }

    /// Hands a page to the consumers, waiting while the queue is full
    ///
    /// # Errors
    ///
    /// Returns the page if the pipeline is already shutting down.
    pub async fn enqueue(&self, page: FetchedPage) -> Result<(), FetchedPage> {
        let item = PipelineItem::new(page);
        let size = item.estimated_memory_bytes;
        self.queue
            .push(item, size)
            .await
            .map_err(|QueueClosed(item)| item.page)
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.stats().await
    }

    /// Closes the queue and waits for consumers to drain it
    pub async fn shutdown(mut self) -> PipelineStats {
        let remaining = self.queue.len().await;
        info!(remaining, "pipeline draining");
        self.queue.close().await;

        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "pipeline worker panicked");
            }
        }

        let queue = self.queue.stats().await;
        PipelineStats {
            workers: self.worker_count,
            processed: self.counters.processed.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            peak_len: queue.peak_len,
            peak_memory_bytes: queue.peak_memory_bytes,
            producer_waits: queue.producer_waits,
        }
    }
}

async fn consume(
    id: usize,
    queue: Arc<MemoryAwareQueue<PipelineItem>>,
    processor: Arc<dyn PageProcessor>,
    plugins: Arc<PluginManager>,
    counters: Arc<Counters>,
) {
    while let Some(item) = queue.pop().await {
        let url = item.page.url.to_string();
        let processor = processor.clone();
        let plugins = plugins.clone();
        let result = tokio::task::spawn_blocking(move || {
            process_page(processor.as_ref(), &plugins, &item.page)
        })
        .await;

        match result {
            Ok(Ok(path)) => {
                counters.processed.fetch_add(1, Ordering::Relaxed);
                debug!(worker = id, url = %url, path = ?path, "page processed");
            }
            Ok(Err(e)) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(worker = id, url = %url, error = %e, "page processing failed");
            }
            Err(e) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(worker = id, url = %url, error = %e, "page processing panicked");
            }
        }
    }
    debug!(worker = id, "pipeline worker finished");
}
