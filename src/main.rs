//! docsweep main entry point
//!
//! This is the command-line interface for the docsweep documentation crawler.

use anyhow::Context;
use clap::Parser;
use docsweep::config::{load_config_with_fingerprint, Config};
use docsweep::crawler::Coordinator;
use docsweep::output::print_summary;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docsweep: a polite, resumable documentation crawler
///
/// docsweep crawls a bounded set of documentation sites while respecting
/// robots.txt, per-domain rate limits and concurrency caps. Progress is
/// checkpointed so an interrupted crawl picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "docsweep")]
#[command(version)]
#[command(about = "A polite, resumable documentation crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Discard an existing checkpoint, even one written for another configuration
    #[arg(long)]
    reset_checkpoint: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Process pages inline even if the pipeline is enabled
    #[arg(long)]
    no_pipeline: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, fingerprint) = load_config_with_fingerprint(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::debug!(fingerprint = %fingerprint, "Configuration loaded");

    if cli.dry_run {
        handle_dry_run(&config, &fingerprint);
        return Ok(());
    }

    handle_crawl(config, cli.reset_checkpoint, cli.no_pipeline).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("docsweep=info,warn"),
            1 => EnvFilter::new("docsweep=debug,info"),
            2 => EnvFilter::new("docsweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, fingerprint: &str) {
    println!("=== docsweep Dry Run: {} ===\n", config.name);

    println!("Site:");
    println!("  Allowed domains: {}", config.site.allowed_domains.join(", "));
    for url in &config.site.start_urls {
        println!("  Start: {}", url);
    }
    for pattern in &config.site.include {
        println!("  Include ({:?}): {}", pattern.kind, pattern.pattern);
    }
    for pattern in &config.site.exclude {
        println!("  Exclude ({:?}): {}", pattern.kind, pattern.pattern);
    }

    let crawling = &config.crawling;
    println!("\nCrawling:");
    match crawling.depth_limit {
        Some(depth) => println!("  Depth limit: {}", depth),
        None => println!("  Depth limit: none"),
    }
    match crawling.max_pages {
        Some(pages) => println!("  Max pages: {}", pages),
        None => println!("  Max pages: none"),
    }
    println!(
        "  Concurrency: {} global, {} per domain",
        crawling.global_concurrent_requests, crawling.per_domain_concurrent_requests
    );
    println!(
        "  Rate: {:.2} req/s per domain, burst {}",
        crawling.refill_rate(),
        crawling.rate_limiter_burst_size
    );
    println!(
        "  Retries: {} (backoff {}, jitter {})",
        crawling.max_retries, crawling.retry_backoff, crawling.retry_jitter
    );
    println!("  Respect robots.txt: {}", crawling.respect_robots_txt);
    println!(
        "  Memory: warn above {}%, stop above {}% (checked every {} pages)",
        crawling.memory_warn_percent, crawling.memory_abort_percent, crawling.memory_check_interval
    );
    println!("  User agent: {}", config.user_agent.header_value());

    println!("\nCheckpoint:");
    if config.checkpoint.enabled {
        println!("  File: {}", config.checkpoint_path().display());
        println!("  Every {} pages", config.checkpoint.checkpoint_interval_pages);
        println!("  Detect changes: {}", config.checkpoint.detect_changes);
    } else {
        println!("  Disabled");
    }
    println!("  Fingerprint: {}", fingerprint);

    println!("\nOutput:");
    println!("  Directory: {}", config.output_dir().display());
    println!("  Save pages: {}", config.output.save_pages);
    if config.pipeline.enabled {
        println!(
            "  Pipeline: {} workers, queue {} items / {} MB",
            config.pipeline.worker_count(),
            config.pipeline.queue_maxsize,
            config.pipeline.max_queue_memory_mb
        );
    }
    if config.sitemap.enabled {
        println!(
            "  Sitemaps: {} explicit, auto-discover {}",
            config.sitemap.urls.len(),
            config.sitemap.auto_discover
        );
    }
    for plugin in config.plugins.iter().filter(|p| p.enabled) {
        println!("  Plugin: {}", plugin.name);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} start URLs",
        config.site.start_urls.len()
    );
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    reset_checkpoint: bool,
    no_pipeline: bool,
) -> anyhow::Result<()> {
    let pipeline = config.pipeline.enabled && !no_pipeline;
    tracing::info!(
        start_urls = config.site.start_urls.len(),
        domains = config.site.allowed_domains.len(),
        "Starting crawl"
    );

    let mut coordinator = Coordinator::new(config)?
        .reset_checkpoint(reset_checkpoint)
        .pipeline(pipeline);

    let session = coordinator.session().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            session.request_stop();
        }
    });

    let summary = coordinator.run().await.context("crawl aborted")?;
    print_summary(&summary);

    if summary.resume_degraded {
        tracing::warn!("Checkpoint writes failed during this run; a resume may refetch pages");
    }
    Ok(())
}
