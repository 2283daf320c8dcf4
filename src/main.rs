//! # Sitemap Harvest
//!
//! A resumable harvester that discovers article URLs from a two-level
//! sitemap, fetches each article, extracts its title and content, and keeps
//! enough durable state on disk that an interrupted run can simply be
//! started again.
//!
//! ## Usage
//!
//! ```sh
//! sitemap_harvest -d ./data --sitemap https://www.cairo360.com/ar/sitemap.xml
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: walk the sitemap index into an append-only frontier
//!    (skipped when a frontier already exists)
//! 2. **Harvest**: fetch every frontier entry not in the progress ledger,
//!    write `articles/{index}.json`, then mark the URL processed
//! 3. **Combine**: merge all article files into `all_articles.json`
//!
//! Failures never abort a run. They land in `failures.txt` and
//! `discarded_urls.txt`, and the next run retries whatever is still pending.

use clap::Parser;
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod discover;
mod error;
mod extract;
mod fetch;
mod frontier;
mod ledger;
mod models;
mod outputs;
mod pipeline;
mod sitemap;
mod utils;

use cli::{Cli, Command};
use config::{CrawlConfig, Layout};
use error::ConfigError;
use extract::Extractor;
use fetch::{Fetcher, HttpFetcher, RetryFetch};
use frontier::FrontierStore;
use ledger::{FailureLedger, ProgressLedger};
use outputs::artifacts::ArtifactStore;
use outputs::corpus;
use pipeline::Harvester;
use sitemap::SitemapWalker;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("sitemap_harvest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut config = CrawlConfig::load(args.config.as_deref())?;
    if let Some(ref url) = args.sitemap {
        config.sitemap_url = Some(url.clone());
    }
    let layout = Layout::new(&args.data_dir);

    if let Err(e) = ensure_writable_dir(&layout.root).await {
        error!(
            path = %layout.root.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let fetcher = RetryFetch::new(
        HttpFetcher::new(&config)?,
        config.max_retries,
        Duration::from_millis(config.retry_base_delay_ms),
    );

    match args.command() {
        Command::Discover => {
            run_discovery(&config, &layout, &fetcher, true).await?;
        }
        Command::Harvest => {
            run_harvest(&config, &layout, &fetcher, args.concurrency, args.limit).await?;
        }
        Command::Combine => {
            run_combine(&layout).await?;
        }
        Command::Run { rediscover } => {
            run_discovery(&config, &layout, &fetcher, rediscover).await?;
            run_harvest(&config, &layout, &fetcher, args.concurrency, args.limit).await?;
            run_combine(&layout).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// Grow the frontier from the sitemap index.
///
/// Without `force`, an existing non-empty frontier means discovery already
/// happened and the walk is skipped.
async fn run_discovery<F: Fetcher>(
    config: &CrawlConfig,
    layout: &Layout,
    fetcher: &F,
    force: bool,
) -> Result<(), Box<dyn Error>> {
    let mut frontier = FrontierStore::open(layout.frontier(), layout.discarded()).await?;
    if !discover::should_walk(&frontier, force) {
        info!(
            entries = frontier.len(),
            path = %layout.frontier().display(),
            "Frontier exists; skipping sitemap walk"
        );
        return Ok(());
    }

    let index_url = config
        .sitemap_url
        .as_deref()
        .ok_or(ConfigError::MissingSitemap)?;
    let walker = SitemapWalker::new(fetcher, config.sitemap_marker.as_str(), config.skip_leading_urls);
    let report = discover::discover(&walker, index_url, &mut frontier).await;
    if report.ledger_errors > 0 {
        warn!(
            lost_batches = report.ledger_errors,
            "Some sitemap batches could not be persisted; rerun discover"
        );
    }
    Ok(())
}

async fn run_harvest<F: Fetcher>(
    config: &CrawlConfig,
    layout: &Layout,
    fetcher: &F,
    concurrency: usize,
    limit: Option<usize>,
) -> Result<(), Box<dyn Error>> {
    let entries = frontier::load(layout.frontier()).await?;
    if entries.is_empty() {
        warn!(path = %layout.frontier().display(), "Frontier is empty; nothing to harvest");
        return Ok(());
    }

    let extractor = Extractor::new(&config.title_selector, &config.content_selector)?;
    let artifacts = ArtifactStore::new(layout.artifacts());
    let failures = FailureLedger::new(layout.failures());
    let mut progress = ProgressLedger::open(layout.progress()).await?;
    if progress.is_empty() {
        info!(path = %layout.progress().display(), "No progress recorded yet; starting fresh");
    }

    let harvester = Harvester::new(fetcher, &extractor, &artifacts, concurrency);
    let report = harvester
        .run(entries, &mut progress, &failures, limit, |entry, item| {
            debug!(index = entry.index, title = %item.title, "Emitted item");
        })
        .await;

    if report.failed > 0 {
        info!(
            failed = report.failed,
            path = %layout.failures().display(),
            "Failures recorded; rerun to retry"
        );
    }
    Ok(())
}

async fn run_combine(layout: &Layout) -> Result<(), Box<dyn Error>> {
    let artifacts = ArtifactStore::new(layout.artifacts());
    let combined = corpus::combine(&artifacts).await?;
    corpus::write_corpus(&combined, &layout.corpus()).await?;
    Ok(())
}
