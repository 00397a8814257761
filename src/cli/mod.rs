//! Command-line interface for rss2epub.
//!
//! Two modes:
//! - `rss2epub <FEED_URL>` converts the new posts of one feed and exits
//! - `rss2epub --monitor` watches every feed in a feed list until Ctrl+C

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::adapters::HttpFeedFetcher;
use crate::config::{parse_interval, Overrides, Settings};
use crate::core::{EpubConverter, FeedProcessor, FeedRegistry, HistoryStore, ProcessReport};

/// Usage text shown when no mode is selected
pub const USAGE: &str = "\
Usage: rss2epub <FEED_URL>
       rss2epub --monitor [--feed-list FILE] [--output DIR] [--interval SECONDS]

Example: rss2epub https://example.com/feed.rss";

/// rss2epub - Convert new RSS/Atom posts into EPUB files
#[derive(Parser, Debug)]
#[command(name = "rss2epub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Feed URL to convert once
    #[arg(value_name = "FEED_URL", conflicts_with = "monitor")]
    pub url: Option<String>,

    /// Watch all feeds in the feed list, re-checking on an interval
    #[arg(long)]
    pub monitor: bool,

    /// Feed list, one URL per line (monitor mode) [default: rss_feed.txt]
    #[arg(long, value_name = "FILE", env = "RSS2EPUB_FEED_LIST")]
    pub feed_list: Option<PathBuf>,

    /// Output directory for EPUB files [default: output]
    #[arg(long, value_name = "DIR", env = "RSS2EPUB_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Seconds between checks (monitor mode) [default: 300]
    #[arg(long, value_name = "SECONDS", value_parser = parse_interval, env = "RSS2EPUB_INTERVAL")]
    pub interval: Option<Duration>,

    /// Directory for per-feed history files (monitor mode) [default: history]
    #[arg(long, value_name = "DIR", env = "RSS2EPUB_HISTORY_DIR")]
    pub history_dir: Option<PathBuf>,

    /// History file (single-feed mode) [default: seen_posts.txt]
    #[arg(long, value_name = "FILE", env = "RSS2EPUB_HISTORY_FILE")]
    pub history_file: Option<PathBuf>,

    /// Run a single monitor cycle and exit
    #[arg(long, requires = "monitor")]
    pub once: bool,

    /// Config file (defaults to .rss2epub/config.yaml in this or a parent directory)
    #[arg(long, value_name = "FILE", env = "RSS2EPUB_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Execute the selected mode
    pub async fn execute(self) -> Result<()> {
        if !self.monitor && self.url.is_none() {
            bail!("missing feed URL\n\n{}", USAGE);
        }

        let settings = Settings::load(&self.overrides(), self.config.as_deref())
            .context("Invalid configuration")?;

        match self.url {
            Some(url) if !self.monitor => convert_feed(&url, &settings).await,
            _ => monitor(&settings, self.once).await,
        }
    }

    /// Command-line values that override the config file
    pub fn overrides(&self) -> Overrides {
        Overrides {
            output: self.output.clone(),
            feed_list: self.feed_list.clone(),
            history_dir: self.history_dir.clone(),
            history_file: self.history_file.clone(),
            interval: self.interval,
        }
    }
}

fn build_fetcher(settings: &Settings) -> Result<Arc<HttpFeedFetcher>> {
    let fetcher = HttpFeedFetcher::new(settings.fetch_timeout, &settings.user_agent)
        .context("Failed to create HTTP client")?;
    Ok(Arc::new(fetcher))
}

fn build_converter(settings: &Settings) -> Arc<EpubConverter> {
    Arc::new(EpubConverter::new(&settings.output_dir).with_language(&settings.language))
}

/// Process one feed once
async fn convert_feed(url: &str, settings: &Settings) -> Result<()> {
    let history = HistoryStore::new(&settings.history_file);

    let mut processor = FeedProcessor::open(
        url,
        history,
        build_fetcher(settings)?,
        build_converter(settings),
    )
    .await
    .context("Failed to load history")?;

    println!("📡 Fetching: {}", url);

    let report = processor
        .process()
        .await
        .with_context(|| format!("Failed to process feed {}", url))?;

    print_report(&report);

    Ok(())
}

fn print_report(report: &ProcessReport) {
    println!();
    if let Some(reason) = &report.malformed {
        println!("⚠️  Feed parsing encountered errors: {}", reason);
        println!();
    }

    println!("Results:");
    println!("  Entries in feed:     {}", report.fetched);
    println!("  New posts converted: {}", report.converted);
    println!("  Already processed:   {}", report.already_seen);
    if report.skipped > 0 {
        println!("  Skipped (no ID):     {}", report.skipped);
    }
    if report.failed > 0 {
        println!("  Failed (will retry): {}", report.failed);
    }

    if !report.artifacts.is_empty() {
        println!();
        for artifact in &report.artifacts {
            println!("  📖 {}", artifact.path.display());
        }
    }

    println!();
    println!("Processed {} new post(s)", report.converted);
}

/// Watch all feeds in the feed list
async fn monitor(settings: &Settings, once: bool) -> Result<()> {
    let mut registry = FeedRegistry::new(
        &settings.feed_list,
        &settings.history_dir,
        build_fetcher(settings)?,
        build_converter(settings),
    );

    let cancel = CancellationToken::new();

    if once {
        println!("📂 Processing feeds once from: {}", settings.feed_list.display());

        let cycle = registry.run_once(&cancel).await;

        println!();
        println!("Feeds processed:     {}", cycle.feeds);
        println!("New posts converted: {}", cycle.converted);
        if cycle.errors > 0 {
            println!("Feeds with errors:   {}", cycle.errors);
        }
        return Ok(());
    }

    println!("👁️  Monitoring feeds from: {}", settings.feed_list.display());
    println!("    Output:   {}", settings.output_dir.display());
    println!("    Interval: {}s", settings.interval.as_secs_f64());
    println!("    Press Ctrl+C to stop");
    println!();

    // Ctrl+C ends the loop between work units
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        signal_cancel.cancel();
    });

    registry.run(settings.interval, cancel).await;

    println!();
    println!("🛑 Monitor stopped");

    Ok(())
}
