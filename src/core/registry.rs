//! Feed registry and monitor loop.
//!
//! The registry keeps one [`FeedProcessor`] per URL listed in the feed-list
//! file. Each cycle it checks whether the file's modification time moved,
//! reconciles the processor set if so, then processes every feed in turn.
//!
//! # Feed list format
//!
//! ```text
//! # comments start with '#'
//! https://example.com/feed.xml
//!
//! https://blog.example.org/atom
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::fs;
use tokio_util::sync::CancellationToken;

use super::converter::PostConverter;
use super::history::HistoryStore;
use super::processor::FeedProcessor;
use crate::adapters::FeedFetcher;
use crate::domain::identifier_digest;

/// Errors that can occur reading the feed list
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read feed list {path}: {source}")]
    FeedList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Changes applied by a reconcile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// URLs that got a new processor
    pub added: Vec<String>,

    /// URLs whose processor was dropped
    pub removed: Vec<String>,

    /// URLs that could not be opened (left out until the next reload)
    pub failed: Vec<String>,
}

/// Totals for one monitor cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Feeds processed successfully
    pub feeds: usize,

    /// Posts converted across all feeds
    pub converted: usize,

    /// Feeds whose processing failed
    pub errors: usize,

    /// Whether the cycle stopped early on cancellation
    pub cancelled: bool,
}

/// Dynamic set of feed processors driven by a feed-list file
pub struct FeedRegistry {
    feed_list: PathBuf,
    history_dir: PathBuf,
    fetcher: Arc<dyn FeedFetcher>,
    converter: Arc<dyn PostConverter>,
    processors: BTreeMap<String, FeedProcessor>,
    last_modified: Option<SystemTime>,
}

impl FeedRegistry {
    /// Create an empty registry; the feed list is read on the first refresh
    pub fn new(
        feed_list: impl Into<PathBuf>,
        history_dir: impl Into<PathBuf>,
        fetcher: Arc<dyn FeedFetcher>,
        converter: Arc<dyn PostConverter>,
    ) -> Self {
        Self {
            feed_list: feed_list.into(),
            history_dir: history_dir.into(),
            fetcher,
            converter,
            processors: BTreeMap::new(),
            last_modified: None,
        }
    }

    /// Registered URLs, sorted
    pub fn urls(&self) -> Vec<&str> {
        self.processors.keys().map(String::as_str).collect()
    }

    /// Processor for `url`, if registered
    pub fn get(&self, url: &str) -> Option<&FeedProcessor> {
        self.processors.get(url)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// History file used for `url`
    pub fn history_path(&self, url: &str) -> PathBuf {
        history_path_for(&self.history_dir, url)
    }

    /// Make the registry hold exactly the processors for `urls`.
    ///
    /// History files of removed feeds stay on disk.
    pub async fn reconcile(&mut self, urls: &[String]) -> ReconcileReport {
        let wanted: HashSet<&str> = urls.iter().map(String::as_str).collect();
        let mut report = ReconcileReport::default();

        let stale: Vec<String> = self
            .processors
            .keys()
            .filter(|url| !wanted.contains(url.as_str()))
            .cloned()
            .collect();

        for url in stale {
            self.processors.remove(&url);
            tracing::info!(feed = %url, "Removed feed");
            report.removed.push(url);
        }

        for url in urls {
            if self.processors.contains_key(url) {
                continue;
            }

            let history = HistoryStore::new(self.history_path(url));
            match FeedProcessor::open(
                url.clone(),
                history,
                Arc::clone(&self.fetcher),
                Arc::clone(&self.converter),
            )
            .await
            {
                Ok(processor) => {
                    tracing::info!(
                        feed = %url,
                        history = %processor.history().path().display(),
                        seen = processor.seen_count(),
                        "Added feed"
                    );
                    self.processors.insert(url.clone(), processor);
                    report.added.push(url.clone());
                }
                Err(e) => {
                    tracing::warn!(feed = %url, error = %e, "Failed to open feed history");
                    report.failed.push(url.clone());
                }
            }
        }

        report
    }

    /// Reload the feed list if its modification time changed.
    ///
    /// Returns `None` when nothing was reloaded. A missing file leaves the
    /// registry as it is.
    pub async fn refresh(&mut self) -> Result<Option<ReconcileReport>, RegistryError> {
        let modified = match fs::metadata(&self.feed_list).await {
            Ok(metadata) => metadata.modified().map_err(|e| self.feed_list_error(e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.feed_list.display(), "Feed list not found");
                return Ok(None);
            }
            Err(e) => return Err(self.feed_list_error(e)),
        };

        if self.last_modified == Some(modified) {
            return Ok(None);
        }

        let urls = load_feed_list(&self.feed_list).await?;
        tracing::info!(
            path = %self.feed_list.display(),
            feeds = urls.len(),
            "Loaded feed list"
        );

        let report = self.reconcile(&urls).await;

        // Leave the timestamp unset so failed feeds are retried next cycle
        self.last_modified = if report.failed.is_empty() {
            Some(modified)
        } else {
            None
        };

        Ok(Some(report))
    }

    /// Process every registered feed once, in URL order.
    ///
    /// A failing feed is logged and does not affect the others.
    pub async fn process_all(&mut self, cancel: &CancellationToken) -> CycleReport {
        let mut cycle = CycleReport::default();

        for (url, processor) in self.processors.iter_mut() {
            if cancel.is_cancelled() {
                cycle.cancelled = true;
                break;
            }

            match processor.process().await {
                Ok(report) => {
                    cycle.feeds += 1;
                    cycle.converted += report.converted;
                }
                Err(e) => {
                    tracing::error!(feed = %url, error = %e, "Error processing feed");
                    cycle.errors += 1;
                }
            }
        }

        cycle
    }

    /// One monitor cycle: refresh the feed list, then process all feeds
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> CycleReport {
        if let Err(e) = self.refresh().await {
            tracing::error!(error = %e, "Failed to reload feed list");
        }

        if self.processors.is_empty() {
            tracing::info!(
                path = %self.feed_list.display(),
                "No feeds configured, skipping this cycle"
            );
            return CycleReport::default();
        }

        self.process_all(cancel).await
    }

    /// Run cycles every `interval` until `cancel` fires
    pub async fn run(&mut self, interval: Duration, cancel: CancellationToken) {
        tracing::info!(
            path = %self.feed_list.display(),
            interval_secs = interval.as_secs_f64(),
            "Monitoring feeds"
        );

        while !cancel.is_cancelled() {
            let cycle = self.run_once(&cancel).await;
            if cycle.converted > 0 || cycle.errors > 0 {
                tracing::info!(
                    feeds = cycle.feeds,
                    converted = cycle.converted,
                    errors = cycle.errors,
                    "Cycle complete"
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!("Monitor stopped");
    }

    fn feed_list_error(&self, source: std::io::Error) -> RegistryError {
        RegistryError::FeedList {
            path: self.feed_list.clone(),
            source,
        }
    }
}

/// `<history_dir>/<digest of url>.txt`
pub fn history_path_for(history_dir: &Path, url: &str) -> PathBuf {
    history_dir.join(format!("{}.txt", identifier_digest(url)))
}

/// Parse feed-list text: one URL per line, `#` comments, blanks ignored.
///
/// Duplicate URLs are collapsed, keeping the first occurrence.
pub fn parse_feed_list(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(*line))
        .map(String::from)
        .collect()
}

/// Read and parse a feed-list file
pub async fn load_feed_list(path: &Path) -> Result<Vec<String>, RegistryError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| RegistryError::FeedList {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(parse_feed_list(&content))
}
