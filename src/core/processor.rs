//! Per-feed processing.
//!
//! A [`FeedProcessor`] owns everything that belongs to one feed: its URL,
//! its history store and the in-memory set of identifiers already converted.
//! Each call to [`FeedProcessor::process`] fetches the feed once and converts
//! the entries it has not seen before.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use super::converter::{ConversionError, PostConverter};
use super::history::{is_storable, HistoryError, HistoryStore};
use crate::adapters::{FeedFetcher, FetchError};
use crate::domain::ConvertedArtifact;

/// Errors that abort processing of a whole feed
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

/// Outcome of one pass over a feed
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    /// Entries returned by the feed
    pub fetched: usize,

    /// Entries converted during this pass
    pub converted: usize,

    /// Entries skipped because they were converted before
    pub already_seen: usize,

    /// Entries skipped for lack of a usable identifier
    pub skipped: usize,

    /// Entries whose conversion failed (retried next pass)
    pub failed: usize,

    /// Why the feed was flagged as malformed, if it was
    pub malformed: Option<String>,

    /// Artifacts written during this pass
    pub artifacts: Vec<ConvertedArtifact>,
}

/// Converts the new posts of a single feed
pub struct FeedProcessor {
    url: String,
    fetcher: Arc<dyn FeedFetcher>,
    converter: Arc<dyn PostConverter>,
    history: HistoryStore,
    seen: HashSet<String>,
}

impl FeedProcessor {
    /// Create a processor, loading its history from disk
    pub async fn open(
        url: impl Into<String>,
        history: HistoryStore,
        fetcher: Arc<dyn FeedFetcher>,
        converter: Arc<dyn PostConverter>,
    ) -> Result<Self, HistoryError> {
        let seen = history.load().await?;

        Ok(Self {
            url: url.into(),
            fetcher,
            converter,
            history,
            seen,
        })
    }

    /// Feed URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// History store backing this processor
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Whether `identifier` has been converted
    pub fn has_seen(&self, identifier: &str) -> bool {
        self.seen.contains(identifier)
    }

    /// Number of identifiers known to be converted
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Fetch the feed and convert every entry not seen before.
    ///
    /// A failed conversion is logged and left unrecorded so the next pass
    /// tries it again. History write failures abort the pass.
    pub async fn process(&mut self) -> Result<ProcessReport, ProcessError> {
        tracing::info!(fetcher = self.fetcher.name(), "Fetching feed from: {}", self.url);

        let feed = self.fetcher.fetch(&self.url).await?;

        let mut report = ProcessReport {
            fetched: feed.entries.len(),
            malformed: feed.malformed,
            ..Default::default()
        };

        if let Some(reason) = &report.malformed {
            tracing::warn!(feed = %self.url, error = %reason, "Feed parsing encountered errors");
        }

        if feed.entries.is_empty() {
            tracing::info!(feed = %self.url, "No entries found in feed");
            return Ok(report);
        }

        tracing::info!(feed = %self.url, entries = report.fetched, "Found entries in feed");

        for entry in &feed.entries {
            let title = entry.display_title();

            let identifier = match entry.identifier() {
                Some(id) if is_storable(id) => id.to_string(),
                Some(id) => {
                    tracing::warn!(title = %title, id = ?id, "Skipping entry with unstorable ID");
                    report.skipped += 1;
                    continue;
                }
                None => {
                    tracing::info!("Skipping entry without ID: {}", title);
                    report.skipped += 1;
                    continue;
                }
            };

            if self.seen.contains(&identifier) {
                tracing::debug!("Already processed: {}", title);
                report.already_seen += 1;
                continue;
            }

            tracing::info!("Processing new post: {}", title);

            // Packaging is blocking file IO
            let converter = Arc::clone(&self.converter);
            let post = entry.clone();
            let converted = tokio::task::spawn_blocking(move || converter.convert(&post))
                .await
                .unwrap_or_else(|e| Err(ConversionError::Aborted(e.to_string())));

            match converted {
                Ok(path) => {
                    tracing::info!("Created EPUB: {}", path.display());

                    self.seen.insert(identifier.clone());
                    self.history.record(&identifier).await?;

                    report.converted += 1;
                    report.artifacts.push(ConvertedArtifact { identifier, path });
                }
                Err(e) => {
                    tracing::warn!(
                        title = %title,
                        id = %identifier,
                        error = %e,
                        "Error creating EPUB; post left unmarked and will be retried on the next run"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            feed = %self.url,
            converted = report.converted,
            failed = report.failed,
            "Processed {} new post(s)",
            report.converted
        );

        Ok(report)
    }
}
