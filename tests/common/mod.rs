//! Shared test doubles for the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use rss2epub::adapters::{EpubError, FeedFetcher, FetchError, FetchedFeed};
use rss2epub::core::{ConversionError, PostConverter};
use rss2epub::domain::{artifact_filename, PostEntry};

/// Serves canned feeds by URL; unknown URLs answer 404
#[derive(Default)]
pub struct StubFetcher {
    feeds: Mutex<HashMap<String, FetchedFeed>>,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_feed(&self, url: &str, feed: FetchedFeed) {
        self.feeds.lock().unwrap().insert(url.to_string(), feed);
    }

    pub fn set_entries(&self, url: &str, entries: Vec<PostEntry>) {
        self.set_feed(url, FetchedFeed::new(entries));
    }

    pub fn remove_feed(&self, url: &str) {
        self.feeds.lock().unwrap().remove(url);
    }

    /// URLs fetched so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl FeedFetcher for StubFetcher {
    fn name(&self) -> &str {
        "stub"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.feeds
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(FetchError::HttpStatus(404))
    }
}

/// Records conversions instead of writing EPUBs; can be told to fail
pub struct RecordingConverter {
    output_dir: PathBuf,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    converted: Mutex<Vec<String>>,
    attempts: AtomicUsize,
}

impl RecordingConverter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            converted: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Make conversions of `identifier` fail until [`Self::recover`] is called
    pub fn fail_on(&self, identifier: &str) {
        self.failing.lock().unwrap().insert(identifier.to_string());
    }

    pub fn recover(&self, identifier: &str) {
        self.failing.lock().unwrap().remove(identifier);
        self.panicking.lock().unwrap().remove(identifier);
    }

    /// Make conversions of `identifier` panic until recovered
    pub fn panic_on(&self, identifier: &str) {
        self.panicking.lock().unwrap().insert(identifier.to_string());
    }

    /// Identifiers converted successfully, in order
    pub fn converted(&self) -> Vec<String> {
        self.converted.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl PostConverter for RecordingConverter {
    fn convert(&self, entry: &PostEntry) -> Result<PathBuf, ConversionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let identifier = entry
            .identifier()
            .ok_or(ConversionError::MissingIdentifier)?
            .to_string();

        let panics = self.panicking.lock().unwrap().contains(&identifier);
        if panics {
            panic!("converter blew up on {identifier}");
        }

        if self.failing.lock().unwrap().contains(&identifier) {
            return Err(ConversionError::Package(EpubError::NoChapters));
        }

        self.converted.lock().unwrap().push(identifier.clone());
        Ok(self
            .output_dir
            .join(artifact_filename(entry.title_or_default(), &identifier)))
    }
}

/// Entry with an id and a title
pub fn post(id: &str, title: &str) -> PostEntry {
    PostEntry {
        id: Some(id.to_string()),
        title: Some(title.to_string()),
        content: Some(format!("<p>{}</p>", title)),
        ..Default::default()
    }
}

/// Non-blank lines of a history file
pub fn history_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(String::from)
        .collect()
}
