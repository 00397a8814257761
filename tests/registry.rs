//! Feed Registry Integration Tests
//!
//! Tests for feed-list reconciliation, per-feed error isolation and the
//! cancellable monitor loop.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::{history_lines, post, RecordingConverter, StubFetcher};
use filetime::FileTime;
use rss2epub::core::{history_path_for, FeedRegistry};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const F1: &str = "https://one.example/feed";
const F2: &str = "https://two.example/feed";
const F3: &str = "https://three.example/feed";

struct Fixture {
    temp_dir: TempDir,
    fetcher: Arc<StubFetcher>,
    converter: Arc<RecordingConverter>,
}

impl Fixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let converter = Arc::new(RecordingConverter::new(&temp_dir.path().join("output")));
        Self {
            temp_dir,
            fetcher: Arc::new(StubFetcher::new()),
            converter,
        }
    }

    fn feed_list(&self) -> PathBuf {
        self.temp_dir.path().join("rss_feed.txt")
    }

    fn history_dir(&self) -> PathBuf {
        self.temp_dir.path().join("history")
    }

    fn registry(&self) -> FeedRegistry {
        FeedRegistry::new(
            self.feed_list(),
            self.history_dir(),
            self.fetcher.clone(),
            self.converter.clone(),
        )
    }

    /// Write the feed list and move its mtime forward so a reload is seen
    fn write_feed_list(&self, urls: &[&str]) {
        write_with_fresh_mtime(&self.feed_list(), &urls.join("\n"));
    }
}

fn write_with_fresh_mtime(path: &Path, content: &str) {
    let previous = std::fs::metadata(path).and_then(|m| m.modified()).ok();
    std::fs::write(path, content).unwrap();

    let base = previous.unwrap_or(SystemTime::now()).max(SystemTime::now());
    let bumped = FileTime::from_system_time(base + Duration::from_secs(5));
    filetime::set_file_mtime(path, bumped).unwrap();
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_reconcile_follows_feed_list() {
    let fx = Fixture::new();
    fx.fetcher.set_entries(F1, vec![post("one-1", "One")]);
    fx.fetcher.set_entries(F2, vec![post("two-1", "Two")]);
    fx.fetcher.set_entries(F3, vec![post("three-1", "Three")]);

    let mut registry = fx.registry();
    let cancel = CancellationToken::new();

    fx.write_feed_list(&[F1, F2]);
    let report = registry.refresh().await.unwrap().unwrap();
    assert_eq!(report.added, vec![F1.to_string(), F2.to_string()]);
    assert!(report.removed.is_empty());

    let cycle = registry.process_all(&cancel).await;
    assert_eq!(cycle.feeds, 2);
    assert_eq!(cycle.converted, 2);

    fx.write_feed_list(&[F2, F3]);
    let report = registry.refresh().await.unwrap().unwrap();
    assert_eq!(report.added, vec![F3.to_string()]);
    assert_eq!(report.removed, vec![F1.to_string()]);

    assert_eq!(registry.urls(), vec![F3, F2]);

    // F2 kept its in-memory state, F3 is new
    assert_eq!(registry.get(F2).unwrap().seen_count(), 1);
    let cycle = registry.process_all(&cancel).await;
    assert_eq!(cycle.converted, 1);
    assert_eq!(fx.converter.converted(), vec!["one-1", "two-1", "three-1"]);

    // History of the removed feed stays on disk
    let f1_history = history_path_for(&fx.history_dir(), F1);
    assert_eq!(history_lines(&f1_history), vec!["one-1"]);
    assert!(!fx.fetcher.calls().iter().skip(2).any(|u| u == F1));
}

#[tokio::test]
async fn test_refresh_skips_unchanged_list() {
    let fx = Fixture::new();
    fx.write_feed_list(&[F1]);

    let mut registry = fx.registry();
    assert!(registry.refresh().await.unwrap().is_some());
    assert!(registry.refresh().await.unwrap().is_none());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_missing_feed_list_keeps_registry() {
    let fx = Fixture::new();
    let mut registry = fx.registry();

    assert!(registry.refresh().await.unwrap().is_none());
    assert!(registry.is_empty());

    let cycle = registry.run_once(&CancellationToken::new()).await;
    assert_eq!(cycle.feeds, 0);
    assert!(fx.fetcher.calls().is_empty());

    fx.write_feed_list(&[F1]);
    registry.refresh().await.unwrap();
    std::fs::remove_file(fx.feed_list()).unwrap();

    assert!(registry.refresh().await.unwrap().is_none());
    assert_eq!(registry.urls(), vec![F1]);
}

#[tokio::test]
async fn test_feeds_share_no_history() {
    let fx = Fixture::new();
    fx.fetcher.set_entries(F1, vec![post("shared-id", "One")]);
    fx.fetcher.set_entries(F2, vec![post("shared-id", "Two")]);
    fx.write_feed_list(&[F1, F2]);

    let mut registry = fx.registry();
    let cycle = registry.run_once(&CancellationToken::new()).await;

    assert_eq!(cycle.converted, 2);
    assert_ne!(registry.history_path(F1), registry.history_path(F2));
    assert_eq!(history_lines(&registry.history_path(F1)), vec!["shared-id"]);
    assert_eq!(history_lines(&registry.history_path(F2)), vec!["shared-id"]);
}

#[tokio::test]
async fn test_failing_feed_does_not_block_others() {
    let fx = Fixture::new();
    // F1 is unknown to the stub and answers 404
    fx.fetcher.set_entries(F2, vec![post("two-1", "Two")]);
    fx.write_feed_list(&[F1, F2]);

    let mut registry = fx.registry();
    let cycle = registry.run_once(&CancellationToken::new()).await;

    assert_eq!(cycle.errors, 1);
    assert_eq!(cycle.feeds, 1);
    assert_eq!(cycle.converted, 1);
    assert_eq!(fx.converter.converted(), vec!["two-1"]);
}

#[tokio::test]
async fn test_unopenable_history_retried_next_refresh() {
    let fx = Fixture::new();
    fx.write_feed_list(&[F1]);

    // A directory where the history file should be makes loading fail
    let blocked = history_path_for(&fx.history_dir(), F1);
    std::fs::create_dir_all(&blocked).unwrap();

    let mut registry = fx.registry();
    let report = registry.refresh().await.unwrap().unwrap();
    assert_eq!(report.failed, vec![F1.to_string()]);
    assert!(registry.is_empty());

    std::fs::remove_dir(&blocked).unwrap();

    // Feed list untouched, but the failed open is retried
    let report = registry.refresh().await.unwrap().unwrap();
    assert_eq!(report.added, vec![F1.to_string()]);
    assert!(registry.refresh().await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_cycle_stops_early() {
    let fx = Fixture::new();
    fx.fetcher.set_entries(F1, vec![post("one-1", "One")]);
    fx.write_feed_list(&[F1]);

    let mut registry = fx.registry();
    registry.refresh().await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let cycle = registry.process_all(&cancel).await;
    assert!(cycle.cancelled);
    assert_eq!(cycle.feeds, 0);
    assert!(fx.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_monitor_loop_picks_up_new_feeds() {
    let fx = Fixture::new();
    fx.fetcher.set_entries(F1, vec![post("one-1", "One")]);
    fx.write_feed_list(&[]);

    let mut registry = fx.registry();
    let cancel = CancellationToken::new();

    let loop_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        registry.run(Duration::from_millis(20), loop_cancel).await;
        registry
    });

    // Empty list: the loop keeps cycling without fetching
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());
    assert!(fx.fetcher.calls().is_empty());

    fx.write_feed_list(&[F1]);
    let converter = fx.converter.clone();
    wait_for(|| converter.converted() == vec!["one-1"]).await;

    cancel.cancel();
    let registry = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("monitor loop did not stop")
        .unwrap();

    assert_eq!(registry.urls(), vec![F1]);
    assert_eq!(fx.converter.converted(), vec!["one-1"]);
    assert!(fx.fetcher.call_count(F1) >= 1);
}

#[tokio::test]
async fn test_monitor_loop_exits_when_already_cancelled() {
    let fx = Fixture::new();
    fx.fetcher.set_entries(F1, vec![post("one-1", "One")]);
    fx.write_feed_list(&[F1]);

    let mut registry = fx.registry();
    let cancel = CancellationToken::new();
    cancel.cancel();

    tokio::time::timeout(
        Duration::from_secs(5),
        registry.run(Duration::from_secs(3600), cancel),
    )
    .await
    .expect("monitor loop did not stop");

    assert!(fx.fetcher.calls().is_empty());
}
