//! rss2epub - Turn new feed posts into EPUB files
//!
//! Polls RSS/Atom feeds, detects posts that were not converted before and
//! writes each one as a standalone EPUB document.
//!
//! # Architecture
//!
//! The system is built around an append-only history per feed:
//! - A post is recorded only after its EPUB was written
//! - The set of seen posts is rebuilt from the history at startup
//! - A failed conversion is never recorded, so it is retried next run
//!
//! # Modules
//!
//! - `adapters`: Feed fetching, HTML normalization, EPUB packaging
//! - `core`: History store, converter, feed processor, feed registry
//! - `domain`: Data structures (PostEntry, artifact naming)
//! - `config`: Layered configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Convert the new posts of one feed
//! rss2epub https://example.com/feed.rss
//!
//! # Watch every feed listed in rss_feed.txt
//! rss2epub --monitor --interval 600
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{FeedFetcher, FetchedFeed};
pub use config::Settings;
pub use core::{EpubConverter, FeedProcessor, FeedRegistry, HistoryStore, PostConverter};
pub use domain::{ConvertedArtifact, PostEntry};
