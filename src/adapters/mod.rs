//! Adapter interfaces for external collaborators.
//!
//! Adapters wrap the pieces rss2epub does not implement itself:
//! - feed: Fetching and parsing RSS/Atom (reqwest + feed-rs)
//! - html: Re-serializing post markup as clean XHTML (scraper)
//! - epub: Packaging a document into an EPUB container (zip + quick-xml)

pub mod epub;
pub mod feed;
pub mod html;

use async_trait::async_trait;

use crate::domain::PostEntry;

// Re-export adapter types
pub use epub::{write_epub, Chapter, DocumentMetadata, EpubDocument, EpubError};
pub use feed::{parse_feed_bytes, FetchError, HttpFeedFetcher};
pub use html::{escape_text, normalize_html};

/// Result of fetching one feed
#[derive(Debug, Clone, Default)]
pub struct FetchedFeed {
    /// Why the document was considered malformed, if it was.
    /// Entries are still the ones that could be recovered.
    pub malformed: Option<String>,

    /// Entries in document order
    pub entries: Vec<PostEntry>,
}

impl FetchedFeed {
    /// A well-formed feed with these entries
    pub fn new(entries: Vec<PostEntry>) -> Self {
        Self {
            malformed: None,
            entries,
        }
    }
}

/// Trait for feed sources
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Human-readable fetcher name
    fn name(&self) -> &str;

    /// Fetch and parse the feed at `url`
    async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError>;
}
