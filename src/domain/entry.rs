//! Feed entries as seen by the converter.
//!
//! Every feed format is flattened into a [`PostEntry`] with optional fields.
//! The accessors encode the fallback order used everywhere else, so callers
//! never inspect individual fields themselves.

use chrono::{DateTime, Utc};

/// Title used when an entry has none
pub const DEFAULT_TITLE: &str = "Untitled";

/// Author used when an entry has none
pub const DEFAULT_AUTHOR: &str = "Unknown";

/// A single post from a feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostEntry {
    /// Feed-supplied unique id (RSS guid, Atom id)
    pub id: Option<String>,

    /// Link to the post on the web
    pub link: Option<String>,

    /// Post title
    pub title: Option<String>,

    /// Author display name
    pub author: Option<String>,

    /// Full content body (RSS content:encoded, Atom content)
    pub content: Option<String>,

    /// Summary (RSS description, Atom summary)
    pub summary: Option<String>,

    /// Secondary description (e.g. Media RSS description)
    pub description: Option<String>,

    /// Publication time, if the feed carries one
    pub published: Option<DateTime<Utc>>,
}

impl PostEntry {
    /// Stable identifier for dedup: the entry id, else the link.
    ///
    /// Values are trimmed and blank values count as absent.
    pub fn identifier(&self) -> Option<&str> {
        non_blank(self.id.as_deref()).or_else(|| non_blank(self.link.as_deref()))
    }

    /// Title, or [`DEFAULT_TITLE`]
    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    /// Title for log lines
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown")
    }

    /// Author, or [`DEFAULT_AUTHOR`]
    pub fn author_or_default(&self) -> &str {
        non_blank(self.author.as_deref()).unwrap_or(DEFAULT_AUTHOR)
    }

    /// Raw HTML body: content, then summary, then description.
    pub fn raw_content(&self) -> &str {
        self.content
            .as_deref()
            .or(self.summary.as_deref())
            .or(self.description.as_deref())
            .unwrap_or("")
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
