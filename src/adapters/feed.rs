//! Feed fetching and parsing.
//!
//! Documents are downloaded with `reqwest` and parsed with `feed-rs`, which
//! understands RSS 0.9x/1.0/2.0, Atom and JSON Feed. Publishers routinely
//! ship broken XML, so documents are repaired first and, when that is not
//! enough, cut down to their complete entries with `quick-xml`. A feed that
//! needed either is returned with its `malformed` reason set.

use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser::{self, ParseFeedError};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use super::html::is_xml_char;
use super::{FeedFetcher, FetchedFeed};
use crate::domain::PostEntry;

/// Largest feed body accepted
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default request timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// `malformed` reason for a document that parsed once repaired
const REPAIRED: &str = "invalid characters or unescaped '&' repaired";

/// Default User-Agent header
pub const DEFAULT_USER_AGENT: &str = concat!("rss2epub/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while fetching a feed
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, timeout)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    /// Response body exceeded [`MAX_FEED_SIZE`]
    #[error("Response too large (limit {limit} bytes)")]
    ResponseTooLarge { limit: usize },

    /// Body could not be parsed as a feed, even after repair
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Fetches feeds over HTTP(S)
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    /// Create a fetcher with the given request timeout and User-Agent
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > MAX_FEED_SIZE {
                return Err(FetchError::ResponseTooLarge {
                    limit: MAX_FEED_SIZE,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError> {
        let body = self.download(url).await?;
        parse_feed_bytes(&body)
    }
}

/// Parse a feed document.
///
/// The document is repaired (forbidden characters, bare `&`) before it is
/// parsed. If it still fails, the complete `<item>`/`<entry>` elements that
/// precede the breakage are kept. Either way the result carries a
/// `malformed` reason.
pub fn parse_feed_bytes(bytes: &[u8]) -> Result<FetchedFeed, FetchError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => parse_feed_text(text),
        // Other encodings are decoded by the parser; repair needs UTF-8
        Err(_) => match parse_document(bytes) {
            Ok(feed) => Ok(FetchedFeed::new(to_entries(feed.entries))),
            Err(_) => parse_feed_text(&String::from_utf8_lossy(bytes)),
        },
    }
}

fn parse_feed_text(text: &str) -> Result<FetchedFeed, FetchError> {
    let repaired = repair_markup(text);
    let malformed = (repaired != text).then(|| REPAIRED.to_string());

    let error = match parse_document(repaired.as_bytes()) {
        Ok(feed) => {
            if malformed.is_some() {
                tracing::debug!("Feed parsed after repair");
            }
            return Ok(FetchedFeed {
                malformed,
                entries: to_entries(feed.entries),
            });
        }
        Err(e) => e.to_string(),
    };

    let entries = salvage_entries(&repaired);
    if entries.is_empty() {
        return Err(FetchError::Parse(error));
    }

    tracing::debug!(error = %error, kept = entries.len(), "Kept complete entries of a broken feed");
    Ok(FetchedFeed {
        malformed: Some(error),
        entries,
    })
}

fn parse_document(bytes: &[u8]) -> Result<Feed, ParseFeedError> {
    // Entries without a guid or id stay blank so the link can stand in
    parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)
}

/// Re-parse only the complete entries of a document that breaks off or
/// nests badly further down
fn salvage_entries(document: &str) -> Vec<PostEntry> {
    let Some(rebuilt) = complete_entries(document) else {
        return Vec::new();
    };

    match parse_document(rebuilt.as_bytes()) {
        Ok(feed) => to_entries(feed.entries),
        Err(e) => {
            tracing::debug!(error = %e, "Complete entries did not parse either");
            Vec::new()
        }
    }
}

/// The document up to its first entry, every entry closed before the first
/// XML error, and end tags for whatever the header left open
fn complete_entries(document: &str) -> Option<String> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().check_end_names = true;

    let mut open: Vec<String> = Vec::new();
    let mut header: Option<(usize, Vec<String>)> = None;
    let mut current: Option<(usize, usize)> = None;
    let mut entries: Vec<&str> = Vec::new();

    loop {
        let position = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if current.is_none() && is_entry(start.local_name().as_ref()) {
                    if header.is_none() {
                        header = Some((position, open.clone()));
                    }
                    current = Some((position, open.len()));
                }
                open.push(String::from_utf8_lossy(start.name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                open.pop();
                if let Some((begin, depth)) = current {
                    if open.len() == depth {
                        let end = reader.buffer_position() as usize;
                        entries.extend(document.get(begin..end));
                        current = None;
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let (header_end, unclosed) = header?;
    if entries.is_empty() {
        return None;
    }

    let mut rebuilt = document.get(..header_end)?.to_string();
    for entry in entries {
        rebuilt.push_str(entry);
    }
    for name in unclosed.iter().rev() {
        rebuilt.push_str("</");
        rebuilt.push_str(name);
        rebuilt.push('>');
    }

    Some(rebuilt)
}

fn is_entry(local_name: &[u8]) -> bool {
    matches!(local_name, b"item" | b"entry")
}

/// Strip characters XML forbids and escape ampersands that don't start an
/// entity. CDATA sections, comments and processing instructions keep their
/// ampersands.
pub fn repair_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        if let Some(len) = verbatim_len(rest) {
            out.extend(rest[..len].chars().filter(|c| is_xml_char(*c)));
            rest = &rest[len..];
            continue;
        }

        match c {
            '&' if !starts_entity(&rest[1..]) => out.push_str("&amp;"),
            c if is_xml_char(c) => out.push(c),
            _ => {}
        }
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Length of the CDATA section, comment or processing instruction at the
/// start of `rest` (to the end of input when unterminated)
fn verbatim_len(rest: &str) -> Option<usize> {
    const SECTIONS: &[(&str, &str)] = &[("<![CDATA[", "]]>"), ("<!--", "-->"), ("<?", "?>")];

    if !rest.starts_with('<') {
        return None;
    }

    SECTIONS.iter().find_map(|(open, close)| {
        let body = rest.strip_prefix(open)?;
        Some(match body.find(close) {
            Some(end) => open.len() + end + close.len(),
            None => rest.len(),
        })
    })
}

/// `name;`, `#123;` or `#x1F;` at the start of `rest`
fn starts_entity(rest: &str) -> bool {
    let Some(end) = rest.find(';') else {
        return false;
    };
    let name = &rest[..end];

    if let Some(num) = name.strip_prefix('#') {
        return match num.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()),
        };
    }

    !name.is_empty()
        && name.len() <= 32
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

fn to_entries(entries: Vec<Entry>) -> Vec<PostEntry> {
    entries.into_iter().map(to_post_entry).collect()
}

fn to_post_entry(entry: Entry) -> PostEntry {
    let description = entry
        .media
        .iter()
        .find_map(|m| m.description.as_ref())
        .map(|t| t.content.clone());

    PostEntry {
        id: Some(entry.id).filter(|id| !id.trim().is_empty()),
        link: entry.links.first().map(|l| l.href.clone()),
        title: entry.title.map(|t| t.content),
        author: entry
            .authors
            .into_iter()
            .map(|p| p.name)
            .find(|name| !name.trim().is_empty()),
        content: entry.content.and_then(|c| c.body),
        summary: entry.summary.map(|s| s.content),
        description,
        published: entry.published.or(entry.updated),
    }
}
