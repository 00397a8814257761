//! Converted artifacts and their file names.
//!
//! A file name is a readable slug of the post title plus a short digest of
//! the post identifier, so two posts with the same title never collide and
//! re-converting a post always lands on the same file.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// File extension of every artifact
pub const ARTIFACT_EXTENSION: &str = "epub";

/// Longest title slug kept in a file name (in characters)
pub const MAX_SLUG_CHARS: usize = 50;

/// Slug used when nothing of the title survives sanitizing
pub const FALLBACK_SLUG: &str = "post";

/// An output file produced for one post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedArtifact {
    /// Identifier of the post this artifact was built from
    pub identifier: String,

    /// Where the document was written
    pub path: PathBuf,
}

/// First 16 hex chars of the SHA256 of `value`
pub fn identifier_digest(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..8])
}

/// Reduce a title to a file-name-safe slug.
///
/// Keeps alphanumerics, spaces, hyphens and underscores, turns spaces into
/// underscores, caps the length and trims separators from both ends.
pub fn title_slug(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();

    let trimmed = kept.trim_matches(is_separator);
    let truncated: String = trimmed.chars().take(MAX_SLUG_CHARS).collect();
    let slug = truncated.trim_matches(is_separator);

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// `<slug>_<digest>.epub` for a post
pub fn artifact_filename(title: &str, identifier: &str) -> String {
    format!(
        "{}_{}.{}",
        title_slug(title),
        identifier_digest(identifier),
        ARTIFACT_EXTENSION
    )
}

fn is_separator(c: char) -> bool {
    matches!(c, '_' | '-')
}
