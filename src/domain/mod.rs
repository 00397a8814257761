//! Domain types for rss2epub.
//!
//! This module contains the core data structures:
//! - PostEntry: One feed entry with its fallback rules
//! - Artifact: Converted output files and how they are named

pub mod artifact;
pub mod entry;

// Re-export commonly used types
pub use artifact::{artifact_filename, identifier_digest, title_slug, ConvertedArtifact};
pub use entry::{PostEntry, DEFAULT_AUTHOR, DEFAULT_TITLE};
