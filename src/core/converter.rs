//! Post to EPUB conversion.
//!
//! A [`PostConverter`] turns one [`PostEntry`] into exactly one artifact or
//! fails without leaving anything behind under the artifact's name.

use std::path::PathBuf;

use thiserror::Error;

use crate::adapters::{
    escape_text, normalize_html, write_epub, Chapter, DocumentMetadata, EpubDocument, EpubError,
};
use crate::domain::{artifact_filename, PostEntry};

/// Language tag used when none is configured
pub const DEFAULT_LANGUAGE: &str = "en";

/// File name of the single chapter inside each book
const CHAPTER_FILE: &str = "content.xhtml";

/// Errors that can occur while converting a post
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Post has neither an id nor a link")]
    MissingIdentifier,

    #[error("Failed to package EPUB: {0}")]
    Package(#[from] EpubError),

    /// The conversion task panicked or was cancelled
    #[error("Conversion aborted: {0}")]
    Aborted(String),
}

/// Trait for post converters
pub trait PostConverter: Send + Sync {
    /// Convert one entry, returning the path of the written artifact
    fn convert(&self, entry: &PostEntry) -> Result<PathBuf, ConversionError>;
}

/// Writes one single-chapter EPUB per post into an output directory
#[derive(Debug, Clone)]
pub struct EpubConverter {
    /// Directory all artifacts are written to
    output_dir: PathBuf,

    /// dc:language of generated books
    language: String,
}

impl EpubConverter {
    /// Create a converter writing into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Set the language tag of generated books
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Build the in-memory document for an entry
    pub fn build_document(&self, entry: &PostEntry) -> Result<EpubDocument, ConversionError> {
        let identifier = entry
            .identifier()
            .ok_or(ConversionError::MissingIdentifier)?;
        let title = entry.title_or_default();

        let content = normalize_html(entry.raw_content());
        let body = format!("<h1>{}</h1>{}", escape_text(title), content);

        Ok(EpubDocument {
            metadata: DocumentMetadata {
                identifier: identifier.to_string(),
                title: title.to_string(),
                language: self.language.clone(),
                author: entry.author_or_default().to_string(),
                published: entry.published,
            },
            chapters: vec![Chapter {
                title: title.to_string(),
                file_name: CHAPTER_FILE.to_string(),
                body,
            }],
        })
    }
}

impl PostConverter for EpubConverter {
    fn convert(&self, entry: &PostEntry) -> Result<PathBuf, ConversionError> {
        let doc = self.build_document(entry)?;
        let filename = artifact_filename(&doc.metadata.title, &doc.metadata.identifier);
        let path = self.output_dir.join(filename);

        write_epub(&doc, &path)?;

        Ok(path)
    }
}
