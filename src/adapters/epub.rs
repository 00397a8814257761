//! EPUB 3 packaging.
//!
//! Writes an OCF zip container holding the package document, an EPUB 3
//! navigation document, an EPUB 2 NCX (for older readers) and one XHTML file
//! per chapter. The spine lists the navigation document first, then the
//! chapters in order.
//!
//! The archive is written to a temporary file next to its destination and
//! renamed into place once complete, so readers never see a partial file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tempfile::NamedTempFile;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::html::{escape_text, xml_safe};

const MIMETYPE: &str = "application/epub+zip";
const PACKAGE_DIR: &str = "EPUB";
const NAV_FILE: &str = "nav.xhtml";
const NCX_FILE: &str = "toc.ncx";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const OPF_NS: &str = "http://www.idpf.org/2007/opf";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const NCX_NS: &str = "http://www.daisy.org/z3986/2005/ncx/";
const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const OPS_NS: &str = "http://www.idpf.org/2007/ops";

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="EPUB/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// Errors that can occur while writing an EPUB
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("EPUB has no chapters")]
    NoChapters,

    #[error("Invalid chapter file name: {0:?}")]
    InvalidFileName(String),

    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write XML: {0}")]
    Xml(#[source] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Package-level metadata
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    /// Unique identifier (dc:identifier)
    pub identifier: String,

    /// Title (dc:title)
    pub title: String,

    /// BCP 47 language tag (dc:language)
    pub language: String,

    /// Creator (dc:creator)
    pub author: String,

    /// Publication date (dc:date), if known
    pub published: Option<DateTime<Utc>>,
}

/// One XHTML content document
#[derive(Debug, Clone)]
pub struct Chapter {
    /// Title shown in the table of contents
    pub title: String,

    /// File name inside the package (e.g. `content.xhtml`)
    pub file_name: String,

    /// XHTML markup placed inside `<body>`
    pub body: String,
}

/// A complete document ready to be packaged
#[derive(Debug, Clone)]
pub struct EpubDocument {
    pub metadata: DocumentMetadata,
    pub chapters: Vec<Chapter>,
}

/// Write `doc` as an EPUB container at `path`
pub fn write_epub(doc: &EpubDocument, path: &Path) -> Result<(), EpubError> {
    validate(doc)?;

    let io_error = |source| EpubError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_error)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".rss2epub-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(io_error)?;

    write_container(doc, &mut temp)?;

    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|e| io_error(e.error))?;

    Ok(())
}

fn validate(doc: &EpubDocument) -> Result<(), EpubError> {
    if doc.chapters.is_empty() {
        return Err(EpubError::NoChapters);
    }

    for chapter in &doc.chapters {
        let name = chapter.file_name.as_str();
        let valid = !name.is_empty()
            && name != NAV_FILE
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(EpubError::InvalidFileName(chapter.file_name.clone()));
        }
    }

    Ok(())
}

fn write_container(doc: &EpubDocument, temp: &mut NamedTempFile) -> Result<(), EpubError> {
    let mut zip = ZipWriter::new(temp.as_file_mut());

    // The mimetype entry must come first and be stored uncompressed
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    add_entry(&mut zip, "mimetype", MIMETYPE.as_bytes(), stored)?;
    add_entry(
        &mut zip,
        "META-INF/container.xml",
        CONTAINER_XML.as_bytes(),
        deflated,
    )?;
    add_entry(
        &mut zip,
        &format!("{PACKAGE_DIR}/content.opf"),
        &package_document(doc)?,
        deflated,
    )?;
    add_entry(
        &mut zip,
        &format!("{PACKAGE_DIR}/{NAV_FILE}"),
        &nav_document(doc)?,
        deflated,
    )?;
    add_entry(
        &mut zip,
        &format!("{PACKAGE_DIR}/{NCX_FILE}"),
        &ncx_document(doc)?,
        deflated,
    )?;

    for chapter in &doc.chapters {
        add_entry(
            &mut zip,
            &format!("{PACKAGE_DIR}/{}", chapter.file_name),
            &chapter_document(chapter, &doc.metadata.language)?,
            deflated,
        )?;
    }

    zip.finish()?;
    Ok(())
}

fn add_entry<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    content: &[u8],
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    zip.start_file(name, options)?;
    zip.write_all(content).map_err(|e| EpubError::Zip(e.into()))?;
    Ok(())
}

fn chapter_id(index: usize) -> String {
    format!("chapter_{}", index + 1)
}

/// Escaped text node
fn text(value: &str) -> BytesText<'static> {
    BytesText::from_escaped(escape_text(value))
}

/// Build one XML document: declaration, optional doctype, then `root`
fn xml_document<F>(doctype: Option<&str>, root: F) -> Result<Vec<u8>, EpubError>
where
    F: FnOnce(&mut Writer<Vec<u8>>) -> io::Result<()>,
{
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(EpubError::Xml)?;
    if let Some(doctype) = doctype {
        writer
            .write_event(Event::DocType(BytesText::from_escaped(doctype)))
            .map_err(EpubError::Xml)?;
    }
    root(&mut writer).map_err(EpubError::Xml)?;

    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

/// `<head><title>..</title></head>` of an XHTML document
fn xhtml_head(writer: &mut Writer<Vec<u8>>, title: &str) -> io::Result<()> {
    writer.create_element("head").write_inner_content(|w| {
        w.create_element("title").write_text_content(text(title))?;
        Ok(())
    })?;
    Ok(())
}

fn xhtml_root(language: &str) -> BytesStart<'static> {
    let language = xml_safe(language);
    let mut html = BytesStart::new("html");
    html.push_attribute(("xmlns", XHTML_NS));
    html.push_attribute(("xmlns:epub", OPS_NS));
    html.push_attribute(("lang", language.as_ref()));
    html.push_attribute(("xml:lang", language.as_ref()));
    html
}

fn package_document(doc: &EpubDocument) -> Result<Vec<u8>, EpubError> {
    let meta = &doc.metadata;
    let language = xml_safe(&meta.language);
    let modified = Utc::now().format(DATE_FORMAT).to_string();

    xml_document(None, |w| {
        w.create_element("package")
            .with_attribute(("xmlns", OPF_NS))
            .with_attribute(("version", "3.0"))
            .with_attribute(("unique-identifier", "id"))
            .with_attribute(("xml:lang", language.as_ref()))
            .write_inner_content(|w| {
                w.create_element("metadata")
                    .with_attribute(("xmlns:dc", DC_NS))
                    .write_inner_content(|w| {
                        w.create_element("dc:identifier")
                            .with_attribute(("id", "id"))
                            .write_text_content(text(&meta.identifier))?;
                        w.create_element("dc:title")
                            .write_text_content(text(&meta.title))?;
                        w.create_element("dc:language")
                            .write_text_content(text(&meta.language))?;
                        w.create_element("dc:creator")
                            .with_attribute(("id", "creator"))
                            .write_text_content(text(&meta.author))?;
                        if let Some(published) = meta.published {
                            let date = published.format(DATE_FORMAT).to_string();
                            w.create_element("dc:date").write_text_content(text(&date))?;
                        }
                        w.create_element("meta")
                            .with_attribute(("property", "dcterms:modified"))
                            .write_text_content(text(&modified))?;
                        Ok(())
                    })?;

                w.create_element("manifest").write_inner_content(|w| {
                    w.create_element("item")
                        .with_attribute(("href", NAV_FILE))
                        .with_attribute(("id", "nav"))
                        .with_attribute(("media-type", "application/xhtml+xml"))
                        .with_attribute(("properties", "nav"))
                        .write_empty()?;
                    w.create_element("item")
                        .with_attribute(("href", NCX_FILE))
                        .with_attribute(("id", "ncx"))
                        .with_attribute(("media-type", "application/x-dtbncx+xml"))
                        .write_empty()?;
                    for (i, chapter) in doc.chapters.iter().enumerate() {
                        let id = chapter_id(i);
                        w.create_element("item")
                            .with_attribute(("href", chapter.file_name.as_str()))
                            .with_attribute(("id", id.as_str()))
                            .with_attribute(("media-type", "application/xhtml+xml"))
                            .write_empty()?;
                    }
                    Ok(())
                })?;

                w.create_element("spine")
                    .with_attribute(("toc", "ncx"))
                    .write_inner_content(|w| {
                        w.create_element("itemref")
                            .with_attribute(("idref", "nav"))
                            .write_empty()?;
                        for i in 0..doc.chapters.len() {
                            let id = chapter_id(i);
                            w.create_element("itemref")
                                .with_attribute(("idref", id.as_str()))
                                .write_empty()?;
                        }
                        Ok(())
                    })?;
                Ok(())
            })?;
        Ok(())
    })
}

fn nav_document(doc: &EpubDocument) -> Result<Vec<u8>, EpubError> {
    let meta = &doc.metadata;

    xml_document(Some("html"), |w| {
        w.write_event(Event::Start(xhtml_root(&meta.language)))?;
        xhtml_head(w, &meta.title)?;

        w.create_element("body").write_inner_content(|w| {
            w.create_element("nav")
                .with_attribute(("epub:type", "toc"))
                .with_attribute(("id", "toc"))
                .write_inner_content(|w| {
                    w.create_element("h2").write_text_content(text(&meta.title))?;
                    w.create_element("ol").write_inner_content(|w| {
                        for chapter in &doc.chapters {
                            w.create_element("li").write_inner_content(|w| {
                                w.create_element("a")
                                    .with_attribute(("href", chapter.file_name.as_str()))
                                    .write_text_content(text(&chapter.title))?;
                                Ok(())
                            })?;
                        }
                        Ok(())
                    })?;
                    Ok(())
                })?;
            Ok(())
        })?;

        w.write_event(Event::End(BytesEnd::new("html")))
    })
}

fn ncx_document(doc: &EpubDocument) -> Result<Vec<u8>, EpubError> {
    let meta = &doc.metadata;
    let uid = xml_safe(&meta.identifier);

    xml_document(None, |w| {
        w.create_element("ncx")
            .with_attribute(("xmlns", NCX_NS))
            .with_attribute(("version", "2005-1"))
            .write_inner_content(|w| {
                w.create_element("head").write_inner_content(|w| {
                    for (name, content) in [
                        ("dtb:uid", uid.as_ref()),
                        ("dtb:depth", "1"),
                        ("dtb:totalPageCount", "0"),
                        ("dtb:maxPageNumber", "0"),
                    ] {
                        w.create_element("meta")
                            .with_attribute(("name", name))
                            .with_attribute(("content", content))
                            .write_empty()?;
                    }
                    Ok(())
                })?;

                w.create_element("docTitle").write_inner_content(|w| {
                    w.create_element("text").write_text_content(text(&meta.title))?;
                    Ok(())
                })?;

                w.create_element("navMap").write_inner_content(|w| {
                    for (i, chapter) in doc.chapters.iter().enumerate() {
                        let id = chapter_id(i);
                        let order = (i + 1).to_string();
                        w.create_element("navPoint")
                            .with_attribute(("id", id.as_str()))
                            .with_attribute(("playOrder", order.as_str()))
                            .write_inner_content(|w| {
                                w.create_element("navLabel").write_inner_content(|w| {
                                    w.create_element("text")
                                        .write_text_content(text(&chapter.title))?;
                                    Ok(())
                                })?;
                                w.create_element("content")
                                    .with_attribute(("src", chapter.file_name.as_str()))
                                    .write_empty()?;
                                Ok(())
                            })?;
                    }
                    Ok(())
                })?;
                Ok(())
            })?;
        Ok(())
    })
}

/// Chapter file; `chapter.body` is already XHTML and is embedded as is
fn chapter_document(chapter: &Chapter, language: &str) -> Result<Vec<u8>, EpubError> {
    xml_document(Some("html"), |w| {
        w.write_event(Event::Start(xhtml_root(language)))?;
        xhtml_head(w, &chapter.title)?;
        w.create_element("body")
            .write_text_content(BytesText::from_escaped(chapter.body.as_str()))?;
        w.write_event(Event::End(BytesEnd::new("html")))
    })
}
