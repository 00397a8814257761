//! HTML normalization for post bodies.
//!
//! Feed content is arbitrary, often broken HTML. It is parsed with the
//! browser-grade `html5ever` parser (via `scraper`) and printed back as
//! XHTML with a `quick-xml` writer, which is what an EPUB content document
//! must contain. Active content is dropped on the way through.

use std::borrow::Cow;
use std::io;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use scraper::{ElementRef, Html, Node};

/// Elements whose whole subtree is removed
const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "frame", "frameset",
];

/// HTML void elements (printed self-closed)
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Attributes that carry URLs
const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction"];

/// Parse `markup` as an HTML fragment and re-serialize it as XHTML
pub fn normalize_html(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let mut writer = Writer::new(Vec::with_capacity(markup.len()));

    match write_children(&mut writer, fragment.root_element()) {
        Ok(()) => String::from_utf8_lossy(&writer.into_inner()).into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize post body");
            String::new()
        }
    }
}

/// Escape text content for XML, dropping characters XML cannot carry
pub fn escape_text(text: &str) -> String {
    partial_escape(xml_safe(text)).into_owned()
}

/// Whether XML 1.0 allows `c` anywhere in a document
pub fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

/// `text` without the characters XML 1.0 forbids
pub fn xml_safe(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|c| is_xml_char(*c)).collect())
    }
}

fn write_children(writer: &mut Writer<Vec<u8>>, element: ElementRef<'_>) -> io::Result<()> {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let escaped = partial_escape(xml_safe(text));
                writer.write_event(Event::Text(BytesText::from_escaped(escaped)))?;
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(writer, child)?;
                }
            }
            // Comments, doctypes and processing instructions are dropped
            _ => {}
        }
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: ElementRef<'_>) -> io::Result<()> {
    let name = element.value().name();

    if DROPPED_ELEMENTS.contains(&name) {
        return Ok(());
    }

    // Names html5ever accepts but XML doesn't (or that need an undeclared
    // prefix, like Word's `o:p`): keep the content only
    if !is_xml_name(name) {
        return write_children(writer, element);
    }

    let mut start = BytesStart::new(name);
    if let Some(namespace) = changed_namespace(element) {
        start.push_attribute(("xmlns", namespace));
    }

    let mut attrs: Vec<(&str, Cow<'_, str>)> = element
        .value()
        .attrs()
        .filter(|(attr, value)| is_safe_attribute(attr, value))
        .map(|(attr, value)| (attr, xml_safe(value)))
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));

    for (attr, value) in &attrs {
        start.push_attribute((*attr, value.as_ref()));
    }

    if VOID_ELEMENTS.contains(&name) {
        return writer.write_event(Event::Empty(start));
    }

    writer.write_event(Event::Start(start))?;
    write_children(writer, element)?;
    writer.write_event(Event::End(BytesEnd::new(name)))
}

/// Namespace to declare on `element` when it differs from its parent's
/// (inline SVG or MathML and the HTML inside them)
fn changed_namespace<'a>(element: ElementRef<'a>) -> Option<&'a str> {
    let namespace: &str = &element.value().name.ns;
    let parent = element.parent().and_then(ElementRef::wrap)?;
    let parent_namespace: &str = &parent.value().name.ns;

    (!namespace.is_empty() && namespace != parent_namespace).then_some(namespace)
}

fn is_safe_attribute(name: &str, value: &str) -> bool {
    if name == "xmlns" || name.to_ascii_lowercase().starts_with("on") {
        return false;
    }

    // Only the predeclared xml: prefix is usable without a declaration
    let valid = match name.strip_prefix("xml:") {
        Some(local) => is_xml_name(local),
        None => is_xml_name(name),
    };
    if !valid {
        return false;
    }

    if URL_ATTRIBUTES.contains(&name) {
        let scheme: String = value
            .chars()
            .filter(|c| !c.is_whitespace() && !c.is_control())
            .take(11)
            .collect::<String>()
            .to_ascii_lowercase();
        return !scheme.starts_with("javascript:") && !scheme.starts_with("vbscript:");
    }

    true
}

/// Unprefixed XML name
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
