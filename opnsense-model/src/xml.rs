//! Minimal XML element tree for firewall configuration files.
//!
//! Configuration exports are plain element trees: no mixed content, no
//! namespaces worth keeping. The reader collapses each element into an
//! [`XmlNode`] and drops whitespace-only text so that lookups can treat
//! `<enable/>` and `<enable>1</enable>` the same way.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while reading configuration XML.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("invalid UTF-8 in XML: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("failed to decode XML text: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed XML: {0}")]
    Malformed(String),
}

/// One element of a configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XmlNode {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<XmlNode>,
    pub text: Option<String>,
}

impl XmlNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// First child element named `tag`.
    pub fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All child elements named `tag`, in document order.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Follow a path of child tags.
    pub fn descend(&self, path: &[&str]) -> Option<&XmlNode> {
        let mut current = self;
        for segment in path {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Trimmed text at `path`, `None` when missing or blank.
    pub fn text_at(&self, path: &[&str]) -> Option<&str> {
        self.descend(path)?
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Owned text at `path`, empty when missing.
    pub fn string_at(&self, path: &[&str]) -> String {
        self.text_at(path).unwrap_or_default().to_string()
    }

    /// Boolean flag at `path`.
    ///
    /// A present element with no text counts as set (`<enable/>`); text is
    /// interpreted as `1`/`yes`/`on`/`true`/`enabled`.
    pub fn flag(&self, path: &[&str]) -> bool {
        let Some(node) = self.descend(path) else {
            return false;
        };
        match node.text.as_deref().map(str::trim) {
            None | Some("") => node.children.is_empty(),
            Some(value) => matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "yes" | "on" | "true" | "enabled"
            ),
        }
    }
}

/// Parse XML bytes into a tree.
pub fn parse(xml: &[u8]) -> Result<XmlNode, ParseError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut open: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => open.push(element(&start, &reader)?),
            Event::Empty(start) => {
                let node = element(&start, &reader)?;
                attach(node, &mut open, &mut root)?;
            }
            Event::Text(text) => {
                if let Some(current) = open.last_mut() {
                    append_text(current, &text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = open.last_mut() {
                    append_text(current, std::str::from_utf8(data.as_ref())?);
                }
            }
            Event::End(_) => {
                let node = open.pop().ok_or_else(|| {
                    ParseError::Malformed("closing tag without matching open tag".to_string())
                })?;
                attach(node, &mut open, &mut root)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => {}
        }
        buf.clear();
    }

    if let Some(unclosed) = open.last() {
        return Err(ParseError::Malformed(format!(
            "element <{}> is never closed",
            unclosed.tag
        )));
    }
    root.ok_or_else(|| ParseError::Malformed("document has no root element".to_string()))
}

/// Read and parse an XML file.
pub fn parse_file(path: &Path) -> Result<XmlNode, ParseError> {
    let bytes = fs::read(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&bytes)
}

fn attach(
    node: XmlNode,
    open: &mut [XmlNode],
    root: &mut Option<XmlNode>,
) -> Result<(), ParseError> {
    if let Some(parent) = open.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(ParseError::Malformed(format!(
            "second top-level element <{}>",
            node.tag
        )));
    }
    *root = Some(node);
    Ok(())
}

fn append_text(node: &mut XmlNode, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    node.text.get_or_insert_with(String::new).push_str(text);
}

fn element(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<XmlNode, ParseError> {
    let mut node = XmlNode::new(qname(start.name())?);
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let value = attr
            .decode_and_unescape_value(reader.decoder())?
            .into_owned();
        node.attributes.insert(qname(attr.key)?, value);
    }
    Ok(node)
}

fn qname(name: QName<'_>) -> Result<String, ParseError> {
    Ok(std::str::from_utf8(name.as_ref())?.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse, ParseError};

    #[test]
    fn reads_nested_text_and_flags() {
        let root = parse(
            br#"<?xml version="1.0"?>
            <opnsense>
              <system><hostname> fw1 </hostname><ssh><enabled>enabled</enabled></ssh></system>
              <syslog><enable/></syslog>
              <unbound><enable>0</enable></unbound>
            </opnsense>"#,
        )
        .expect("parse");

        assert_eq!(root.tag, "opnsense");
        assert_eq!(root.text_at(&["system", "hostname"]), Some("fw1"));
        assert!(root.flag(&["system", "ssh", "enabled"]));
        assert!(root.flag(&["syslog", "enable"]));
        assert!(!root.flag(&["unbound", "enable"]));
        assert!(!root.flag(&["missing"]));
    }

    #[test]
    fn keeps_attributes_and_cdata() {
        let root = parse(br#"<opnsense><cert uuid="abc"><crt><![CDATA[PEM]]></crt></cert></opnsense>"#)
            .expect("parse");
        let cert = root.child("cert").expect("cert");
        assert_eq!(cert.attributes.get("uuid").map(String::as_str), Some("abc"));
        assert_eq!(cert.text_at(&["crt"]), Some("PEM"));
    }

    #[test]
    fn rejects_unclosed_element() {
        let err = parse(b"<opnsense><system>").expect_err("must fail");
        assert!(matches!(err, ParseError::Malformed(_) | ParseError::Xml(_)));
    }

    #[test]
    fn rejects_empty_document() {
        let err = parse(b"   ").expect_err("must fail");
        assert!(matches!(err, ParseError::Malformed(_)));
    }
}
