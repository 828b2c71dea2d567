//! Canonical XML serialization for package parts.
//!
//! Every structured part (metadata, target list, digest manifests, content
//! types, relationships) is produced by a pure function returning a string.
//! The functions share [`XmlBuilder`], which fixes the declaration,
//! indentation and attribute order, so identical records always serialize to
//! identical bytes.
//!
//! | Part | Generator |
//! |------|-----------|
//! | `Ustveri/Ustveri.xml` | [`ustveri::UstveriDocument::to_xml`] |
//! | `BelgeHedef/BelgeHedef.xml` | [`target::TargetList::to_xml`] |
//! | `PaketOzeti/PaketOzeti.xml` | [`summary::DigestManifest::to_xml`] |
//! | `ImzaCades/ImzaBilgisi.xml` | [`signature_info::SignatureInfo::to_xml`] |
//! | `NihaiOzet/NihaiOzet.xml` | [`summary::DigestManifest::to_xml`] |
//!
//! Free text is escaped with [`quick_xml::escape::escape`]; reading back
//! goes through [`parse_elements`].

pub mod signature_info;
pub mod summary;
pub mod target;
pub mod ustveri;

pub use signature_info::SignatureInfo;
pub use summary::{DigestManifest, ManifestEntry, ManifestKind};
pub use target::{Target, TargetList, TargetPurpose};
pub use ustveri::{DocumentMetadata, Entity, PartDescriptor, Signer, UstveriDocument};

use crate::Result;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Namespace of the document-package vocabulary.
pub const EYP_NAMESPACE: &str = "urn:dpt-eyazisma-schema:core:v1.0";

const DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

/// Line-oriented XML writer with fixed two-space indentation.
pub(crate) struct XmlBuilder {
    buf: String,
    depth: usize,
}

impl XmlBuilder {
    pub(crate) fn new() -> Self {
        Self {
            buf: String::from(DECLARATION),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str("  ");
        }
    }

    fn start_tag(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.indent();
        self.buf.push('<');
        self.buf.push_str(name);
        for (key, value) in attrs {
            self.buf.push(' ');
            self.buf.push_str(key);
            self.buf.push_str("=\"");
            self.buf.push_str(&escape(*value));
            self.buf.push('"');
        }
    }

    /// Open an element that will contain children.
    pub(crate) fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> &mut Self {
        self.start_tag(name, attrs);
        self.buf.push_str(">\n");
        self.depth += 1;
        self
    }

    pub(crate) fn close(&mut self, name: &str) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push_str(">\n");
        self
    }

    /// Element with escaped text content and no children.
    pub(crate) fn leaf(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> &mut Self {
        self.start_tag(name, attrs);
        self.buf.push('>');
        self.buf.push_str(&escape(text));
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push_str(">\n");
        self
    }

    pub(crate) fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> &mut Self {
        self.start_tag(name, attrs);
        self.buf.push_str("/>\n");
        self
    }

    pub(crate) fn finish(self) -> String {
        self.buf
    }
}

/// A flattened element read back from a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name (namespace prefix stripped)
    pub name: String,
    /// Attributes in document order, local names, unescaped values
    pub attributes: Vec<(String, String)>,
    /// Concatenated, unescaped text content directly inside the element
    pub text: String,
}

impl XmlElement {
    /// Look up an attribute by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Read every element of a document in document order.
///
/// Nesting is not preserved; callers select elements by name. Text is
/// attached to the innermost open element.
pub fn parse_elements(xml: &str) -> Result<Vec<XmlElement>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut elements: Vec<XmlElement> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                elements.push(read_element(&e)?);
                open.push(elements.len() - 1);
            }
            Event::Empty(e) => {
                elements.push(read_element(&e)?);
            }
            Event::End(_) => {
                open.pop();
            }
            Event::Text(t) => {
                if let Some(&idx) = open.last() {
                    let text = t.unescape()?;
                    if let Some(element) = elements.get_mut(idx) {
                        element.text.push_str(&text);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(elements)
}

fn read_element(e: &quick_xml::events::BytesStart<'_>) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        text: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_layout() {
        let mut xml = XmlBuilder::new();
        xml.open("Root", &[("Id", "1")])
            .leaf("Name", &[], "value")
            .empty("Flag", &[("On", "true")])
            .close("Root");
        let out = xml.finish();
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <Root Id=\"1\">\n  <Name>value</Name>\n  <Flag On=\"true\"/>\n</Root>\n"
        );
    }

    #[test]
    fn test_builder_escapes_text_and_attributes() {
        let mut xml = XmlBuilder::new();
        xml.leaf("T", &[("a", "x\"y'z")], "a & b < c > d");
        let out = xml.finish();
        assert!(out.contains("a &amp; b &lt; c &gt; d"));
        assert!(out.contains("a=\"x&quot;y&apos;z\""));
    }

    #[test]
    fn test_parse_round_trip_of_escaped_text() {
        let mut xml = XmlBuilder::new();
        xml.open("Root", &[])
            .leaf("Konu", &[("Dil", "tr")], "Ücret & \"aidat\" <2024>")
            .close("Root");
        let elements = parse_elements(&xml.finish()).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].name, "Konu");
        assert_eq!(elements[1].attr("Dil"), Some("tr"));
        assert_eq!(elements[1].text, "Ücret & \"aidat\" <2024>");
    }

    #[test]
    fn test_parse_strips_prefixes() {
        let elements =
            parse_elements("<a:Root xmlns:a=\"urn:x\"><a:Item a:Key=\"v\"/></a:Root>").unwrap();
        assert_eq!(elements[1].name, "Item");
        assert_eq!(elements[1].attr("Key"), Some("v"));
    }

    #[test]
    fn test_parse_rejects_broken_xml() {
        assert!(parse_elements("<Root><Open></Root>").is_err());
    }
}
