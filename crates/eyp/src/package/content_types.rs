//! `[Content_Types].xml` generation.
//!
//! One `Default` mapping per distinct extension, plus an `Override` for every
//! part whose MIME type differs from its extension's default (in practice the
//! two digest manifests) or that has no extension at all.

use super::Part;
use crate::xml::XmlBuilder;
use std::collections::BTreeMap;

/// Archive path of the content-type manifest.
pub const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";

const CONTENT_TYPES_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/package/2006/content-types";

/// Content type of relationship parts.
pub const RELATIONSHIPS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-package.relationships+xml";

/// Default content type for well-known extensions.
fn well_known(extension: &str) -> Option<&'static str> {
    match extension {
        "xml" => Some("application/xml"),
        "rels" => Some(RELATIONSHIPS_CONTENT_TYPE),
        "pdf" => Some("application/pdf"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

/// Lowercased extension of the last path segment.
pub(crate) fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// Serialize the content-type manifest for the given parts.
///
/// Defaults are sorted by extension; overrides follow part order.
pub fn content_types_xml(parts: &[Part]) -> String {
    let mut defaults: BTreeMap<String, String> = BTreeMap::new();
    defaults.insert("rels".to_string(), RELATIONSHIPS_CONTENT_TYPE.to_string());

    // Unknown extensions take the type of the first part that uses them
    for part in parts {
        if let Some(ext) = extension(part.path()) {
            defaults.entry(ext.clone()).or_insert_with(|| {
                well_known(&ext)
                    .map(str::to_string)
                    .unwrap_or_else(|| part.mime_type().to_string())
            });
        }
    }

    let overrides: Vec<(String, &str)> = parts
        .iter()
        .filter(|part| match extension(part.path()) {
            Some(ext) => defaults.get(&ext).map(String::as_str) != Some(part.mime_type()),
            None => true,
        })
        .map(|part| (format!("/{}", part.path()), part.mime_type()))
        .collect();

    let mut xml = XmlBuilder::new();
    xml.open("Types", &[("xmlns", CONTENT_TYPES_NAMESPACE)]);
    for (ext, content_type) in &defaults {
        xml.empty(
            "Default",
            &[("Extension", ext.as_str()), ("ContentType", content_type.as_str())],
        );
    }
    for (name, content_type) in &overrides {
        xml.empty("Override", &[("PartName", name.as_str()), ("ContentType", *content_type)]);
    }
    xml.close("Types");
    xml.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageAssembler, PackageInfo};
    use crate::xml::parse_elements;

    fn parts() -> Vec<Part> {
        let mut assembler = PackageAssembler::with_info(PackageInfo::generate());
        assembler.add_part("UstYazi/b.pdf", "application/pdf", vec![1]).unwrap();
        assembler.add_part("Ustveri/Ustveri.xml", "application/xml", vec![2]).unwrap();
        assembler
            .add_part("PaketOzeti/PaketOzeti.xml", "application/vnd.eyp.paketozeti+xml", vec![3])
            .unwrap();
        assembler
            .add_part("ImzaCades/ImzaCades.imz", "application/pkcs7-signature", vec![4])
            .unwrap();
        assembler.add_part("Ekler/README", "text/plain", vec![5]).unwrap();
        assembler.parts().to_vec()
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/b/c.PDF"), Some("pdf".into()));
        assert_eq!(extension("a.b/c"), None);
        assert_eq!(extension("_rels/.rels"), None);
        assert_eq!(extension("x.tar.gz"), Some("gz".into()));
    }

    #[test]
    fn test_defaults_and_overrides() {
        let xml = content_types_xml(&parts());
        let elements = parse_elements(&xml).unwrap();

        let defaults: Vec<_> = elements
            .iter()
            .filter(|e| e.name == "Default")
            .map(|e| (e.attr("Extension").unwrap(), e.attr("ContentType").unwrap()))
            .collect();
        assert_eq!(
            defaults,
            vec![
                ("imz", "application/pkcs7-signature"),
                ("pdf", "application/pdf"),
                ("rels", RELATIONSHIPS_CONTENT_TYPE),
                ("xml", "application/xml"),
            ]
        );

        let overrides: Vec<_> = elements
            .iter()
            .filter(|e| e.name == "Override")
            .map(|e| e.attr("PartName").unwrap())
            .collect();
        assert_eq!(overrides, vec!["/PaketOzeti/PaketOzeti.xml", "/Ekler/README"]);
    }
}
