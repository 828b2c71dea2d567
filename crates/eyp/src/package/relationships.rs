//! Relationship files (`_rels/*.rels`) and relationship type URIs.

use super::{Relationship, RelationshipSource};
use crate::xml::{parse_elements, XmlBuilder};
use crate::Result;

const RELATIONSHIPS_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";

const REL_BASE: &str = "http://eyazisma.dpt/iliskiler/";

/// Root -> primary document
pub const REL_PRIMARY: &str = "http://eyazisma.dpt/iliskiler/ustyazi";
/// Root -> `Ustveri.xml`
pub const REL_METADATA: &str = "http://eyazisma.dpt/iliskiler/ustveri";
/// Root -> `BelgeHedef.xml`
pub const REL_TARGETS: &str = "http://eyazisma.dpt/iliskiler/belgehedef";
/// Root -> `PaketOzeti.xml`
pub const REL_PACKAGE_SUMMARY: &str = "http://eyazisma.dpt/iliskiler/paketozeti";
/// Root -> signature
pub const REL_SIGNATURE: &str = "http://eyazisma.dpt/iliskiler/imzacades";
/// Root -> `ImzaBilgisi.xml` (signers and signing time)
pub const REL_SIGNATURE_INFO: &str = "http://eyazisma.dpt/iliskiler/imzabilgisi";
/// Root -> `NihaiOzet.xml`
pub const REL_FINAL_SUMMARY: &str = "http://eyazisma.dpt/iliskiler/nihaiozet";
/// Root -> attachment
pub const REL_ATTACHMENT: &str = "http://eyazisma.dpt/iliskiler/ek";

/// Archive path of the relationships file for a source.
///
/// Root edges live in `_rels/.rels`; edges of `Dir/name.ext` live in
/// `Dir/_rels/name.ext.rels`.
pub fn rels_path(source: &RelationshipSource) -> String {
    match source {
        RelationshipSource::Root => "_rels/.rels".to_string(),
        RelationshipSource::Part(path) => match path.rsplit_once('/') {
            Some((dir, name)) => format!("{dir}/_rels/{name}.rels"),
            None => format!("_rels/{path}.rels"),
        },
    }
}

/// Serialize the relationships of one source.
pub fn relationships_xml(relationships: &[&Relationship]) -> String {
    let mut xml = XmlBuilder::new();
    xml.open("Relationships", &[("xmlns", RELATIONSHIPS_NAMESPACE)]);
    for rel in relationships {
        let target = format!("/{}", rel.target);
        xml.empty(
            "Relationship",
            &[
                ("Type", rel.relation_type.as_str()),
                ("Target", target.as_str()),
                ("Id", rel.id.as_str()),
            ],
        );
    }
    xml.close("Relationships");
    xml.finish()
}

/// A relationship read back from a `.rels` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipEntry {
    pub id: String,
    pub relation_type: String,
    /// Target part path without leading slash
    pub target: String,
}

/// Parse a `.rels` file.
pub fn parse_relationships(xml: &str) -> Result<Vec<RelationshipEntry>> {
    let entries = parse_elements(xml)?
        .into_iter()
        .filter(|e| e.name == "Relationship")
        .filter_map(|e| {
            Some(RelationshipEntry {
                id: e.attr("Id")?.to_string(),
                relation_type: e.attr("Type")?.to_string(),
                target: e.attr("Target")?.trim_start_matches('/').to_string(),
            })
        })
        .collect();
    Ok(entries)
}

/// Short name of a relation type (`ustyazi`, `ek`, ...), for display.
pub fn short_name(relation_type: &str) -> &str {
    relation_type.strip_prefix(REL_BASE).unwrap_or(relation_type)
}
