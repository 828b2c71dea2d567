//! Target list (`BelgeHedef.xml`): who the document is addressed to.

use super::{XmlBuilder, EYP_NAMESPACE};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Why a target receives the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPurpose {
    /// The target is expected to act on the document
    Action,
    /// The target receives the document for information only
    Information,
}

impl TargetPurpose {
    /// Purpose code written to the XML.
    pub fn code(&self) -> &'static str {
        match self {
            TargetPurpose::Action => "GEREGI",
            TargetPurpose::Information => "BILGI",
        }
    }
}

/// A receiving entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Institutional identifier of the receiver
    pub id: String,
    /// Display name
    pub name: String,
    /// Purpose code
    pub purpose: TargetPurpose,
}

impl Target {
    pub fn new(id: impl Into<String>, name: impl Into<String>, purpose: TargetPurpose) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            purpose,
        }
    }
}

/// Ordered list of targets, serialized as `BelgeHedef.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetList {
    targets: Vec<Target>,
}

impl TargetList {
    /// Build a target list; at least one target is required.
    pub fn new(targets: Vec<Target>) -> Result<Self> {
        if targets.is_empty() {
            return Err(Error::Config("At least one target entity is required".into()));
        }
        Ok(Self { targets })
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Serialize to canonical XML.
    pub fn to_xml(&self) -> String {
        let mut xml = XmlBuilder::new();
        xml.open("BelgeHedef", &[("xmlns", EYP_NAMESPACE)]);
        xml.open("HedefListesi", &[]);
        for target in &self.targets {
            xml.open("Hedef", &[("Amac", target.purpose.code())])
                .leaf("OgeId", &[], &target.id)
                .leaf("Adi", &[], &target.name)
                .close("Hedef");
        }
        xml.close("HedefListesi");
        xml.close("BelgeHedef");
        xml.finish()
    }
}
