//! Document metadata (`Ustveri.xml`).
//!
//! Describes the primary document: subject, dates, originator, receivers,
//! intended signers, and a descriptor of the primary part carrying its size
//! and hex SHA-256. The descriptor is only a claim; verification recomputes
//! the digest from the stored bytes (see [`crate::verify`]).

use super::target::Target;
use super::{parse_elements, XmlBuilder, EYP_NAMESPACE};
use crate::digest::{Digest, SHA256_ALGORITHM_URI};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An institution or unit that originates or receives documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Institutional identifier
    pub id: String,
    /// Display name
    pub name: String,
}

/// A person expected to sign the package.
///
/// Signers are kept in signing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub given_name: String,
    pub surname: String,
    pub title: String,
    /// Capacity in which the person signs (e.g. "Genel Başkan adına")
    pub capacity: String,
}

/// Structured metadata supplied by the document-management layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub subject: String,
    pub reference_date: NaiveDate,
    /// Registry number of the document, used for the storage key
    pub document_number: String,
    pub originator: Entity,
    pub targets: Vec<Target>,
    #[serde(default)]
    pub signers: Vec<Signer>,
}

/// Name, type, size and digest of a stored part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDescriptor {
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub digest: Digest,
}

impl PartDescriptor {
    /// Describe a byte blob.
    pub fn describe(file_name: impl Into<String>, mime_type: impl Into<String>, data: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            digest: Digest::of(data),
        }
    }

    fn write(&self, xml: &mut XmlBuilder, element: &str) {
        let size = self.size.to_string();
        xml.open(
            element,
            &[
                ("DosyaAdi", self.file_name.as_str()),
                ("MimeTuru", self.mime_type.as_str()),
                ("Boyut", size.as_str()),
            ],
        )
        .leaf("Ozet", &[("Algoritma", SHA256_ALGORITHM_URI)], &self.digest.to_hex())
        .close(element);
    }

    /// Read the primary-part descriptor back from serialized `Ustveri.xml`.
    pub fn read_primary(xml: &str) -> Result<Self> {
        let elements = parse_elements(xml)?;
        let start = elements
            .iter()
            .position(|e| e.name == "UstYazi")
            .ok_or_else(|| Error::MalformedPackage("Ustveri has no UstYazi descriptor".into()))?;
        let head = &elements[start];
        let ozet = elements[start..]
            .iter()
            .find(|e| e.name == "Ozet")
            .ok_or_else(|| Error::MalformedPackage("UstYazi descriptor has no digest".into()))?;

        let missing = |attr: &str| Error::MalformedPackage(format!("UstYazi is missing {attr}"));
        let file_name = head.attr("DosyaAdi").ok_or_else(|| missing("DosyaAdi"))?;
        let mime_type = head.attr("MimeTuru").ok_or_else(|| missing("MimeTuru"))?;
        let size = head
            .attr("Boyut")
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| missing("Boyut"))?;
        let digest = Digest::from_hex(&ozet.text)
            .ok_or_else(|| Error::MalformedPackage(format!("Invalid digest: {}", ozet.text)))?;

        Ok(Self {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            size,
            digest,
        })
    }
}

/// `<Imzalar>` block, one `<Imza Sira="n">` per signer in order.
pub(crate) fn write_signers(xml: &mut XmlBuilder, signers: &[Signer]) {
    xml.open("Imzalar", &[]);
    for (idx, signer) in signers.iter().enumerate() {
        let order = (idx + 1).to_string();
        xml.open("Imza", &[("Sira", order.as_str())])
            .leaf("Adi", &[], &signer.given_name)
            .leaf("Soyadi", &[], &signer.surname)
            .leaf("Unvan", &[], &signer.title)
            .leaf("Amac", &[], &signer.capacity)
            .close("Imza");
    }
    xml.close("Imzalar");
}

/// Everything written into `Ustveri.xml`.
#[derive(Debug, Clone)]
pub struct UstveriDocument<'a> {
    pub package_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub metadata: &'a DocumentMetadata,
    pub primary: &'a PartDescriptor,
    pub attachments: &'a [PartDescriptor],
}

impl UstveriDocument<'_> {
    /// Serialize to canonical XML.
    pub fn to_xml(&self) -> String {
        let meta = self.metadata;
        let package_id = self.package_id.to_string();
        let created = self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let date = meta.reference_date.format("%Y-%m-%d").to_string();

        let mut xml = XmlBuilder::new();
        xml.open("Ustveri", &[("xmlns", EYP_NAMESPACE)])
            .leaf("BelgeId", &[], &package_id)
            .leaf("OlusturmaTarihi", &[], &created)
            .leaf("Konu", &[], &meta.subject)
            .leaf("Tarih", &[], &date)
            .leaf("BelgeNo", &[], &meta.document_number);

        xml.open("Olusturan", &[])
            .leaf("OgeId", &[], &meta.originator.id)
            .leaf("Adi", &[], &meta.originator.name)
            .close("Olusturan");

        xml.open("Dagitimlar", &[]);
        for target in &meta.targets {
            xml.open("Dagitim", &[("Amac", target.purpose.code())])
                .leaf("OgeId", &[], &target.id)
                .leaf("Adi", &[], &target.name)
                .close("Dagitim");
        }
        xml.close("Dagitimlar");

        if !meta.signers.is_empty() {
            write_signers(&mut xml, &meta.signers);
        }

        self.primary.write(&mut xml, "UstYazi");

        if !self.attachments.is_empty() {
            xml.open("Ekler", &[]);
            for attachment in self.attachments {
                attachment.write(&mut xml, "Ek");
            }
            xml.close("Ekler");
        }

        xml.close("Ustveri");
        xml.finish()
    }
}
