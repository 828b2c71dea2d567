//! Signature information (`ImzaCades/ImzaBilgisi.xml`).
//!
//! The CAdES blob is opaque to this crate, so who signed and when is kept
//! next to it in a small XML part. The part is added at sealing time and is
//! covered by the pass-2 manifest.

use super::ustveri::{write_signers, Signer};
use super::{parse_elements, XmlBuilder, EYP_NAMESPACE};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Signers and signing time recorded in a sealed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signed_at: DateTime<Utc>,
    /// Signers in signing order
    pub signers: Vec<Signer>,
}

impl SignatureInfo {
    /// Serialize to canonical XML.
    pub fn to_xml(&self) -> String {
        let signed_at = self.signed_at.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut xml = XmlBuilder::new();
        xml.open("ImzaBilgisi", &[("xmlns", EYP_NAMESPACE)])
            .leaf("ImzaTarihi", &[], &signed_at);
        write_signers(&mut xml, &self.signers);
        xml.close("ImzaBilgisi");
        xml.finish()
    }

    /// Parse a serialized `ImzaBilgisi.xml`.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let elements = parse_elements(xml)?;
        match elements.first() {
            Some(root) if root.name == "ImzaBilgisi" => {}
            _ => return Err(Error::MalformedPackage("Not a signature info part".into())),
        }

        let mut signed_at = None;
        let mut signers: Vec<Signer> = Vec::new();
        for element in &elements[1..] {
            let text = element.text.clone();
            match element.name.as_str() {
                "ImzaTarihi" => {
                    let parsed = DateTime::parse_from_rfc3339(&text).map_err(|e| {
                        Error::MalformedPackage(format!("Invalid signing time {text}: {e}"))
                    })?;
                    signed_at = Some(parsed.with_timezone(&Utc));
                }
                "Imza" => signers.push(Signer::default()),
                field => {
                    let Some(signer) = signers.last_mut() else {
                        continue;
                    };
                    match field {
                        "Adi" => signer.given_name = text,
                        "Soyadi" => signer.surname = text,
                        "Unvan" => signer.title = text,
                        "Amac" => signer.capacity = text,
                        _ => {}
                    }
                }
            }
        }

        let signed_at = signed_at
            .ok_or_else(|| Error::MalformedPackage("Signature info has no ImzaTarihi".into()))?;
        Ok(Self { signed_at, signers })
    }
}
