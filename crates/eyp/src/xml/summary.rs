//! Digest manifests: `PaketOzeti.xml` (before signing) and `NihaiOzet.xml`
//! (after signing).
//!
//! A manifest is an ordered list of `(part path, algorithm, digest)` entries.
//! Entry order follows part creation order and is never sorted, so the same
//! inputs always produce the same bytes.

use super::{parse_elements, XmlBuilder, EYP_NAMESPACE};
use crate::digest::{Digest, SHA256_ALGORITHM_URI};
use crate::{Error, Result};

/// Which of the two manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// Pass-1 manifest, the bytes the signer signs
    PackageSummary,
    /// Pass-2 manifest covering the signature and the pass-1 manifest
    FinalSummary,
}

impl ManifestKind {
    /// Root element name.
    pub fn element(&self) -> &'static str {
        match self {
            ManifestKind::PackageSummary => "PaketOzeti",
            ManifestKind::FinalSummary => "NihaiOzet",
        }
    }
}

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Part path inside the archive, without leading slash
    pub path: String,
    /// Digest algorithm URI
    pub algorithm: String,
    pub digest: Digest,
}

impl ManifestEntry {
    /// SHA-256 entry for the given part bytes.
    pub fn sha256(path: impl Into<String>, data: &[u8]) -> Self {
        Self {
            path: path.into(),
            algorithm: SHA256_ALGORITHM_URI.to_string(),
            digest: Digest::of(data),
        }
    }
}

/// Ordered digest manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestManifest {
    pub kind: ManifestKind,
    /// Package identifier the manifest belongs to
    pub package_id: String,
    pub entries: Vec<ManifestEntry>,
}

impl DigestManifest {
    pub fn new(kind: ManifestKind, package_id: impl Into<String>) -> Self {
        Self {
            kind,
            package_id: package_id.into(),
            entries: Vec::new(),
        }
    }

    /// Append an entry, keeping insertion order.
    pub fn push(&mut self, entry: ManifestEntry) {
        self.entries.push(entry);
    }

    /// Find the entry for a part path.
    pub fn entry(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Serialize to canonical XML.
    ///
    /// References are written as absolute URIs (`/Folder/file`), matching
    /// part names in the content-type manifest.
    pub fn to_xml(&self) -> String {
        let mut xml = XmlBuilder::new();
        let root = self.kind.element();
        xml.open(root, &[("Id", self.package_id.as_str()), ("xmlns", EYP_NAMESPACE)]);
        for entry in &self.entries {
            let uri = format!("/{}", entry.path);
            xml.open("Reference", &[("URI", uri.as_str())])
                .empty("DigestMethod", &[("Algorithm", entry.algorithm.as_str())])
                .leaf("DigestValue", &[], &entry.digest.to_base64())
                .close("Reference");
        }
        xml.close(root);
        xml.finish()
    }

    /// Parse a serialized manifest.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let elements = parse_elements(xml)?;
        let root = elements
            .first()
            .ok_or_else(|| Error::MalformedPackage("Empty manifest".into()))?;
        let kind = match root.name.as_str() {
            "PaketOzeti" => ManifestKind::PackageSummary,
            "NihaiOzet" => ManifestKind::FinalSummary,
            other => {
                return Err(Error::MalformedPackage(format!(
                    "Unexpected manifest root element: {other}"
                )))
            }
        };
        let mut manifest = DigestManifest::new(kind, root.attr("Id").unwrap_or_default());

        // Reference, DigestMethod, DigestValue arrive in that order per entry
        let mut current: Option<(String, Option<String>)> = None;
        for element in &elements[1..] {
            match element.name.as_str() {
                "Reference" => {
                    let uri = element.attr("URI").ok_or_else(|| {
                        Error::MalformedPackage("Reference without URI".into())
                    })?;
                    current = Some((uri.trim_start_matches('/').to_string(), None));
                }
                "DigestMethod" => {
                    if let Some((_, algorithm)) = current.as_mut() {
                        *algorithm = element.attr("Algorithm").map(str::to_string);
                    }
                }
                "DigestValue" => {
                    let (path, algorithm) = current.take().ok_or_else(|| {
                        Error::MalformedPackage("DigestValue outside Reference".into())
                    })?;
                    let digest = Digest::from_base64(&element.text).ok_or_else(|| {
                        Error::MalformedPackage(format!("Invalid digest value for {path}"))
                    })?;
                    manifest.push(ManifestEntry {
                        path,
                        algorithm: algorithm.unwrap_or_else(|| SHA256_ALGORITHM_URI.to_string()),
                        digest,
                    });
                }
                _ => {}
            }
        }

        Ok(manifest)
    }
}
