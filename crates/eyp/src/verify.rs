//! Package verification.
//!
//! Reopens a package, locates its manifests through the root relationships,
//! and recomputes the digest of every listed part from the stored bytes.
//! Stored digest values are never trusted as given. The primary-part
//! descriptor in `Ustveri.xml` is checked the same way, including its size.
//!
//! Besides digests, a sealed package must have a pass-2 manifest that lists
//! every pass-1 part, the pass-1 manifest and the signature parts. Any
//! archive entry that no manifest lists (apart from `[Content_Types].xml`,
//! relationships files and `NihaiOzet.xml` itself) makes the package invalid.
//!
//! [`check`] returns the full report; [`verify`] fails on the first
//! divergence.

use crate::digest::Digest;
use crate::package::content_types::CONTENT_TYPES_PATH;
use crate::package::relationships::{
    REL_FINAL_SUMMARY, REL_METADATA, REL_PACKAGE_SUMMARY, REL_PRIMARY, REL_SIGNATURE,
    REL_SIGNATURE_INFO,
};
use crate::package::{PackageReader, RelationshipSource};
use crate::xml::{DigestManifest, ManifestKind, PartDescriptor, SignatureInfo};
use crate::{Error, Result};
use tracing::{debug, warn};

/// Lifecycle state found in the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    /// Only `PaketOzeti.xml`, no signature
    Unsigned,
    /// Signature and `NihaiOzet.xml` present
    Sealed,
}

/// Result of recomputing one digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Ok,
    /// Content hashes to a different value
    Mismatch(Digest),
    /// Part listed but not present in the archive
    Missing,
}

/// One manifest entry, checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCheck {
    pub manifest: ManifestKind,
    pub path: String,
    pub expected: Digest,
    pub status: EntryStatus,
}

impl EntryCheck {
    pub fn is_ok(&self) -> bool {
        self.status == EntryStatus::Ok
    }
}

/// Primary-part descriptor from `Ustveri.xml`, checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorCheck {
    /// Primary part the descriptor describes
    pub path: String,
    /// Part holding the descriptor
    pub metadata_path: String,
    pub claimed: PartDescriptor,
    pub actual_digest: Digest,
    pub actual_size: u64,
}

impl DescriptorCheck {
    pub fn is_ok(&self) -> bool {
        self.claimed.digest == self.actual_digest && self.claimed.size == self.actual_size
    }
}

/// Outcome of checking a package.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// Identifier recorded in the manifests
    pub package_id: String,
    pub state: PackageState,
    /// Pass-1 entries followed by pass-2 entries, in manifest order
    pub entries: Vec<EntryCheck>,
    pub primary: Option<DescriptorCheck>,
    /// Signature part related from the package root
    pub signature_path: Option<String>,
    /// Signers and signing time of a sealed package
    pub signature_info: Option<SignatureInfo>,
    /// Parts a sealed package's pass-2 manifest should list but does not
    pub uncovered: Vec<String>,
    /// Archive entries no manifest lists
    pub unlisted: Vec<String>,
}

impl VerificationReport {
    /// True when every digest and the primary descriptor match, the pass-2
    /// manifest is complete and the archive holds nothing unlisted.
    pub fn is_valid(&self) -> bool {
        self.entries.iter().all(EntryCheck::is_ok)
            && self.primary.as_ref().map_or(true, DescriptorCheck::is_ok)
            && self.uncovered.is_empty()
            && self.unlisted.is_empty()
    }

    /// Entries that did not match.
    pub fn failures(&self) -> impl Iterator<Item = &EntryCheck> {
        self.entries.iter().filter(|e| !e.is_ok())
    }

    /// Distinct paths whose content diverged from any recorded value.
    ///
    /// A descriptor that disagrees with an intact primary part is blamed on
    /// the metadata part holding it.
    pub fn mismatched_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for path in self.failures().map(|e| e.path.as_str()) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        if let Some(primary) = self.primary.as_ref().filter(|p| !p.is_ok()) {
            let blamed = if paths.contains(&primary.path.as_str()) {
                None
            } else {
                Some(primary.metadata_path.as_str())
            };
            if let Some(path) = blamed.filter(|p| !paths.contains(p)) {
                paths.push(path);
            }
        }
        paths
    }
}

/// Check every digest in a package and report per entry.
///
/// # Errors
///
/// Returns an error only when the package cannot be read or lacks its
/// package summary. Digest divergences are part of the report.
pub fn check(bytes: &[u8]) -> Result<VerificationReport> {
    let reader = PackageReader::from_bytes(bytes)?;
    let root = RelationshipSource::Root;

    let summary_path = reader
        .find_related(&root, REL_PACKAGE_SUMMARY)?
        .ok_or_else(|| Error::MalformedPackage("No package summary relationship".into()))?;
    let package_summary = DigestManifest::from_xml(&reader.text(&summary_path)?)?;

    let final_path = reader.find_related(&root, REL_FINAL_SUMMARY)?;
    let final_summary = match &final_path {
        Some(path) => Some(DigestManifest::from_xml(&reader.text(path)?)?),
        None => None,
    };
    let state = if final_summary.is_some() {
        PackageState::Sealed
    } else {
        PackageState::Unsigned
    };

    let mut entries = Vec::new();
    for manifest in std::iter::once(&package_summary).chain(final_summary.iter()) {
        for entry in &manifest.entries {
            let status = match reader.entry(&entry.path) {
                None => EntryStatus::Missing,
                Some(data) => {
                    let actual = Digest::of(data);
                    if actual == entry.digest {
                        EntryStatus::Ok
                    } else {
                        EntryStatus::Mismatch(actual)
                    }
                }
            };
            if status != EntryStatus::Ok {
                warn!(manifest = manifest.kind.element(), path = %entry.path, "digest check failed");
            }
            entries.push(EntryCheck {
                manifest: manifest.kind,
                path: entry.path.clone(),
                expected: entry.digest,
                status,
            });
        }
    }

    let primary = match (
        reader.find_related(&root, REL_PRIMARY)?,
        reader.find_related(&root, REL_METADATA)?,
    ) {
        (Some(primary_path), Some(metadata_path)) => {
            let claimed = PartDescriptor::read_primary(&reader.text(&metadata_path)?)?;
            let data = reader.entry(&primary_path).unwrap_or_default();
            Some(DescriptorCheck {
                path: primary_path,
                metadata_path,
                claimed,
                actual_digest: Digest::of(data),
                actual_size: data.len() as u64,
            })
        }
        _ => None,
    };

    let signature_path = reader.find_related(&root, REL_SIGNATURE)?;
    let signature_info_path = reader.find_related(&root, REL_SIGNATURE_INFO)?;
    let signature_info = match &signature_info_path {
        Some(path) if reader.entry(path).is_some() => {
            Some(SignatureInfo::from_xml(&reader.text(path)?)?)
        }
        _ => None,
    };

    // Pass 2 = pass 1 + PaketOzeti + signature parts
    let uncovered: Vec<String> = match &final_summary {
        Some(pass2) => package_summary
            .entries
            .iter()
            .map(|e| e.path.as_str())
            .chain(std::iter::once(summary_path.as_str()))
            .chain(signature_path.as_deref())
            .chain(signature_info_path.as_deref())
            .filter(|path| pass2.entry(path).is_none())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };
    for path in &uncovered {
        warn!(path = %path, "part not covered by final summary");
    }

    let listed = |name: &str| {
        package_summary.entry(name).is_some()
            || final_summary.as_ref().is_some_and(|m| m.entry(name).is_some())
    };
    let unlisted: Vec<String> = reader
        .entry_names()
        .filter(|name| {
            *name != CONTENT_TYPES_PATH
                && !is_relationships_file(*name)
                && *name != summary_path
                && final_path.as_deref() != Some(*name)
                && !listed(*name)
        })
        .map(str::to_string)
        .collect();
    for path in &unlisted {
        warn!(path = %path, "archive entry not listed in any manifest");
    }

    debug!(
        package = %package_summary.package_id,
        entries = entries.len(),
        ?state,
        "package checked"
    );

    Ok(VerificationReport {
        package_id: package_summary.package_id,
        state,
        entries,
        primary,
        signature_path,
        signature_info,
        uncovered,
        unlisted,
    })
}

/// `_rels/.rels` or `<dir>/_rels/<file>.rels`.
fn is_relationships_file(name: &str) -> bool {
    let Some(file) = name.strip_suffix(".rels") else {
        return false;
    };
    match file.rsplit_once('/') {
        Some((dir, _)) => dir == "_rels" || dir.ends_with("/_rels"),
        None => false,
    }
}

/// Verify a package, failing on the first divergence.
///
/// # Errors
///
/// - [`Error::DigestMismatch`] for the first part whose content does not match
/// - [`Error::MalformedPackage`] if a listed part is missing, the pass-2
///   manifest leaves a part out, the archive holds an unlisted entry, or a
///   sealed package has no signature part
pub fn verify(bytes: &[u8]) -> Result<VerificationReport> {
    let report = check(bytes)?;

    for entry in &report.entries {
        match &entry.status {
            EntryStatus::Ok => {}
            EntryStatus::Missing => {
                return Err(Error::MalformedPackage(format!(
                    "Part listed in {} is missing: {}",
                    entry.manifest.element(),
                    entry.path
                )))
            }
            EntryStatus::Mismatch(actual) => {
                return Err(Error::DigestMismatch {
                    path: entry.path.clone(),
                    expected: entry.expected.to_hex(),
                    actual: actual.to_hex(),
                })
            }
        }
    }

    if let Some(primary) = report.primary.as_ref().filter(|p| !p.is_ok()) {
        return Err(Error::DigestMismatch {
            path: primary.metadata_path.clone(),
            expected: primary.claimed.digest.to_hex(),
            actual: primary.actual_digest.to_hex(),
        });
    }

    if let Some(path) = report.uncovered.first() {
        return Err(Error::MalformedPackage(format!(
            "Part not covered by {}: {path}",
            ManifestKind::FinalSummary.element()
        )));
    }

    if let Some(path) = report.unlisted.first() {
        return Err(Error::MalformedPackage(format!(
            "Archive entry not listed in any manifest: {path}"
        )));
    }

    if report.state == PackageState::Sealed && report.signature_path.is_none() {
        return Err(Error::MalformedPackage("Sealed package has no signature".into()));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PackageBuilder;
    use crate::package::PackageInfo;
    use crate::signature::SignatureRecord;
    use crate::xml::{DocumentMetadata, Entity, Target, TargetPurpose};
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn builder() -> PackageBuilder {
        PackageBuilder::new()
            .info(PackageInfo::new(
                Uuid::nil(),
                Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap(),
            ))
            .primary_document("ust_yazi.pdf", "application/pdf", b"%PDF-1.7".to_vec())
            .metadata(DocumentMetadata {
                subject: "Test".into(),
                reference_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                document_number: "17".into(),
                originator: Entity {
                    id: "SEN-001".into(),
                    name: "Sendika".into(),
                },
                targets: vec![Target::new("K-1", "Kurum", TargetPurpose::Information)],
                signers: Vec::new(),
            })
    }

    #[test]
    fn test_unsigned_package_verifies() {
        let bytes = builder().build().unwrap().to_bytes().unwrap();
        let report = verify(&bytes).unwrap();
        assert_eq!(report.state, PackageState::Unsigned);
        assert_eq!(report.entries.len(), 3);
        assert!(report.signature_path.is_none());
        assert!(report.primary.as_ref().unwrap().is_ok());
        assert_eq!(report.package_id, Uuid::nil().to_string());
    }

    #[test]
    fn test_sealed_package_verifies() {
        let sealed = builder()
            .build()
            .unwrap()
            .seal(SignatureRecord::new(b"imza".to_vec(), Vec::new()))
            .unwrap();
        let report = verify(sealed.bytes()).unwrap();
        assert_eq!(report.state, PackageState::Sealed);
        // 3 pass-1 entries, 6 pass-2 entries
        assert_eq!(report.entries.len(), 9);
        assert_eq!(report.signature_path.as_deref(), Some("ImzaCades/ImzaCades.imz"));
        assert!(report.signature_info.as_ref().unwrap().signers.is_empty());
        assert!(report.uncovered.is_empty());
        assert!(report.unlisted.is_empty());
        assert!(report.is_valid());
    }

    #[test]
    fn test_relationships_file_names() {
        assert!(is_relationships_file("_rels/.rels"));
        assert!(is_relationships_file("PaketOzeti/_rels/PaketOzeti.xml.rels"));
        assert!(!is_relationships_file("Ekler/ek.rels"));
        assert!(!is_relationships_file(".rels"));
    }

    #[test]
    fn test_not_a_package() {
        assert!(check(b"PK\x03\x04 broken").is_err());
    }
}
