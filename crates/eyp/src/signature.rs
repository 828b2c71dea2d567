//! Signature embedding: the Unsigned → Sealed transition.
//!
//! An [`UnsignedPackage`] holds the final pass-1 manifest (`PaketOzeti.xml`).
//! Its bytes are what the signer agent signs. [`UnsignedPackage::seal`] takes
//! the returned signature and adds two parts to the `ImzaCades/` folder:
//! the raw signature `ImzaCades.imz` and `ImzaBilgisi.xml` with the signers
//! and signing time. It then computes the pass-2 manifest (`NihaiOzet.xml`)
//! over every part, including both of those and the pass-1 manifest, and
//! serializes the archive.
//!
//! Every part, the signature included, is related from the package root, so
//! a sealed archive carries only the root `_rels/.rels` relationships file.
//!
//! Sealing consumes the unsigned package. A [`SealedPackage`] exposes no way
//! to add parts; a corrected package has to be built from scratch.

use crate::builder::{
    summarize, FINAL_SUMMARY_MIME, FINAL_SUMMARY_PATH, PACKAGE_SUMMARY_PATH, SIGNATURE_INFO_PATH,
    SIGNATURE_MIME, SIGNATURE_PATH, XML_MIME,
};
use crate::digest::Digest;
use crate::package::relationships::{REL_FINAL_SUMMARY, REL_SIGNATURE, REL_SIGNATURE_INFO};
use crate::package::{PackageAssembler, PackageInfo, RelationshipSource};
use crate::storage::{storage_key, PackageStore};
use crate::xml::{DigestManifest, DocumentMetadata, ManifestKind, SignatureInfo, Signer};
use crate::{Error, Result};
use chrono::{DateTime, Datelike, Utc};
use tracing::info;
use uuid::Uuid;

/// Signature produced by the signer agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Signers in signing order
    pub signers: Vec<Signer>,
    pub signed_at: DateTime<Utc>,
    /// Raw CAdES signature bytes
    pub signature: Vec<u8>,
}

impl SignatureRecord {
    pub fn new(signature: Vec<u8>, signers: Vec<Signer>) -> Self {
        Self {
            signers,
            signed_at: Utc::now(),
            signature,
        }
    }

    /// Signers and signing time, as written to `ImzaBilgisi.xml`.
    pub fn info(&self) -> SignatureInfo {
        SignatureInfo {
            signed_at: self.signed_at,
            signers: self.signers.clone(),
        }
    }
}

/// Package with its pass-1 manifest, waiting for a signature.
#[derive(Debug, Clone)]
pub struct UnsignedPackage {
    assembler: PackageAssembler,
    manifest: DigestManifest,
    metadata: DocumentMetadata,
}

impl UnsignedPackage {
    pub(crate) fn new(
        assembler: PackageAssembler,
        manifest: DigestManifest,
        metadata: DocumentMetadata,
    ) -> Self {
        Self {
            assembler,
            manifest,
            metadata,
        }
    }

    pub fn id(&self) -> Uuid {
        self.assembler.info().id
    }

    pub fn info(&self) -> &PackageInfo {
        self.assembler.info()
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// Pass-1 manifest.
    pub fn manifest(&self) -> &DigestManifest {
        &self.manifest
    }

    /// Exact bytes of `PaketOzeti.xml` as stored in the package.
    pub fn manifest_bytes(&self) -> &[u8] {
        self.assembler
            .part(PACKAGE_SUMMARY_PATH)
            .map(|part| part.data())
            .unwrap_or_default()
    }

    /// Digest handed to the signer agent: SHA-256 of the stored
    /// `PaketOzeti.xml` bytes.
    pub fn signing_digest(&self) -> Digest {
        self.assembler
            .part(PACKAGE_SUMMARY_PATH)
            .map(|part| part.digest())
            .unwrap_or_else(|| Digest::of(self.manifest_bytes()))
    }

    /// Storage key of the package, `{year}/{document number}.eyp`.
    pub fn storage_key(&self) -> String {
        storage_key(self.metadata.reference_date.year(), &self.metadata.document_number)
    }

    /// Serialize the unsigned package.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.assembler.seal()
    }

    /// Embed a signature and seal the package.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] for an empty signature, or any
    /// structural error from the final serialization.
    pub fn seal(self, record: SignatureRecord) -> Result<SealedPackage> {
        if record.signature.is_empty() {
            return Err(Error::MalformedResponse("Signature is empty".into()));
        }

        let mut assembler = self.assembler;
        assembler.add_part(SIGNATURE_PATH, SIGNATURE_MIME, record.signature.clone())?;
        assembler.add_relationship(RelationshipSource::Root, SIGNATURE_PATH, REL_SIGNATURE);

        let signature_info = record.info().to_xml();
        assembler.add_part(SIGNATURE_INFO_PATH, XML_MIME, signature_info.into_bytes())?;
        assembler.add_relationship(RelationshipSource::Root, SIGNATURE_INFO_PATH, REL_SIGNATURE_INFO);

        let final_manifest = summarize(&assembler, ManifestKind::FinalSummary);
        assembler.add_part(
            FINAL_SUMMARY_PATH,
            FINAL_SUMMARY_MIME,
            final_manifest.to_xml().into_bytes(),
        )?;
        assembler.add_relationship(RelationshipSource::Root, FINAL_SUMMARY_PATH, REL_FINAL_SUMMARY);

        let bytes = assembler.seal()?;
        info!(
            package = %assembler.info().id,
            entries = final_manifest.entries.len(),
            size = bytes.len(),
            "package signed and sealed"
        );

        Ok(SealedPackage {
            info: assembler.info().clone(),
            package_manifest: self.manifest,
            final_manifest,
            metadata: self.metadata,
            signature: record,
            bytes,
        })
    }
}

/// Signed, finished package.
#[derive(Debug, Clone)]
pub struct SealedPackage {
    info: PackageInfo,
    package_manifest: DigestManifest,
    final_manifest: DigestManifest,
    metadata: DocumentMetadata,
    signature: SignatureRecord,
    bytes: Vec<u8>,
}

impl SealedPackage {
    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub fn info(&self) -> &PackageInfo {
        &self.info
    }

    /// Pass-1 manifest, as signed.
    pub fn package_manifest(&self) -> &DigestManifest {
        &self.package_manifest
    }

    /// Pass-2 manifest.
    pub fn final_manifest(&self) -> &DigestManifest {
        &self.final_manifest
    }

    pub fn signature(&self) -> &SignatureRecord {
        &self.signature
    }

    /// Archive bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn storage_key(&self) -> String {
        storage_key(self.metadata.reference_date.year(), &self.metadata.document_number)
    }

    /// Hand the package to a store under its storage key.
    pub fn store(&self, store: &impl PackageStore) -> Result<String> {
        let key = self.storage_key();
        store.put(&key, &self.bytes)?;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PackageBuilder;
    use crate::xml::{Entity, Target, TargetPurpose};
    use chrono::{NaiveDate, TimeZone};

    fn unsigned() -> UnsignedPackage {
        PackageBuilder::new()
            .info(PackageInfo::new(
                Uuid::nil(),
                Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap(),
            ))
            .primary_document("ust_yazi.pdf", "application/pdf", b"%PDF-1.7".to_vec())
            .metadata(DocumentMetadata {
                subject: "Test".into(),
                reference_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                document_number: "2024/17".into(),
                originator: Entity {
                    id: "SEN-001".into(),
                    name: "Sendika".into(),
                },
                targets: vec![Target::new("K-1", "Kurum", TargetPurpose::Action)],
                signers: Vec::new(),
            })
            .build()
            .unwrap()
    }

    fn record(signature: &[u8]) -> SignatureRecord {
        SignatureRecord {
            signers: Vec::new(),
            signed_at: Utc.with_ymd_and_hms(2024, 3, 15, 9, 31, 0).unwrap(),
            signature: signature.to_vec(),
        }
    }

    #[test]
    fn test_signing_digest_covers_stored_manifest() {
        let package = unsigned();
        assert_eq!(package.manifest_bytes(), package.manifest().to_xml().as_bytes());
        assert_eq!(package.signing_digest(), Digest::of(package.manifest_bytes()));
    }

    #[test]
    fn test_final_manifest_is_superset() {
        let package = unsigned();
        let pass1 = package.manifest().clone();
        let summary_digest = package.signing_digest();
        let sealed = package.seal(record(b"signature")).unwrap();
        let pass2 = sealed.final_manifest();

        assert_eq!(&pass2.entries[..pass1.entries.len()], &pass1.entries[..]);
        let tail: Vec<_> = pass2.entries[pass1.entries.len()..]
            .iter()
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(tail, vec![PACKAGE_SUMMARY_PATH, SIGNATURE_PATH, SIGNATURE_INFO_PATH]);
        assert_eq!(pass2.entry(PACKAGE_SUMMARY_PATH).unwrap().digest, summary_digest);
        assert_eq!(
            pass2.entry(SIGNATURE_PATH).unwrap().digest,
            Digest::of(b"signature")
        );
    }

    #[test]
    fn test_signers_written_to_sealed_package() {
        let signer = Signer {
            given_name: "Ayse".into(),
            surname: "Yilmaz".into(),
            title: "Genel Sekreter".into(),
            capacity: "Genel Baskan adina".into(),
        };
        let mut record = record(b"signature");
        record.signers = vec![signer.clone()];

        let sealed = unsigned().seal(record.clone()).unwrap();
        let reader = crate::package::PackageReader::from_bytes(sealed.bytes()).unwrap();
        let info = SignatureInfo::from_xml(&reader.text(SIGNATURE_INFO_PATH).unwrap()).unwrap();

        assert_eq!(info.signers, vec![signer]);
        assert_eq!(info.signed_at, record.signed_at);
        assert_eq!(
            sealed.final_manifest().entry(SIGNATURE_INFO_PATH).unwrap().digest,
            Digest::of(reader.entry(SIGNATURE_INFO_PATH).unwrap())
        );
    }

    #[test]
    fn test_sealed_package_has_only_root_relationships() {
        let sealed = unsigned().seal(record(b"signature")).unwrap();
        let reader = crate::package::PackageReader::from_bytes(sealed.bytes()).unwrap();
        let rels: Vec<_> = reader.entry_names().filter(|n| n.ends_with(".rels")).collect();
        assert_eq!(rels, vec!["_rels/.rels"]);
    }

    #[test]
    fn test_empty_signature_rejected() {
        let result = unsigned().seal(record(b""));
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(unsigned().storage_key(), "2024/2024_17.eyp");
    }

    #[test]
    fn test_unsigned_has_no_signature_part() {
        let bytes = unsigned().to_bytes().unwrap();
        let reader = crate::package::PackageReader::from_bytes(&bytes).unwrap();
        assert!(reader.entry(SIGNATURE_PATH).is_none());
        assert!(reader.entry(PACKAGE_SUMMARY_PATH).is_some());
    }
}
