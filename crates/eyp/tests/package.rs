//! Integration tests for package assembly, sealing and verification.
//!
//! Packages are built with a fixed identifier and creation time so that
//! archive bytes can be compared across builds.

use chrono::{NaiveDate, TimeZone, Utc};
use eyp::package::relationships::{REL_PRIMARY, REL_SIGNATURE, REL_SIGNATURE_INFO};
use eyp::package::{PackageReader, RelationshipSource};
use eyp::verify::PackageState;
use eyp::xml::{DigestManifest, ManifestKind};
use eyp::{
    Attachment, CompressionLevel, Digest, DocumentMetadata, Entity, Error, PackageBuilder,
    PackageInfo, SignatureInfo, SignatureRecord, Target, TargetPurpose,
};
use std::io::{Cursor, Read, Write};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const PRIMARY: &[u8] = b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n";
const SIGNATURE: &[u8] = b"0\x82\x01\x00 fake CAdES blob";

fn metadata() -> DocumentMetadata {
    DocumentMetadata {
        subject: "Test".into(),
        reference_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        document_number: "2024/17".into(),
        originator: Entity {
            id: "SEN-001".into(),
            name: "Sendika Genel Merkezi".into(),
        },
        targets: vec![Target::new("KURUM-9", "Calisma Bakanligi", TargetPurpose::Action)],
        signers: Vec::new(),
    }
}

fn builder() -> PackageBuilder {
    PackageBuilder::new()
        .info(PackageInfo::new(
            Uuid::parse_str("6f1d2c9e-8a43-4b7e-9c0a-2f5d1e3b4a77").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap(),
        ))
        .primary_document("ust_yazi.pdf", "application/pdf", PRIMARY.to_vec())
        .metadata(metadata())
        .attachment(Attachment::new("ek-1.txt", "text/plain", b"birinci ek".to_vec()))
}

fn record() -> SignatureRecord {
    SignatureRecord {
        signers: Vec::new(),
        signed_at: Utc.with_ymd_and_hms(2024, 3, 15, 9, 31, 0).unwrap(),
        signature: SIGNATURE.to_vec(),
    }
}

fn sealed_bytes() -> Vec<u8> {
    builder().build().unwrap().seal(record()).unwrap().into_bytes()
}

/// Copy an archive, replacing the content of one entry.
fn rewrite_entry(bytes: &[u8], name: &str, mutate: impl Fn(&mut Vec<u8>)) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        if file.name() == name {
            mutate(&mut data);
        }
        out.start_file(file.name(), SimpleFileOptions::default()).unwrap();
        out.write_all(&data).unwrap();
    }
    out.finish().unwrap().into_inner()
}

/// Replace the first occurrence of `from` in an entry; both must be the
/// same length so only those bytes change.
fn replace_in_entry(bytes: &[u8], name: &str, from: &str, to: &str) -> Vec<u8> {
    assert_eq!(from.len(), to.len());
    rewrite_entry(bytes, name, |data| {
        let text = String::from_utf8(data.clone()).unwrap();
        assert!(text.contains(from), "{name} does not contain {from}");
        *data = text.replacen(from, to, 1).into_bytes();
    })
}

/// Copy an archive and add one more entry at the end.
fn append_entry(bytes: &[u8], name: &str, content: &[u8]) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        out.start_file(file.name(), SimpleFileOptions::default()).unwrap();
        out.write_all(&data).unwrap();
    }
    out.start_file(name, SimpleFileOptions::default()).unwrap();
    out.write_all(content).unwrap();
    out.finish().unwrap().into_inner()
}

#[test]
fn test_sealed_archive_layout() {
    let bytes = sealed_bytes();
    let reader = PackageReader::from_bytes(&bytes).unwrap();
    let names: Vec<_> = reader.entry_names().collect();

    assert_eq!(
        names,
        vec![
            "[Content_Types].xml",
            "_rels/.rels",
            "UstYazi/ust_yazi.pdf",
            "Ustveri/Ustveri.xml",
            "BelgeHedef/BelgeHedef.xml",
            "Ekler/ek-1.txt",
            "PaketOzeti/PaketOzeti.xml",
            "ImzaCades/ImzaCades.imz",
            "ImzaCades/ImzaBilgisi.xml",
            "NihaiOzet/NihaiOzet.xml",
        ]
    );
    assert_eq!(reader.content_type(), "application/eyp");
    assert_eq!(
        reader
            .find_related(&RelationshipSource::Root, REL_PRIMARY)
            .unwrap()
            .as_deref(),
        Some("UstYazi/ust_yazi.pdf")
    );
    assert_eq!(
        reader
            .find_related(&RelationshipSource::Root, REL_SIGNATURE)
            .unwrap()
            .as_deref(),
        Some("ImzaCades/ImzaCades.imz")
    );
    assert_eq!(
        reader
            .find_related(&RelationshipSource::Root, REL_SIGNATURE_INFO)
            .unwrap()
            .as_deref(),
        Some("ImzaCades/ImzaBilgisi.xml")
    );
}

#[test]
fn test_content_types_override_manifests() {
    let bytes = sealed_bytes();
    let reader = PackageReader::from_bytes(&bytes).unwrap();
    let content_types = reader.text("[Content_Types].xml").unwrap();

    assert!(content_types.contains("PartName=\"/PaketOzeti/PaketOzeti.xml\""));
    assert!(content_types.contains("PartName=\"/NihaiOzet/NihaiOzet.xml\""));
    assert!(!content_types.contains("PartName=\"/Ustveri/Ustveri.xml\""));
    assert!(content_types.contains("Extension=\"pdf\""));
}

#[test]
fn test_end_to_end_manifests() {
    let unsigned = builder().build().unwrap();
    let sealed = unsigned.seal(record()).unwrap();
    let reader = PackageReader::from_bytes(sealed.bytes()).unwrap();

    let pass1 = DigestManifest::from_xml(&reader.text("PaketOzeti/PaketOzeti.xml").unwrap()).unwrap();
    assert_eq!(pass1.kind, ManifestKind::PackageSummary);
    assert_eq!(
        pass1.entry("UstYazi/ust_yazi.pdf").unwrap().digest,
        Digest::of(PRIMARY)
    );
    assert!(pass1.entry("ImzaCades/ImzaCades.imz").is_none());

    let pass2 = DigestManifest::from_xml(&reader.text("NihaiOzet/NihaiOzet.xml").unwrap()).unwrap();
    assert_eq!(pass2.kind, ManifestKind::FinalSummary);
    assert_eq!(
        pass2.entry("ImzaCades/ImzaCades.imz").unwrap().digest,
        Digest::of(SIGNATURE)
    );
    assert_eq!(
        pass2.entry("PaketOzeti/PaketOzeti.xml").unwrap().digest,
        Digest::of(reader.entry("PaketOzeti/PaketOzeti.xml").unwrap())
    );
    for entry in &pass1.entries {
        assert_eq!(pass2.entry(&entry.path), Some(entry));
    }
    assert_eq!(&pass2, sealed.final_manifest());
}

#[test]
fn test_build_is_deterministic() {
    assert_eq!(sealed_bytes(), sealed_bytes());

    let a = builder().build().unwrap();
    let b = builder().build().unwrap();
    assert_eq!(a.manifest_bytes(), b.manifest_bytes());
    assert_eq!(a.signing_digest(), b.signing_digest());
}

#[test]
fn test_round_trip_digests() {
    let bytes = sealed_bytes();
    let report = eyp::verify(&bytes).unwrap();
    assert_eq!(report.state, PackageState::Sealed);
    assert!(report.is_valid());
    assert!(report.mismatched_paths().is_empty());
}

#[test]
fn test_tampered_primary_detected() {
    let bytes = rewrite_entry(&sealed_bytes(), "UstYazi/ust_yazi.pdf", |data| data[0] ^= 0x01);

    let report = eyp::check(&bytes).unwrap();
    assert!(!report.is_valid());
    assert_eq!(report.mismatched_paths(), vec!["UstYazi/ust_yazi.pdf"]);
    assert!(!report.primary.as_ref().unwrap().is_ok());

    let result = eyp::verify(&bytes);
    assert!(matches!(
        result,
        Err(Error::DigestMismatch { path, .. }) if path == "UstYazi/ust_yazi.pdf"
    ));
}

#[test]
fn test_tampered_attachment_detected() {
    let bytes = rewrite_entry(&sealed_bytes(), "Ekler/ek-1.txt", |data| data.push(b'!'));

    let report = eyp::check(&bytes).unwrap();
    assert_eq!(report.mismatched_paths(), vec!["Ekler/ek-1.txt"]);
    assert!(report.primary.as_ref().unwrap().is_ok());
}

#[test]
fn test_tampered_signature_detected() {
    let bytes = rewrite_entry(&sealed_bytes(), "ImzaCades/ImzaCades.imz", |data| {
        let last = data.len() - 1;
        data[last] ^= 0xff;
    });

    let report = eyp::check(&bytes).unwrap();
    assert_eq!(report.mismatched_paths(), vec!["ImzaCades/ImzaCades.imz"]);
}

#[test]
fn test_sealed_package_stored_atomically() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let store = eyp::DirectoryStore::new(temp_dir.path());
    let sealed = builder().build().unwrap().seal(record()).unwrap();

    let key = sealed.store(&store).unwrap();
    assert_eq!(key, "2024/2024_17.eyp");
    let stored = std::fs::read(temp_dir.path().join("2024").join("2024_17.eyp")).unwrap();
    assert_eq!(stored, sealed.bytes());
}

#[test]
fn test_escaped_subject_survives() {
    let mut meta = metadata();
    meta.subject = "Aidat <2024> & \"kesinti\" 'bildirimi'".into();
    let sealed = builder()
        .metadata(meta)
        .build()
        .unwrap()
        .seal(record())
        .unwrap();

    let reader = PackageReader::from_bytes(sealed.bytes()).unwrap();
    let ustveri = reader.text("Ustveri/Ustveri.xml").unwrap();
    assert!(ustveri.contains("Aidat &lt;2024&gt; &amp;"));
    assert!(eyp::verify(sealed.bytes()).is_ok());
}

#[test]
fn test_tampered_metadata_blames_only_metadata() {
    let hex = Digest::of(PRIMARY).to_hex();
    let first = if hex.starts_with('a') { "b" } else { "a" };
    let altered = format!("{first}{}", &hex[1..]);
    let bytes = replace_in_entry(&sealed_bytes(), "Ustveri/Ustveri.xml", &hex, &altered);

    let report = eyp::check(&bytes).unwrap();
    assert_eq!(report.mismatched_paths(), vec!["Ustveri/Ustveri.xml"]);
    assert!(!report.primary.as_ref().unwrap().is_ok());
    assert!(matches!(
        eyp::verify(&bytes),
        Err(Error::DigestMismatch { path, .. }) if path == "Ustveri/Ustveri.xml"
    ));
}

#[test]
fn test_tampered_target_list_detected() {
    let bytes = replace_in_entry(
        &sealed_bytes(),
        "BelgeHedef/BelgeHedef.xml",
        "Calisma Bakanligi",
        "Calisma Bakanlig1",
    );

    let report = eyp::check(&bytes).unwrap();
    assert_eq!(report.mismatched_paths(), vec!["BelgeHedef/BelgeHedef.xml"]);
    assert!(report.primary.as_ref().unwrap().is_ok());
}

#[test]
fn test_tampered_package_summary_detected() {
    let bytes = replace_in_entry(
        &sealed_bytes(),
        "PaketOzeti/PaketOzeti.xml",
        "Id=\"6f1d2c9e",
        "Id=\"6f1d2c9f",
    );

    let report = eyp::check(&bytes).unwrap();
    assert_eq!(report.mismatched_paths(), vec!["PaketOzeti/PaketOzeti.xml"]);
}

#[test]
fn test_final_summary_must_cover_every_part() {
    let bytes = rewrite_entry(&sealed_bytes(), "NihaiOzet/NihaiOzet.xml", |data| {
        let text = String::from_utf8(data.clone()).unwrap();
        let start = text.find("  <Reference URI=\"/UstYazi/ust_yazi.pdf\">").unwrap();
        let end = start + text[start..].find("</Reference>\n").unwrap() + "</Reference>\n".len();
        *data = format!("{}{}", &text[..start], &text[end..]).into_bytes();
    });

    let report = eyp::check(&bytes).unwrap();
    assert_eq!(report.state, PackageState::Sealed);
    assert!(report.mismatched_paths().is_empty());
    assert_eq!(report.uncovered, vec!["UstYazi/ust_yazi.pdf"]);
    assert!(!report.is_valid());
    assert!(matches!(
        eyp::verify(&bytes),
        Err(Error::MalformedPackage(msg)) if msg.contains("UstYazi/ust_yazi.pdf")
    ));
}

#[test]
fn test_unlisted_part_rejected() {
    let bytes = append_entry(&sealed_bytes(), "Ekler/ek-2.exe", b"MZ");

    let report = eyp::check(&bytes).unwrap();
    assert!(report.mismatched_paths().is_empty());
    assert_eq!(report.unlisted, vec!["Ekler/ek-2.exe"]);
    assert!(matches!(
        eyp::verify(&bytes),
        Err(Error::MalformedPackage(msg)) if msg.contains("Ekler/ek-2.exe")
    ));
}

#[test]
fn test_signers_survive_sealing() {
    let signer = eyp::Signer {
        given_name: "Ayse".into(),
        surname: "Yilmaz".into(),
        title: "Genel Baskan".into(),
        capacity: "Sendika adina".into(),
    };
    let mut record = record();
    record.signers = vec![signer.clone()];
    let sealed = builder().build().unwrap().seal(record.clone()).unwrap();

    let reader = PackageReader::from_bytes(sealed.bytes()).unwrap();
    let info = SignatureInfo::from_xml(&reader.text("ImzaCades/ImzaBilgisi.xml").unwrap()).unwrap();
    assert_eq!(info.signers, vec![signer.clone()]);
    assert_eq!(info.signed_at, record.signed_at);

    let report = eyp::verify(sealed.bytes()).unwrap();
    assert_eq!(report.signature_info.unwrap().signers, vec![signer]);
}

#[test]
fn test_signing_digest_independent_of_compression() {
    let stored = builder().compression_level(0).build().unwrap();
    let deflated = builder().compression_level(9).build().unwrap();

    assert_eq!(stored.signing_digest(), deflated.signing_digest());
    assert_ne!(stored.to_bytes().unwrap(), deflated.to_bytes().unwrap());
    assert_eq!(CompressionLevel::new(9), CompressionLevel::MAX);
}
