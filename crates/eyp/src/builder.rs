//! EYP package builder.
//!
//! Turns a rendered primary document plus its metadata into an
//! [`UnsignedPackage`]: primary part, `Ustveri.xml`, `BelgeHedef.xml`,
//! attachments and the pass-1 digest manifest `PaketOzeti.xml`.

use crate::config::PackageOptions;
use crate::digest::SHA256_ALGORITHM_URI;
use crate::package::relationships::{
    REL_ATTACHMENT, REL_METADATA, REL_PACKAGE_SUMMARY, REL_PRIMARY, REL_TARGETS,
};
use crate::package::{CompressionLevel, PackageAssembler, PackageInfo, RelationshipSource};
use crate::signature::UnsignedPackage;
use crate::xml::{
    DigestManifest, DocumentMetadata, ManifestEntry, ManifestKind, PartDescriptor, TargetList,
    UstveriDocument,
};
use crate::{Error, Result};
use tracing::{debug, info};

/// Folder of the primary document.
pub const PRIMARY_FOLDER: &str = "UstYazi";
/// Folder of attachments, original file names preserved.
pub const ATTACHMENT_FOLDER: &str = "Ekler";
pub const METADATA_PATH: &str = "Ustveri/Ustveri.xml";
pub const TARGETS_PATH: &str = "BelgeHedef/BelgeHedef.xml";
pub const PACKAGE_SUMMARY_PATH: &str = "PaketOzeti/PaketOzeti.xml";
pub const SIGNATURE_PATH: &str = "ImzaCades/ImzaCades.imz";
pub const SIGNATURE_INFO_PATH: &str = "ImzaCades/ImzaBilgisi.xml";
pub const FINAL_SUMMARY_PATH: &str = "NihaiOzet/NihaiOzet.xml";

pub const XML_MIME: &str = "application/xml";
pub const PACKAGE_SUMMARY_MIME: &str = "application/vnd.eyp.paketozeti+xml";
pub const FINAL_SUMMARY_MIME: &str = "application/vnd.eyp.nihaiozet+xml";
pub const SIGNATURE_MIME: &str = "application/pkcs7-signature";

/// A file carried alongside the primary document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Original file name, kept as the part name
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// Builder for unsigned packages.
///
/// # Example
///
/// ```no_run
/// use eyp::{DocumentMetadata, PackageBuilder};
///
/// # fn metadata() -> DocumentMetadata { unimplemented!() }
/// let unsigned = PackageBuilder::new()
///     .primary_document("ust_yazi.pdf", "application/pdf", std::fs::read("ust_yazi.pdf")?)
///     .metadata(metadata())
///     .compression_level(9)
///     .build()?;
/// println!("sign {}", unsigned.signing_digest());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    info: Option<PackageInfo>,
    options: PackageOptions,
    primary: Option<Attachment>,
    metadata: Option<DocumentMetadata>,
    attachments: Vec<Attachment>,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self {
            info: None,
            options: PackageOptions::default(),
            primary: None,
            metadata: None,
            attachments: Vec::new(),
        }
    }

    /// Fix the package identifier and creation time.
    ///
    /// Two builds with the same info and inputs produce identical bytes.
    /// Without it, a fresh identifier and the current time are used.
    pub fn info(mut self, info: PackageInfo) -> Self {
        self.info = Some(info);
        self
    }

    pub fn options(mut self, options: PackageOptions) -> Self {
        self.options = options;
        self
    }

    /// Set ZIP compression level (0-9).
    ///
    /// 0 = no compression (fastest), 9 = maximum compression (smallest).
    /// Default is 6 (balanced).
    pub fn compression_level(mut self, level: u32) -> Self {
        self.options.compression_level = CompressionLevel::new(level);
        self
    }

    /// Set the rendered primary document.
    pub fn primary_document(
        mut self,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.primary = Some(Attachment::new(file_name, mime_type, data));
        self
    }

    pub fn metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add an attachment. Attachments keep the order they are added in.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Assemble the unsigned package.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The primary document or metadata is missing, or there are no targets
    /// - A file name is empty or contains a path separator
    /// - Two attachments share a file name
    pub fn build(self) -> Result<UnsignedPackage> {
        let primary = self
            .primary
            .ok_or_else(|| Error::Config("Primary document is required".into()))?;
        let metadata = self
            .metadata
            .ok_or_else(|| Error::Config("Document metadata is required".into()))?;
        let targets = TargetList::new(metadata.targets.clone())?;

        let mut info = self.info.unwrap_or_else(PackageInfo::generate);
        info.content_type = self.options.content_type.clone();

        let mut assembler =
            PackageAssembler::with_info(info.clone()).compression_level(self.options.compression_level);

        let primary_path = folder_path(PRIMARY_FOLDER, &primary.file_name)?;
        let primary_descriptor =
            PartDescriptor::describe(&primary.file_name, &primary.mime_type, &primary.data);
        assembler.add_part(&primary_path, &primary.mime_type, primary.data)?;
        assembler.add_relationship(RelationshipSource::Root, &primary_path, REL_PRIMARY);

        let attachment_descriptors: Vec<PartDescriptor> = self
            .attachments
            .iter()
            .map(|a| PartDescriptor::describe(&a.file_name, &a.mime_type, &a.data))
            .collect();

        let ustveri = UstveriDocument {
            package_id: info.id,
            created_at: info.created_at,
            metadata: &metadata,
            primary: &primary_descriptor,
            attachments: &attachment_descriptors,
        }
        .to_xml();
        assembler.add_part(METADATA_PATH, XML_MIME, ustveri.into_bytes())?;
        assembler.add_relationship(RelationshipSource::Root, METADATA_PATH, REL_METADATA);

        assembler.add_part(TARGETS_PATH, XML_MIME, targets.to_xml().into_bytes())?;
        assembler.add_relationship(RelationshipSource::Root, TARGETS_PATH, REL_TARGETS);

        for attachment in self.attachments {
            let path = folder_path(ATTACHMENT_FOLDER, &attachment.file_name)?;
            assembler.add_part(&path, &attachment.mime_type, attachment.data)?;
            assembler.add_relationship(RelationshipSource::Root, &path, REL_ATTACHMENT);
        }

        let manifest = summarize(&assembler, ManifestKind::PackageSummary);
        let manifest_xml = manifest.to_xml();
        debug!(entries = manifest.entries.len(), "package summary generated");

        assembler.add_part(
            PACKAGE_SUMMARY_PATH,
            PACKAGE_SUMMARY_MIME,
            manifest_xml.into_bytes(),
        )?;
        assembler.add_relationship(RelationshipSource::Root, PACKAGE_SUMMARY_PATH, REL_PACKAGE_SUMMARY);
        assembler.validate()?;

        info!(package = %info.id, document = %metadata.document_number, "unsigned package built");
        Ok(UnsignedPackage::new(assembler, manifest, metadata))
    }
}

/// Digest manifest over every part currently in the assembler, in creation
/// order.
pub(crate) fn summarize(assembler: &PackageAssembler, kind: ManifestKind) -> DigestManifest {
    let mut manifest = DigestManifest::new(kind, assembler.info().id.to_string());
    for part in assembler.parts() {
        manifest.push(ManifestEntry {
            path: part.path().to_string(),
            algorithm: SHA256_ALGORITHM_URI.to_string(),
            digest: part.digest(),
        });
    }
    manifest
}

/// `folder/file_name`, rejecting names that would leave the folder.
fn folder_path(folder: &str, file_name: &str) -> Result<String> {
    if file_name.is_empty() || file_name.contains('/') || file_name.contains('\\') {
        return Err(Error::InvalidPartPath(file_name.to_string()));
    }
    Ok(format!("{folder}/{file_name}"))
}
