//! Reading packages back.
//!
//! Loads every entry of an `.eyp` archive into memory and resolves parts
//! through the relationship graph. Used by verification and by the CLI.

use super::content_types::CONTENT_TYPES_PATH;
use super::relationships::{parse_relationships, rels_path, RelationshipEntry};
use super::RelationshipSource;
use crate::config::DEFAULT_MAX_PART_SIZE;
use crate::{Error, Result};
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

/// An opened package, entries kept in archive order.
#[derive(Debug, Clone)]
pub struct PackageReader {
    entries: Vec<(String, Vec<u8>)>,
    comment: String,
}

impl PackageReader {
    /// Open package bytes, accepting parts up to [`DEFAULT_MAX_PART_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPackage`] if the bytes do not start like a
    /// ZIP archive, an entry name escapes the archive root, a part
    /// decompresses past the size limit or the content-type manifest is
    /// missing, and [`Error::Zip`] if the archive itself is corrupt.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_limit(bytes, DEFAULT_MAX_PART_SIZE)
    }

    /// Open package bytes with an explicit per-part size limit.
    ///
    /// Sizes declared in the archive headers are not trusted; each entry is
    /// read through a limit and rejected once it exceeds `max_part_size`.
    pub fn from_bytes_with_limit(bytes: &[u8], max_part_size: u64) -> Result<Self> {
        // ZIP magic: PK\x03\x04
        if bytes.len() < 4 || &bytes[0..2] != b"PK" {
            return Err(Error::MalformedPackage("Not a valid ZIP/EYP file".into()));
        }

        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(Error::Zip)?;
        let comment = String::from_utf8_lossy(archive.comment()).into_owned();

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index(i).map_err(Error::Zip)?;
            if file.is_dir() {
                continue;
            }
            if file.enclosed_name().is_none() {
                return Err(Error::MalformedPackage(format!(
                    "Unsafe entry name: {}",
                    file.name()
                )));
            }
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.take(max_part_size.saturating_add(1)).read_to_end(&mut data)?;
            if data.len() as u64 > max_part_size {
                return Err(Error::MalformedPackage(format!(
                    "Part {name} exceeds {max_part_size} bytes"
                )));
            }
            entries.push((name, data));
        }

        let reader = Self { entries, comment };
        if reader.entry(CONTENT_TYPES_PATH).is_none() {
            return Err(Error::MalformedPackage(format!("Missing {CONTENT_TYPES_PATH}")));
        }
        Ok(reader)
    }

    /// Open a package file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Package file not found: {}", path.display()),
            )));
        }
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    /// Bytes of an entry.
    pub fn entry(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    /// Entry names in archive order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Container-level content type from the archive comment.
    pub fn content_type(&self) -> &str {
        &self.comment
    }

    /// Relationships declared by a source; empty if it has no `.rels` file.
    pub fn relationships(&self, source: &RelationshipSource) -> Result<Vec<RelationshipEntry>> {
        match self.entry(&rels_path(source)) {
            Some(data) => parse_relationships(&String::from_utf8_lossy(data)),
            None => Ok(Vec::new()),
        }
    }

    /// Path of the first part a source relates to with the given type.
    pub fn find_related(&self, source: &RelationshipSource, relation_type: &str) -> Result<Option<String>> {
        Ok(self
            .relationships(source)?
            .into_iter()
            .find(|r| r.relation_type == relation_type)
            .map(|r| r.target))
    }

    /// Part bytes as UTF-8 text.
    pub fn text(&self, name: &str) -> Result<String> {
        let data = self
            .entry(name)
            .ok_or_else(|| Error::MalformedPackage(format!("Missing part {name}")))?;
        String::from_utf8(data.to_vec())
            .map_err(|_| Error::MalformedPackage(format!("Part {name} is not UTF-8")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::relationships::REL_PRIMARY;
    use crate::package::{PackageAssembler, PackageInfo};
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn sample() -> Vec<u8> {
        let mut assembler = PackageAssembler::with_info(PackageInfo::generate());
        assembler
            .add_part("UstYazi/belge.pdf", "application/pdf", b"%PDF".to_vec())
            .unwrap();
        assembler.add_relationship(RelationshipSource::Root, "UstYazi/belge.pdf", REL_PRIMARY);
        assembler.seal().unwrap()
    }

    #[test]
    fn test_reads_sealed_package() {
        let reader = PackageReader::from_bytes(&sample()).unwrap();
        let names: Vec<_> = reader.entry_names().collect();
        assert_eq!(names, vec!["[Content_Types].xml", "_rels/.rels", "UstYazi/belge.pdf"]);
        assert_eq!(reader.entry("UstYazi/belge.pdf"), Some(b"%PDF".as_slice()));
        assert_eq!(reader.content_type(), "application/eyp");
        assert_eq!(
            reader
                .find_related(&RelationshipSource::Root, REL_PRIMARY)
                .unwrap()
                .as_deref(),
            Some("UstYazi/belge.pdf")
        );
    }

    #[test]
    fn test_open_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("paket.eyp");
        fs::write(&path, sample()).unwrap();
        assert!(PackageReader::open(&path).is_ok());
    }

    #[test]
    fn test_open_not_found() {
        assert!(matches!(
            PackageReader::open("/nonexistent/paket.eyp"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_rejects_non_zip() {
        assert!(matches!(
            PackageReader::from_bytes(b"not a zip file"),
            Err(Error::MalformedPackage(_))
        ));
    }

    #[test]
    fn test_part_size_limit() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(CONTENT_TYPES_PATH, SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.start_file("UstYazi/belge.pdf", SimpleFileOptions::default()).unwrap();
        zip.write_all(&[0u8; 2048]).unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        assert!(matches!(
            PackageReader::from_bytes_with_limit(&bytes, 1024),
            Err(Error::MalformedPackage(msg)) if msg.contains("UstYazi/belge.pdf")
        ));
        let reader = PackageReader::from_bytes_with_limit(&bytes, 2048).unwrap();
        assert_eq!(reader.entry("UstYazi/belge.pdf").unwrap().len(), 2048);
    }

    #[test]
    fn test_rejects_plain_zip_without_manifest() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("a.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"x").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        assert!(matches!(
            PackageReader::from_bytes(&bytes),
            Err(Error::MalformedPackage(_))
        ));
    }
}
