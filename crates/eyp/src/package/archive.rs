//! ZIP serialization of a sealed package.
//!
//! Entries are written in the order given, all stamped with the package
//! creation time and fixed permissions, so the same entries always produce
//! byte-identical archives. The archive comment carries the container-level
//! content type.
//!
//! For the reverse operation, see the [`reader`](super::reader) module.

use super::PackageInfo;
use crate::{Error, Result};
use chrono::{Datelike, Timelike};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Deflate level applied to every entry of a `.eyp` archive.
///
/// Level 0 stores entries as-is. The level only changes archive size: part
/// bytes, and so every manifest digest and the signed `PaketOzeti.xml`, are
/// the same at any level. Two builds compare byte-for-byte only when they
/// use the same level.
///
/// ```
/// use eyp::package::CompressionLevel;
///
/// assert_eq!(CompressionLevel::new(15), CompressionLevel::MAX);
/// assert_eq!(CompressionLevel::default().level(), 6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    /// Stored entries.
    pub const NONE: CompressionLevel = CompressionLevel(0);

    /// Level used by [`PackageBuilder`](crate::PackageBuilder) unless told otherwise.
    pub const DEFAULT: CompressionLevel = CompressionLevel(6);

    pub const MAX: CompressionLevel = CompressionLevel(9);

    /// Level 0-9; anything above 9 becomes 9.
    #[must_use]
    pub fn new(level: u32) -> Self {
        CompressionLevel(level.min(9))
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u32> for CompressionLevel {
    fn from(level: u32) -> Self {
        CompressionLevel::new(level)
    }
}

/// ZIP timestamp for the package creation time.
///
/// ZIP cannot represent dates before 1980; those fall back to the format's
/// epoch.
fn entry_time(info: &PackageInfo) -> DateTime {
    let t = info.created_at;
    let year = u16::try_from(t.year()).unwrap_or(0);
    DateTime::from_date_and_time(
        year,
        t.month() as u8,
        t.day() as u8,
        t.hour() as u8,
        t.minute() as u8,
        t.second() as u8,
    )
    .unwrap_or_default()
}

/// Write entries into an in-memory ZIP archive.
///
/// # Errors
///
/// Returns [`Error::Zip`] if the archive cannot be written.
pub fn write_archive(
    entries: &[(String, &[u8])],
    info: &PackageInfo,
    compression_level: CompressionLevel,
) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let options = if compression_level.level() == 0 {
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
    } else {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level.level() as i64))
    }
    .last_modified_time(entry_time(info))
    .unix_permissions(0o644);

    for (name, data) in entries {
        zip.start_file(name.as_str(), options).map_err(Error::Zip)?;
        zip.write_all(data)?;
    }

    zip.set_comment(info.content_type.clone());
    let cursor = zip.finish().map_err(Error::Zip)?;
    Ok(cursor.into_inner())
}
