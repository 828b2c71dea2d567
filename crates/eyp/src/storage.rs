//! Handing sealed packages to storage.
//!
//! Object storage itself lives outside this crate; [`PackageStore`] is the
//! seam. [`DirectoryStore`] keeps packages on a local file system and is
//! what the CLI uses.

use crate::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Storage key for a package: `{year}/{sanitized document number}.eyp`.
///
/// Characters other than ASCII alphanumerics, `-` and `_` become `_`, so
/// registry numbers like `2024/17` cannot introduce extra path segments.
pub fn storage_key(year: i32, document_number: &str) -> String {
    let mut sanitized: String = document_number
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        sanitized.push('_');
    }
    format!("{year}/{sanitized}.eyp")
}

/// Destination for sealed package bytes.
pub trait PackageStore {
    /// Store `bytes` under `key`, replacing any previous value.
    ///
    /// Implementations must not expose partially written packages.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Stores packages as files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// File path for a key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

impl PackageStore for DirectoryStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        // Write next to the target, then rename into place
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;

        debug!(path = %path.display(), size = bytes.len(), "package stored");
        Ok(())
    }
}
