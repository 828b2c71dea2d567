//! SHA-256 digests of part content.
//!
//! Digests are always taken over the exact bytes that end up in the archive.
//! XML parts are serialized first and the serialized form is hashed, so a
//! digest recomputed from a re-opened package matches the stored value.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest as _, Sha256};
use std::fmt;

/// Algorithm URI written next to every SHA-256 digest in manifest XML.
pub const SHA256_ALGORITHM_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// A SHA-256 digest value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Hash a byte slice.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();

        let mut out = [0u8; 32];
        out.copy_from_slice(&result);
        Digest(out)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hexadecimal form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Standard base64 form (with padding).
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Parse a lowercase or uppercase hex digest.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s.trim()).ok()?;
        Self::from_slice(&bytes)
    }

    /// Parse a base64 digest.
    pub fn from_base64(s: &str) -> Option<Self> {
        let bytes = STANDARD.decode(s.trim()).ok()?;
        Self::from_slice(&bytes)
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Digest(arr))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash a byte slice with SHA-256.
pub fn sha256(data: &[u8]) -> Digest {
    Digest::of(data)
}
