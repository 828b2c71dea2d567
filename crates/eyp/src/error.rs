//! Error types for EYP package operations.
//!
//! This module defines the [`enum@Error`] enum covering every failure case
//! in package assembly, signing through the local agent, session token
//! handling and package verification.
//!
//! Failures fall into three families:
//!
//! | Family | Variants | Effect |
//! |--------|----------|--------|
//! | Assembly | `InvalidPartPath`, `DuplicatePart`, `DanglingRelationship`, `UnreachablePart` | No package is produced |
//! | Signing | `AgentUnreachable`, `AgentRejected`, `MalformedResponse`, `TokenExpired` | Unsigned package stays intact, caller may retry |
//! | Verification | `DigestMismatch` | Package must not be trusted |
//!
//! # See Also
//!
//! - [`crate::Result`] - Convenience type alias using this error

use thiserror::Error;

/// Error type for EYP operations.
///
/// All public functions in this crate return [`crate::Result<T>`], which uses this error type.
/// Match on variants to handle specific failure cases.
///
/// # Examples
///
/// ```no_run
/// use eyp::{Error, PackageAssembler};
///
/// let mut assembler = PackageAssembler::new();
/// match assembler.add_part("../escape.pdf", "application/pdf", b"%PDF".to_vec()) {
///     Ok(()) => println!("added"),
///     Err(Error::InvalidPartPath(path)) => eprintln!("rejected path: {path}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// Part path is empty, absolute or contains a traversal segment.
    #[error("Invalid part path: {0}")]
    InvalidPartPath(String),

    /// A part with the same path was already added to the package.
    #[error("Duplicate part: {0}")]
    DuplicatePart(String),

    /// A relationship points at (or starts from) a part that does not exist.
    #[error("Relationship {id} references missing part {target}")]
    DanglingRelationship {
        /// Relationship identifier within its source
        id: String,
        /// Path that could not be resolved
        target: String,
    },

    /// A part cannot be reached from the package root.
    #[error("Part is not reachable from the package root: {0}")]
    UnreachablePart(String),

    /// The signer agent could not be contacted.
    ///
    /// Covers refused connections and timeouts; the agent is most likely
    /// not running on this machine.
    #[error("Signer agent is offline or unreachable: {0}")]
    AgentUnreachable(String),

    /// The signer agent answered with a non-success status.
    #[error("Signer agent rejected the request ({status}): {message}")]
    AgentRejected {
        /// HTTP status code returned by the agent
        status: u16,
        /// Message extracted from the agent's error body
        message: String,
    },

    /// The signer agent answered 2xx but without a usable signature.
    #[error("Signer agent returned a malformed response: {0}")]
    MalformedResponse(String),

    /// Session token expiry lies in the past.
    #[error("Session token expired")]
    TokenExpired,

    /// Session token not-before lies in the future.
    #[error("Session token is not valid yet")]
    TokenNotYetValid,

    /// Session token is structurally invalid or its HMAC does not match.
    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    /// A stored digest does not match the recomputed digest of a part.
    #[error("Digest mismatch for {path}: manifest has {expected}, content hashes to {actual}")]
    DigestMismatch {
        /// Part whose content diverged
        path: String,
        /// Digest recorded in the package
        expected: String,
        /// Digest recomputed from the stored bytes
        actual: String,
    },

    /// An opened archive is missing required structure.
    #[error("Malformed package: {0}")]
    MalformedPackage(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive operation failed.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing failed while reading a package part.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Error {
    /// Whether this error came from the signing round-trip.
    ///
    /// Signing errors never touch the unsigned package, so the same
    /// [`crate::UnsignedPackage`] can be signed again.
    pub fn is_signing_error(&self) -> bool {
        matches!(
            self,
            Error::AgentUnreachable(_)
                | Error::AgentRejected { .. }
                | Error::MalformedResponse(_)
                | Error::TokenExpired
                | Error::TokenNotYetValid
                | Error::InvalidToken(_)
        )
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(quick_xml::Error::from(e))
    }
}
