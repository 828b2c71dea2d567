pub mod agent;
pub mod builder;
pub mod config;
pub mod digest;
pub mod error;
pub mod package;
pub mod signature;
pub mod storage;
pub mod verify;
pub mod xml;

pub use agent::{sign_package, SessionToken, SignerAgentClient, TokenIssuer};
pub use builder::{Attachment, PackageBuilder};
pub use config::{AgentConfig, PackageOptions};
pub use digest::{sha256, Digest};
pub use error::Error;
pub use package::{CompressionLevel, PackageAssembler, PackageInfo, PackageReader};
pub use signature::{SealedPackage, SignatureRecord, UnsignedPackage};
pub use storage::{storage_key, DirectoryStore, PackageStore};
pub use verify::{check, verify, PackageState, VerificationReport};
pub use xml::{DocumentMetadata, Entity, SignatureInfo, Signer, Target, TargetPurpose};

pub type Result<T> = std::result::Result<T, Error>;
