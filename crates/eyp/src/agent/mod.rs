//! Remote signing through the local signer agent.
//!
//! The agent is a separate process on the loopback interface holding the
//! signing key material. Requests are authorized with a short-lived
//! HMAC session token (see [`token`]).
//!
//! # Example
//!
//! ```no_run
//! use eyp::agent::{sign_package, SignerAgentClient};
//! use eyp::{AgentConfig, UnsignedPackage};
//!
//! # async fn run(unsigned: UnsignedPackage) -> eyp::Result<()> {
//! let client = SignerAgentClient::new(AgentConfig::from_env()?)?;
//! let sealed = sign_package(&unsigned, &client, "Aidat bildirimi", Vec::new()).await?;
//! std::fs::write("paket.eyp", sealed.bytes())?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod token;

pub use client::SignerAgentClient;
pub use token::{SessionToken, TokenClaims, TokenIssuer};

use crate::signature::{SealedPackage, SignatureRecord, UnsignedPackage};
use crate::xml::Signer;
use crate::{Error, Result};
use tracing::info;

/// Probe the agent, sign the package summary and seal.
///
/// `signers` end up in the sealed package's `ImzaBilgisi.xml`. The unsigned
/// package is left untouched, so on a signing error the call can simply be
/// repeated.
pub async fn sign_package(
    unsigned: &UnsignedPackage,
    client: &SignerAgentClient,
    description: &str,
    signers: Vec<Signer>,
) -> Result<SealedPackage> {
    if !client.probe().await {
        return Err(Error::AgentUnreachable(format!(
            "no answer at {}",
            client.config().base_url()
        )));
    }

    info!(package = %unsigned.id(), "requesting signature");
    let signature = client.sign(&unsigned.signing_digest(), description).await?;
    unsigned
        .clone()
        .seal(SignatureRecord::new(signature, signers))
}
