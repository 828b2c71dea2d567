//! HTTP client for the local signer agent.

use super::token::TokenIssuer;
use crate::config::AgentConfig;
use crate::digest::Digest;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Digest algorithm name sent with signing requests.
pub const SIGN_ALGORITHM: &str = "SHA256";
/// Requested signature format.
pub const SIGN_FORMAT: &str = "CAdES";

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    hash: String,
    description: &'a str,
    alg: &'static str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    code: Option<String>,
}

/// Error code an agent may send with a 401 for an expired session token.
pub const TOKEN_EXPIRED_CODE: &str = "token_expired";

/// Client for a signer agent on the loopback interface.
///
/// Each [`sign`](Self::sign) call mints its own session token. Failures are
/// returned as-is; retrying is up to the caller.
#[derive(Debug, Clone)]
pub struct SignerAgentClient {
    config: AgentConfig,
    issuer: TokenIssuer,
    http: Client,
}

impl SignerAgentClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        // The agent is always on loopback; never route through a proxy
        let http = Client::builder()
            .no_proxy()
            .connect_timeout(config.probe_timeout_duration())
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        let issuer = TokenIssuer::new(config.secret().clone(), config.ttl());
        Ok(Self {
            config,
            issuer,
            http,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    /// Check whether the agent answers on `/health`.
    ///
    /// Never fails; any network error or non-success status yields `false`.
    pub async fn probe(&self) -> bool {
        let result = self
            .http
            .get(self.url("/health"))
            .timeout(self.config.probe_timeout_duration())
            .send()
            .await;

        match result {
            Ok(response) => {
                let ok = response.status().is_success();
                debug!(status = response.status().as_u16(), "signer agent probed");
                ok
            }
            Err(e) => {
                debug!(error = %e, "signer agent probe failed");
                false
            }
        }
    }

    /// Ask the agent to sign a digest.
    ///
    /// `description` may be shown to the signing person for confirmation.
    ///
    /// # Errors
    ///
    /// - [`Error::AgentUnreachable`] if the agent cannot be contacted or times out
    /// - [`Error::TokenExpired`] if the agent answers 401 for an expired token
    /// - [`Error::AgentRejected`] on any other non-2xx response
    /// - [`Error::MalformedResponse`] if the response carries no usable signature
    pub async fn sign(&self, digest: &Digest, description: &str) -> Result<Vec<u8>> {
        let token = self.issuer.issue()?;
        let request = SignRequest {
            hash: digest.to_base64(),
            description,
            alg: SIGN_ALGORITHM,
            format: SIGN_FORMAT,
        };

        info!(digest = %digest, "waiting for signature from signer agent");
        let response = self
            .http
            .post(self.url("/sign"))
            .bearer_auth(token.as_str())
            .timeout(self.config.sign_timeout_duration())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "signer agent request failed");
                if e.is_timeout() {
                    Error::AgentUnreachable(format!(
                        "no signature within {}s",
                        self.config.sign_timeout_duration().as_secs()
                    ))
                } else {
                    Error::AgentUnreachable(format!("cannot connect to {}", self.config.base_url()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = rejection_error(status.as_u16(), &body);
            warn!(status = status.as_u16(), error = %err, "signer agent rejected request");
            return Err(err);
        }

        let body: SignResponse = response
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("invalid JSON body: {e}")))?;
        let encoded = body
            .signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::MalformedResponse("missing signature field".into()))?;
        let signature = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::MalformedResponse(format!("signature is not base64: {e}")))?;

        info!(size = signature.len(), "signature received");
        Ok(signature)
    }
}

/// Map a non-2xx answer to an error.
///
/// A 401 that names an expired token becomes [`Error::TokenExpired`], so the
/// caller knows a fresh request will do. Everything else is
/// [`Error::AgentRejected`].
fn rejection_error(status: u16, body: &str) -> Error {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let message = rejection_message(body, parsed.as_ref());

    let expired = parsed
        .as_ref()
        .and_then(|p| p.code.as_deref())
        .is_some_and(|code| code == TOKEN_EXPIRED_CODE)
        || message.to_lowercase().contains("expired");
    if status == 401 && expired {
        return Error::TokenExpired;
    }
    Error::AgentRejected { status, message }
}

/// Human-readable reason from an agent error body.
fn rejection_message(body: &str, parsed: Option<&ErrorBody>) -> String {
    if let Some(message) = parsed.and_then(|p| p.error.clone().or_else(|| p.message.clone())) {
        return message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no reason given".to_string()
    } else {
        trimmed.to_string()
    }
}
