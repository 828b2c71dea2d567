//! Session tokens for the signer agent.
//!
//! A token is `base64url(payload).base64url(tag)` where the payload is the
//! JSON object `{"nbf":…,"nonce":…,"exp":…}` with keys in exactly that order
//! and the tag is HMAC-SHA256 over the payload bytes. The agent recomputes
//! the tag over the payload as received, so the serialized field order is
//! part of the wire contract.

use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Random bytes per nonce.
const NONCE_LEN: usize = 16;

/// Signed fields of a token. Field order is the serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Not-before, unix seconds
    pub nbf: i64,
    /// Hex-encoded random nonce
    pub nonce: String,
    /// Expiry, unix seconds
    pub exp: i64,
}

/// An issued token.
///
/// `Debug` does not print the encoded form.
#[derive(Clone)]
pub struct SessionToken {
    claims: TokenClaims,
    encoded: String,
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

impl SessionToken {
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// Wire form, for the `Authorization: Bearer` header.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Check a token's tag and validity window.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidToken`] if the token is malformed or the tag does not match
    /// - [`Error::TokenExpired`] if `exp` lies before `now`
    /// - [`Error::TokenNotYetValid`] if `nbf` lies after `now`
    pub fn verify(token: &str, secret: &SecretString, now: DateTime<Utc>) -> Result<TokenClaims> {
        let (payload_b64, tag_b64) = token
            .split_once('.')
            .ok_or_else(|| Error::InvalidToken("missing separator".into()))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| Error::InvalidToken(format!("payload: {e}")))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|e| Error::InvalidToken(format!("tag: {e}")))?;

        let mut mac = new_mac(secret)?;
        mac.update(&payload);
        mac.verify_slice(&tag)
            .map_err(|_| Error::InvalidToken("tag mismatch".into()))?;

        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|e| Error::InvalidToken(format!("payload: {e}")))?;

        let now = now.timestamp();
        if claims.exp < now {
            return Err(Error::TokenExpired);
        }
        if claims.nbf > now {
            return Err(Error::TokenNotYetValid);
        }
        Ok(claims)
    }
}

/// Mints tokens with a shared secret and fixed lifetime.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    secret: SecretString,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: SecretString, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    /// Issue a token valid from now.
    pub fn issue(&self) -> Result<SessionToken> {
        self.issue_at(Utc::now())
    }

    /// Issue a token valid from `now` until `now + ttl`.
    pub fn issue_at(&self, now: DateTime<Utc>) -> Result<SessionToken> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let nbf = now.timestamp();
        let ttl = i64::try_from(self.ttl.as_secs())
            .map_err(|_| Error::Config("Token TTL out of range".into()))?;
        let claims = TokenClaims {
            nbf,
            nonce: hex::encode(nonce),
            exp: nbf + ttl,
        };
        self.sign(claims)
    }

    fn sign(&self, claims: TokenClaims) -> Result<SessionToken> {
        let payload = serde_json::to_vec(&claims)
            .map_err(|e| Error::InvalidToken(format!("payload: {e}")))?;

        let mut mac = new_mac(&self.secret)?;
        mac.update(&payload);
        let tag = mac.finalize().into_bytes();

        let encoded = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        );
        Ok(SessionToken { claims, encoded })
    }
}

fn new_mac(secret: &SecretString) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| Error::InvalidToken(e.to_string()))
}
