//! Configuration for package creation and the signer agent.

use crate::package::{CompressionLevel, EYP_CONTENT_TYPE};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::env;
use std::net::IpAddr;
use std::time::Duration;

/// Default loopback port of the signer agent.
pub const DEFAULT_AGENT_PORT: u16 = 8099;

/// Default session token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Default timeout of the reachability probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout of a signing request. Signing may wait for a human to
/// confirm on the agent side.
pub const DEFAULT_SIGN_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest decompressed part accepted when opening a package.
pub const DEFAULT_MAX_PART_SIZE: u64 = 256 * 1024 * 1024;

/// Options for package serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOptions {
    /// ZIP compression level
    pub compression_level: CompressionLevel,
    /// Container-level content type, stored as the archive comment
    pub content_type: String,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            compression_level: CompressionLevel::DEFAULT,
            content_type: EYP_CONTENT_TYPE.to_string(),
        }
    }
}

/// Signer agent connection settings.
///
/// # Example
///
/// ```
/// use eyp::AgentConfig;
/// use std::time::Duration;
///
/// let config = AgentConfig::new("shared-secret")
///     .port(9000)
///     .sign_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.base_url(), "http://127.0.0.1:9000");
/// ```
#[derive(Debug, Clone)]
pub struct AgentConfig {
    host: String,
    port: u16,
    secret: SecretString,
    token_ttl: Duration,
    probe_timeout: Duration,
    sign_timeout: Duration,
}

impl AgentConfig {
    /// Settings with defaults and the given shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_AGENT_PORT,
            secret: SecretString::new(secret.into()),
            token_ttl: DEFAULT_TOKEN_TTL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            sign_timeout: DEFAULT_SIGN_TIMEOUT,
        }
    }

    /// Read settings from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `EYP_AGENT_SECRET`: shared secret (required)
    /// - `EYP_AGENT_HOST`: loopback address (default: 127.0.0.1)
    /// - `EYP_AGENT_PORT`: port (default: 8099)
    /// - `EYP_TOKEN_TTL_SECS`: token lifetime in seconds (default: 300)
    /// - `EYP_SIGN_TIMEOUT_SECS`: signing timeout in seconds (default: 60)
    pub fn from_env() -> Result<Self> {
        let secret = env::var("EYP_AGENT_SECRET")
            .map_err(|_| Error::Config("EYP_AGENT_SECRET is not set".into()))?;
        let mut config = Self::new(secret);

        if let Ok(host) = env::var("EYP_AGENT_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var::<u16>("EYP_AGENT_PORT")? {
            config.port = port;
        }
        if let Some(secs) = parse_var::<u64>("EYP_TOKEN_TTL_SECS")? {
            config.token_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("EYP_SIGN_TIMEOUT_SECS")? {
            config.sign_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn sign_timeout(mut self, timeout: Duration) -> Self {
        self.sign_timeout = timeout;
        self
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn ttl(&self) -> Duration {
        self.token_ttl
    }

    pub fn probe_timeout_duration(&self) -> Duration {
        self.probe_timeout
    }

    pub fn sign_timeout_duration(&self) -> Duration {
        self.sign_timeout
    }

    /// `http://host:port` of the agent.
    pub fn base_url(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(addr)) => format!("http://[{}]:{}", addr, self.port),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Validate the settings.
    ///
    /// Returns an error if:
    /// - The host is not a loopback address
    /// - The port is 0
    /// - The secret is empty
    /// - The token TTL or a timeout is zero
    pub fn validate(&self) -> Result<()> {
        let loopback = self.host == "localhost"
            || self
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false);
        if !loopback {
            return Err(Error::Config(format!(
                "Signer agent host must be a loopback address, got {}",
                self.host
            )));
        }

        if self.port == 0 {
            return Err(Error::Config("Signer agent port must not be 0".into()));
        }

        if self.secret.expose_secret().is_empty() {
            return Err(Error::Config("Signer agent secret is empty".into()));
        }

        if self.token_ttl.is_zero() || self.probe_timeout.is_zero() || self.sign_timeout.is_zero() {
            return Err(Error::Config("Token TTL and timeouts must be non-zero".into()));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} has an invalid value: {value}"))),
        Err(_) => Ok(None),
    }
}
