//! Vault client configuration.
//!
//! Configuration comes either from the builder methods below or from the
//! environment variables the Vault CLI understands (`VAULT_ADDR`,
//! `VAULT_TOKEN`, `VAULT_CACERT`, ...).

use crate::{
    error::{VaultError, VaultResult},
    lifecycle::{RenewalIncrement, RenewalPolicy},
};
use keeper_common::{HttpConfig, TlsConfig};
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Address used when `VAULT_ADDR` is unset.
pub const DEFAULT_ADDR: &str = "https://127.0.0.1:8200";

/// Vault client configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address
    pub addr: String,
    /// Initial token
    pub token: Option<SecretString>,
    /// Enterprise namespace sent as `X-Vault-Namespace`
    pub namespace: Option<String>,
    /// TLS trust settings
    pub tls: TlsConfig,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Renewal cadence used by [`VaultClient::lifecycle_manager`](crate::VaultClient::lifecycle_manager)
    pub renewal: RenewalPolicy,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            token: None,
            namespace: None,
            tls: TlsConfig::default(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            renewal: RenewalPolicy::default(),
        }
    }
}

impl VaultConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] if a variable is present but
    /// cannot be parsed.
    pub fn from_env() -> VaultResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Unset and empty variables fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] if a variable is present but
    /// cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> VaultResult<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = Self::default();

        if let Some(addr) = var("VAULT_ADDR") {
            config.addr = addr;
        }
        config.token = var("VAULT_TOKEN").map(SecretString::from);
        config.namespace = var("VAULT_NAMESPACE");
        config.tls.ca_cert = var("VAULT_CACERT").map(PathBuf::from);
        config.tls.client_cert = var("VAULT_CLIENT_CERT").map(PathBuf::from);
        config.tls.client_key = var("VAULT_CLIENT_KEY").map(PathBuf::from);

        if let Some(raw) = var("VAULT_SKIP_VERIFY") {
            config.tls.skip_verify = parse_bool("VAULT_SKIP_VERIFY", &raw)?;
        }
        if let Some(raw) = var("VAULT_CLIENT_TIMEOUT") {
            config.timeout = parse_duration("VAULT_CLIENT_TIMEOUT", &raw)?;
        }
        if let Some(raw) = var("VAULT_RENEW_INCREMENT") {
            config.renewal = config
                .renewal
                .with_increment(parse_increment("VAULT_RENEW_INCREMENT", &raw)?);
        }

        Ok(config)
    }

    /// Set the initial token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    /// Set the enterprise namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set TLS trust settings.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the renewal policy.
    #[must_use]
    pub const fn with_renewal(mut self, renewal: RenewalPolicy) -> Self {
        self.renewal = renewal;
        self
    }

    /// Validate the configuration and return the parsed address.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> VaultResult<Url> {
        let addr = Url::parse(&self.addr)
            .map_err(|e| VaultError::invalid_config(format!("VAULT_ADDR {:?}: {e}", self.addr)))?;

        if !matches!(addr.scheme(), "http" | "https") {
            return Err(VaultError::invalid_config(format!(
                "VAULT_ADDR must use http or https, got {:?}",
                addr.scheme()
            )));
        }
        if addr.host_str().is_none_or(str::is_empty) {
            return Err(VaultError::invalid_config("VAULT_ADDR has no host"));
        }
        if self.timeout.is_zero() {
            return Err(VaultError::invalid_config("timeout must be greater than 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(VaultError::invalid_config("connect timeout must be greater than 0"));
        }
        if self.tls.client_cert.is_some() != self.tls.client_key.is_some() {
            return Err(VaultError::invalid_config(
                "VAULT_CLIENT_CERT and VAULT_CLIENT_KEY must be set together",
            ));
        }
        if self.namespace.as_deref().is_some_and(|ns| ns.contains(char::is_whitespace)) {
            return Err(VaultError::invalid_config("namespace must not contain whitespace"));
        }

        Ok(addr)
    }

    /// HTTP settings derived from this configuration.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
            .with_timeout(self.timeout)
            .with_connect_timeout(self.connect_timeout)
            .with_tls(self.tls.clone())
    }
}

fn parse_bool(name: &str, raw: &str) -> VaultResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" => Ok(true),
        "0" | "f" | "false" | "no" => Ok(false),
        _ => Err(VaultError::invalid_config(format!(
            "{name}: expected a boolean, got {raw:?}"
        ))),
    }
}

/// Parse `90`, `90s`, `15m` or `1h` into a duration.
pub(crate) fn parse_duration(name: &str, raw: &str) -> VaultResult<Duration> {
    let invalid = || VaultError::invalid_config(format!("{name}: invalid duration {raw:?}"));

    let (digits, unit) = raw
        .find(|c: char| !c.is_ascii_digit())
        .map_or((raw, ""), |idx| raw.split_at(idx));

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let secs = match unit {
        "" | "s" => Some(value),
        "m" => value.checked_mul(60),
        "h" => value.checked_mul(3600),
        _ => None,
    }
    .ok_or_else(invalid)?;

    Ok(Duration::from_secs(secs))
}

fn parse_increment(name: &str, raw: &str) -> VaultResult<RenewalIncrement> {
    match raw.to_ascii_lowercase().as_str() {
        "full" => Ok(RenewalIncrement::FullTtl),
        "half" => Ok(RenewalIncrement::HalfTtl),
        "server" | "default" => Ok(RenewalIncrement::ServerDefault),
        other => parse_duration(name, other).map(RenewalIncrement::Fixed),
    }
}
