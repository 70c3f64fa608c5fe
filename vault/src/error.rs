//! Vault error types using thiserror 2.0.
//!
//! Every failure is tagged once, where the response is interpreted, so
//! callers branch on [`ErrorKind`] instead of digging through transport
//! error chains.

use keeper_common::{HttpBuildError, Retryable};
use thiserror::Error;

/// Vault-specific errors.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transport could not be established or the request failed in flight
    #[error("Connection error: {0}")]
    Connection(String),

    /// Vault answered with a 5xx (sealed, standby, internal error)
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// Rate limited
    #[error("Rate limited")]
    RateLimited,

    /// Token missing, invalid, revoked or lacking permission
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Secret not found
    #[error("Secret not found at path: {0}")]
    SecretNotFound(String),

    /// Token renewal failed inside the lifecycle manager
    #[error("Token renewal failed: {source}")]
    RenewalFailed {
        /// The error returned by the renew-self call
        #[source]
        source: Box<VaultError>,
    },

    /// Any other non-success response
    #[error("Vault returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Joined `errors` array from the response body
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a [`VaultError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed connection settings
    Configuration,
    /// Transport failure or transient server-side unavailability
    Connection,
    /// Token invalid, revoked or rejected
    Authentication,
    /// Requested secret does not exist
    NotFound,
    /// Renewal rejected or failed
    Renewal,
    /// Anything else
    Other,
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::Connection(_) | Self::Unavailable(_) | Self::RateLimited => ErrorKind::Connection,
            Self::AuthenticationFailed(_) => ErrorKind::Authentication,
            Self::SecretNotFound(_) => ErrorKind::NotFound,
            Self::RenewalFailed { .. } => ErrorKind::Renewal,
            Self::Api { .. } | Self::Serialization(_) => ErrorKind::Other,
        }
    }

    /// Check if error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection)
    }

    /// Whether the error means the secret is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::SecretNotFound(_))
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an authentication failed error.
    #[must_use]
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create a secret not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::SecretNotFound(path.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Wrap the cause of a failed renewal.
    #[must_use]
    pub fn renewal(source: Self) -> Self {
        Self::RenewalFailed {
            source: Box::new(source),
        }
    }
}

impl Retryable for VaultError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Api {
                status: err.status().map_or(0, |s| s.as_u16()),
                message: format!("malformed response body: {err}"),
            }
        } else {
            Self::Connection(err.to_string())
        }
    }
}

impl From<HttpBuildError> for VaultError {
    fn from(err: HttpBuildError) -> Self {
        if err.is_config_error() {
            Self::InvalidConfig(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}
