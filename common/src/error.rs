//! Errors raised while building shared infrastructure.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to construct an HTTP client from an [`HttpConfig`](crate::HttpConfig).
///
/// The variants separate bad input (unreadable or malformed PEM material)
/// from a transport that refuses to initialise, so callers can classify
/// the former as a configuration problem.
#[derive(Error, Debug)]
pub enum HttpBuildError {
    /// A PEM file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// CA certificate could not be parsed
    #[error("Invalid CA certificate in {path}: {source}")]
    Certificate {
        /// Path of the CA bundle
        path: PathBuf,
        /// Parse error
        #[source]
        source: reqwest::Error,
    },

    /// Client certificate or key could not be parsed
    #[error("Invalid client identity: {0}")]
    Identity(#[source] reqwest::Error),

    /// The transport itself could not be initialised
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl HttpBuildError {
    /// Whether the failure stems from user-supplied TLS material rather than
    /// the transport.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Certificate { .. } | Self::Identity(_)
        )
    }
}
