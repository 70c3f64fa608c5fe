//! reqwest client construction with timeouts and TLS trust settings.

use crate::error::HttpBuildError;
use reqwest::{Certificate, Client, ClientBuilder, Identity};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TLS trust settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// Extra PEM-encoded CA certificate to trust
    pub ca_cert: Option<PathBuf>,
    /// PEM-encoded client certificate
    pub client_cert: Option<PathBuf>,
    /// PEM-encoded client private key
    pub client_key: Option<PathBuf>,
    /// Disable server certificate verification
    pub skip_verify: bool,
}

impl TlsConfig {
    /// Trust an additional CA certificate.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Present a client certificate and key.
    #[must_use]
    pub fn with_client_identity(
        mut self,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    /// Skip server certificate verification.
    #[must_use]
    pub const fn insecure(mut self) -> Self {
        self.skip_verify = true;
        self
    }
}

/// Transport settings for [`build_http_client`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout (default: 60s)
    pub timeout: Duration,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// User agent string
    pub user_agent: String,
    /// TLS trust settings
    pub tls: TlsConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: concat!("vault-keeper/", env!("CARGO_PKG_VERSION")).to_string(),
            tls: TlsConfig::default(),
        }
    }
}

impl HttpConfig {
    /// Set the whole-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the TCP/TLS connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set TLS trust settings.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }
}

/// Build a configured HTTP client.
///
/// Creates a reqwest client with rustls TLS, connection pooling, and
/// the specified configuration. PEM material is read eagerly so a bad
/// path fails here rather than on the first request.
///
/// # Errors
///
/// Returns [`HttpBuildError`] if a PEM file cannot be read or parsed, or if
/// the client cannot be built.
///
/// # Examples
///
/// ```
/// use keeper_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default()
///     .with_timeout(Duration::from_secs(30));
/// let client = build_http_client(&config).expect("Failed to build client");
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, HttpBuildError> {
    let mut builder = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .use_rustls_tls();

    let tls = &config.tls;

    if let Some(path) = &tls.ca_cert {
        let pem = read_pem(path)?;
        let cert = Certificate::from_pem(&pem).map_err(|source| HttpBuildError::Certificate {
            path: path.clone(),
            source,
        })?;
        builder = builder.add_root_certificate(cert);
    }

    if let (Some(cert_path), Some(key_path)) = (&tls.client_cert, &tls.client_key) {
        let mut pem = read_pem(cert_path)?;
        pem.push(b'\n');
        pem.extend(read_pem(key_path)?);
        let identity = Identity::from_pem(&pem).map_err(HttpBuildError::Identity)?;
        builder = builder.identity(identity);
    }

    if tls.skip_verify {
        tracing::warn!("TLS certificate verification disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(HttpBuildError::Build)
}

fn read_pem(path: &Path) -> Result<Vec<u8>, HttpBuildError> {
    std::fs::read(path).map_err(|source| HttpBuildError::Io {
        path: path.to_path_buf(),
        source,
    })
}
