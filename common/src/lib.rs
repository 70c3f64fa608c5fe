//! Plumbing shared by the vault-keeper crates: an HTTP client builder with
//! TLS trust settings, a backoff policy over [`Retryable`] errors, and
//! tracing subscriber setup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod retry;
pub mod tracing_config;

pub use error::HttpBuildError;
pub use http::{HttpConfig, TlsConfig, build_http_client};
pub use retry::{RetryConfig, RetryPolicy, Retryable};
pub use tracing_config::{TracingConfig, init_tracing};
