//! Traits at the seams between the session and its consumers.

use crate::{
    error::VaultResult,
    secrets::{SecretData, SecretVersion},
    token::TokenInfo,
};
use async_trait::async_trait;
use std::time::Duration;

/// Token self-management calls the lifecycle manager depends on.
#[async_trait]
pub trait TokenAuth: Send + Sync {
    /// Look up the calling token's own metadata.
    async fn lookup_self(&self) -> VaultResult<TokenInfo>;

    /// Renew the calling token.
    ///
    /// `increment` of `None` lets Vault apply the token's default. On success
    /// the implementation must publish any token carried by the response
    /// before returning.
    async fn renew_self(&self, increment: Option<Duration>) -> VaultResult<TokenInfo>;
}

/// KV v2 secret operations, parameterized by mount and secret path.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Write a new version of the secret at `path`.
    async fn write(&self, mount: &str, path: &str, data: &SecretData) -> VaultResult<SecretVersion>;

    /// Read the latest version of the secret at `path`.
    ///
    /// A missing or soft-deleted secret yields
    /// [`VaultError::SecretNotFound`](crate::VaultError::SecretNotFound).
    async fn read(&self, mount: &str, path: &str) -> VaultResult<SecretData>;

    /// Read a specific version of the secret at `path`.
    async fn read_version(
        &self,
        mount: &str,
        path: &str,
        version: u64,
    ) -> VaultResult<(SecretData, SecretVersion)>;

    /// Soft-delete the latest version of the secret at `path`.
    async fn delete(&self, mount: &str, path: &str) -> VaultResult<()>;

    /// List child keys below a full API path such as `secret/metadata/app`.
    ///
    /// A path with no children yields an empty list.
    async fn list(&self, path: &str) -> VaultResult<Vec<String>>;

    /// Like [`read`](Self::read), but an absent secret is an empty map
    /// rather than an error.
    async fn read_or_empty(&self, mount: &str, path: &str) -> VaultResult<SecretData> {
        match self.read(mount, path).await {
            Err(e) if e.is_not_found() => Ok(SecretData::new()),
            other => other,
        }
    }
}
