//! HashiCorp Vault session with KV v2 access and background token renewal.
//!
//! A [`VaultClient`] owns the connection and the current token. Application
//! code reads and writes secrets through [`KvStore`], while a
//! [`TokenLifecycleManager`] runs as a background task that keeps the token
//! renewed until it is cancelled.
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use vault_keeper::{KvStore, VaultClient, VaultConfig};
//!
//! # async fn demo() -> vault_keeper::VaultResult<()> {
//! let client = VaultClient::open(VaultConfig::from_env()?)?;
//!
//! let cancel = CancellationToken::new();
//! let renewal = client.lifecycle_manager().spawn(cancel.clone());
//!
//! let secret = client.read_or_empty("secret", "app/db").await?;
//! println!("{} keys", secret.len());
//!
//! cancel.cancel();
//! let _ = renewal.await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod kv;
pub mod lifecycle;
pub mod provider;
pub mod secrets;
pub mod token;

pub use client::VaultClient;
pub use config::VaultConfig;
pub use error::{ErrorKind, VaultError, VaultResult};
pub use lifecycle::{
    LifecycleState, RenewalIncrement, RenewalPolicy, Termination, TokenLifecycleManager,
};
pub use provider::{KvStore, TokenAuth};
pub use secrets::{SecretData, SecretVersion};
pub use token::TokenInfo;
