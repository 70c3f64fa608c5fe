//! Token descriptor derived from lookup and renewal responses.

use crate::secrets::{AuthData, TokenLookupData};
use secrecy::SecretString;
use std::time::Duration;

/// Snapshot of a token's state at one point in time.
///
/// Never persisted; every lookup or renewal yields a fresh one.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// Whether the token can renew itself
    pub renewable: bool,
    /// Remaining time-to-live as reported by Vault
    pub ttl: Duration,
    /// Token accessor
    pub accessor: String,
    /// Attached policies
    pub policies: Vec<String>,
    /// Hard upper bound on the token's life, if one was set
    pub explicit_max_ttl: Option<Duration>,
    /// Token returned by a renewal; `None` for lookups
    pub client_token: Option<SecretString>,
}

impl TokenInfo {
    /// Descriptor for a renewable token with the given TTL.
    #[must_use]
    pub const fn renewable(ttl: Duration) -> Self {
        Self {
            renewable: true,
            ttl,
            accessor: String::new(),
            policies: Vec::new(),
            explicit_max_ttl: None,
            client_token: None,
        }
    }

    /// Descriptor for a token that cannot be renewed (root or batch tokens).
    #[must_use]
    pub const fn non_renewable(ttl: Duration) -> Self {
        let mut info = Self::renewable(ttl);
        info.renewable = false;
        info
    }

    /// Attach the token value carried by a renewal response.
    #[must_use]
    pub fn with_client_token(mut self, token: impl Into<String>) -> Self {
        self.client_token = Some(SecretString::from(token.into()));
        self
    }
}

impl From<TokenLookupData> for TokenInfo {
    fn from(data: TokenLookupData) -> Self {
        Self {
            renewable: data.renewable,
            ttl: Duration::from_secs(data.ttl),
            accessor: data.accessor,
            policies: data.policies,
            explicit_max_ttl: (data.explicit_max_ttl > 0)
                .then(|| Duration::from_secs(data.explicit_max_ttl)),
            client_token: None,
        }
    }
}

impl From<AuthData> for TokenInfo {
    fn from(auth: AuthData) -> Self {
        Self {
            renewable: auth.renewable,
            ttl: Duration::from_secs(auth.lease_duration),
            accessor: auth.accessor,
            policies: auth.policies,
            explicit_max_ttl: None,
            client_token: (!auth.client_token.is_empty())
                .then(|| SecretString::from(auth.client_token)),
        }
    }
}
