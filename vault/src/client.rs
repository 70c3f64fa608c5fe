//! Vault HTTP session.
//!
//! [`VaultClient`] is the single owner of the connection settings and the
//! current token. Clones share state, so a token published by the lifecycle
//! manager is seen by every clone on its next request.

use crate::{
    config::VaultConfig,
    error::{VaultError, VaultResult},
    lifecycle::TokenLifecycleManager,
    provider::TokenAuth,
    secrets::{AuthResponse, DataResponse, ErrorResponse, RenewRequest, TokenLookupData},
    token::TokenInfo,
};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use keeper_common::build_http_client;
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};
use url::Url;

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
const REQUEST_HEADER: &str = "X-Vault-Request";

/// Authenticated session against a Vault server.
#[derive(Clone)]
pub struct VaultClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: VaultConfig,
    addr: Url,
    http: Client,
    token: ArcSwapOption<SecretString>,
}

impl VaultClient {
    /// Validate `config` and build the session.
    ///
    /// No request is sent; a bad token only surfaces on first use.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidConfig`] for malformed settings or TLS material,
    /// [`VaultError::Connection`] if the HTTP transport cannot be initialised.
    pub fn open(config: VaultConfig) -> VaultResult<Self> {
        let addr = config.validate()?;
        let http = build_http_client(&config.http_config())?;
        let token = ArcSwapOption::new(config.token.clone().map(Arc::new));

        info!(
            addr = %addr,
            namespace = config.namespace.as_deref().unwrap_or(""),
            has_token = config.token.is_some(),
            "Vault client configured"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                addr,
                http,
                token,
            }),
        })
    }

    /// Build a session from the `VAULT_*` environment variables.
    ///
    /// # Errors
    ///
    /// See [`VaultConfig::from_env`] and [`open`](Self::open).
    pub fn from_env() -> VaultResult<Self> {
        Self::open(VaultConfig::from_env()?)
    }

    /// Another handle to the same session.
    #[must_use]
    pub fn handle(&self) -> Self {
        self.clone()
    }

    /// Configuration the session was opened with.
    #[must_use]
    pub fn config(&self) -> &VaultConfig {
        &self.inner.config
    }

    /// Validated server address.
    #[must_use]
    pub fn address(&self) -> &Url {
        &self.inner.addr
    }

    /// Current token, if any.
    #[must_use]
    pub fn token(&self) -> Option<Arc<SecretString>> {
        self.inner.token.load_full()
    }

    /// Replace the token, e.g. after re-authenticating out of band.
    pub fn set_token(&self, token: impl Into<String>) {
        self.publish_token(SecretString::from(token.into()));
    }

    /// Forget the token.
    pub fn clear_token(&self) {
        self.inner.token.store(None);
    }

    /// A lifecycle manager for this session using the configured renewal policy.
    #[must_use]
    pub fn lifecycle_manager(&self) -> TokenLifecycleManager<Self> {
        TokenLifecycleManager::new(self.handle(), self.inner.config.renewal)
    }

    fn publish_token(&self, token: SecretString) {
        self.inner.token.store(Some(Arc::new(token)));
    }

    fn url(&self, path: &str) -> VaultResult<Url> {
        let raw = format!(
            "{}/v1/{}",
            self.inner.addr.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&raw).map_err(|e| VaultError::invalid_config(format!("request path {path:?}: {e}")))
    }

    /// Send a request and classify any non-success status.
    #[instrument(skip(self, query, body))]
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> VaultResult<Response> {
        let token = self
            .inner
            .token
            .load_full()
            .ok_or_else(|| VaultError::auth_failed("no Vault token configured"))?;

        let mut request = self
            .inner
            .http
            .request(method, self.url(path)?)
            .header(TOKEN_HEADER, token.expose_secret())
            .header(REQUEST_HEADER, "true");

        if let Some(namespace) = &self.inner.config.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(b) = body {
            request = request.json(&b);
        }

        let response = request.send().await.map_err(|e| VaultError::connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Vault request succeeded");
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify(status, path, &text))
    }

    /// Send a request and decode the JSON body.
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> VaultResult<T> {
        let response = self.send(method, path, query, body).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultClient")
            .field("addr", &self.inner.addr.as_str())
            .field("namespace", &self.inner.config.namespace)
            .field("token", &self.token().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Format a renewal increment as whole seconds, rounding up.
///
/// Never `"0s"`, which Vault reads as "use the token's default".
fn increment_param(increment: Duration) -> String {
    let secs = increment.as_secs() + u64::from(increment.subsec_nanos() > 0);
    format!("{}s", secs.max(1))
}

/// Map a non-success response onto the error taxonomy.
fn classify(status: StatusCode, path: &str, body: &str) -> VaultError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.errors.join("; "))
        .unwrap_or_default();
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or("no error message").to_string()
    } else {
        message
    };

    match status.as_u16() {
        // Only secret paths can be "not found"; a 404 on a token endpoint is an API fault.
        404 if path.trim_start_matches('/').starts_with("auth/") => VaultError::Api {
            status: 404,
            message,
        },
        404 => VaultError::not_found(path),
        401 | 403 => VaultError::auth_failed(format!("{path}: {message}")),
        429 => VaultError::RateLimited,
        s if s >= 500 => VaultError::unavailable(format!("Status {status}: {message}")),
        s => VaultError::Api { status: s, message },
    }
}

#[async_trait]
impl TokenAuth for VaultClient {
    async fn lookup_self(&self) -> VaultResult<TokenInfo> {
        let response: DataResponse<TokenLookupData> = self
            .request(Method::GET, "auth/token/lookup-self", &[], None)
            .await?;
        Ok(response.data.into())
    }

    async fn renew_self(&self, increment: Option<Duration>) -> VaultResult<TokenInfo> {
        let body = RenewRequest {
            increment: increment.map(increment_param),
        };

        let response: AuthResponse = self
            .request(
                Method::POST,
                "auth/token/renew-self",
                &[],
                Some(serde_json::to_value(&body)?),
            )
            .await?;

        for warning in response.warnings.iter().flatten() {
            warn!(warning = %warning, "Vault renewal warning");
        }

        let info = TokenInfo::from(response.auth);
        if let Some(token) = &info.client_token {
            self.publish_token(SecretString::from(token.expose_secret().to_owned()));
        }

        Ok(info)
    }
}
