//! Secret types and Vault response structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque key-value payload of a KV secret.
pub type SecretData = serde_json::Map<String, serde_json::Value>;

/// Version metadata of a KV v2 secret.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecretVersion {
    /// Version number, starting at 1
    pub version: u64,
    /// When this version was written
    pub created_time: Option<DateTime<Utc>>,
    /// When this version was soft-deleted, if it was
    #[serde(default, deserialize_with = "empty_time_as_none")]
    pub deletion_time: Option<DateTime<Utc>>,
    /// Whether this version was permanently destroyed
    #[serde(default)]
    pub destroyed: bool,
}

/// Generic `{"data": ...}` envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct DataResponse<T> {
    pub data: T,
}

/// Body of a KV v2 write.
#[derive(Debug, Serialize)]
pub(crate) struct KvWriteRequest<'a> {
    pub data: &'a SecretData,
}

/// Payload of a KV v2 read.
#[derive(Debug, Deserialize)]
pub(crate) struct KvData {
    #[serde(default)]
    pub data: Option<SecretData>,
    pub metadata: SecretVersion,
}

/// Payload of a LIST call.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListData {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Payload of `auth/token/lookup-self`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenLookupData {
    #[serde(default)]
    pub accessor: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub ttl: u64,
    #[serde(default)]
    pub explicit_max_ttl: u64,
}

/// Vault auth response
#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    pub auth: AuthData,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthData {
    pub client_token: String,
    #[serde(default)]
    pub accessor: String,
    #[serde(default)]
    pub policies: Vec<String>,
    pub lease_duration: u64,
    pub renewable: bool,
}

/// Body of `auth/token/renew-self`.
#[derive(Debug, Default, Serialize)]
pub(crate) struct RenewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub increment: Option<String>,
}

/// Vault error body
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}

fn empty_time_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.is_empty() => s
            .parse::<DateTime<Utc>>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
