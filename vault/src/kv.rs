//! KV v2 operations on the session.

use crate::{
    client::VaultClient,
    error::{VaultError, VaultResult},
    provider::KvStore,
    secrets::{DataResponse, KvData, KvWriteRequest, ListData, SecretData, SecretVersion},
};
use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, instrument};

fn data_path(mount: &str, path: &str) -> String {
    format!(
        "{}/data/{}",
        mount.trim_matches('/'),
        path.trim_matches('/')
    )
}

impl VaultClient {
    async fn read_data(
        &self,
        mount: &str,
        path: &str,
        version: Option<u64>,
    ) -> VaultResult<(SecretData, SecretVersion)> {
        let api_path = data_path(mount, path);
        let query: Vec<(&str, String)> = version
            .map(|v| ("version", v.to_string()))
            .into_iter()
            .collect();

        let response: DataResponse<KvData> =
            self.request(Method::GET, &api_path, &query, None).await?;

        // Soft-deleted versions can come back as 200 with null data.
        let data = response
            .data
            .data
            .ok_or_else(|| VaultError::not_found(&api_path))?;

        Ok((data, response.data.metadata))
    }
}

#[async_trait]
impl KvStore for VaultClient {
    #[instrument(skip(self, data), fields(keys = data.len()))]
    async fn write(&self, mount: &str, path: &str, data: &SecretData) -> VaultResult<SecretVersion> {
        let body = serde_json::to_value(KvWriteRequest { data })?;
        let response: DataResponse<SecretVersion> = self
            .request(Method::POST, &data_path(mount, path), &[], Some(body))
            .await?;

        debug!(version = response.data.version, "Secret written");
        Ok(response.data)
    }

    #[instrument(skip(self))]
    async fn read(&self, mount: &str, path: &str) -> VaultResult<SecretData> {
        self.read_data(mount, path, None).await.map(|(data, _)| data)
    }

    #[instrument(skip(self))]
    async fn read_version(
        &self,
        mount: &str,
        path: &str,
        version: u64,
    ) -> VaultResult<(SecretData, SecretVersion)> {
        self.read_data(mount, path, Some(version)).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, mount: &str, path: &str) -> VaultResult<()> {
        self.send(Method::DELETE, &data_path(mount, path), &[], None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, path: &str) -> VaultResult<Vec<String>> {
        let query = [("list", "true".to_string())];
        match self
            .request::<DataResponse<ListData>>(Method::GET, path, &query, None)
            .await
        {
            Ok(response) => Ok(response.data.keys),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_path_trims_slashes() {
        assert_eq!(data_path("secret", "app/db"), "secret/data/app/db");
        assert_eq!(data_path("/secret/", "/app/db/"), "secret/data/app/db");
    }
}
