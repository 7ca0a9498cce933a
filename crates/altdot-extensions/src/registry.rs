//! Store registry client
//!
//! The registry is an external service the updater and installer talk to:
//! resolving download URLs, batched update checks (one round-trip for the
//! whole installed set), and archive downloads. The trait seam exists so
//! tests can substitute a recording mock.

use std::time::Duration;

use altdot_core::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `{id, version}` pair sent in a batched update check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateQuery {
    pub id: String,
    pub version: String,
}

/// An extension the registry flags as having a newer version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateHit {
    pub id: String,
    #[serde(rename = "fileUrl")]
    pub file_url: String,
}

/// Client for the extension store registry
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Resolve the archive download URL for an extension id
    async fn get_download_file_url(&self, extension_id: &str) -> Result<String>;

    /// Batched update check: returns only the extensions needing updates
    async fn check_update(&self, installed: &[UpdateQuery]) -> Result<Vec<UpdateHit>>;

    /// Fetch an archive's bytes
    async fn download_file(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP registry client backed by reqwest
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct DownloadUrlResponse {
    url: String,
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(Error::network)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn get_download_file_url(&self, extension_id: &str) -> Result<String> {
        let url = format!("{}/extensions/{}/download-url", self.base_url, extension_id);
        debug!(url, "resolving download url");

        let response = self.client.get(&url).send().await.map_err(Error::network)?;
        if !response.status().is_success() {
            return Err(Error::network(format!(
                "download url lookup failed: HTTP {}",
                response.status()
            )));
        }

        let body: DownloadUrlResponse = response.json().await.map_err(Error::network)?;
        Ok(body.url)
    }

    async fn check_update(&self, installed: &[UpdateQuery]) -> Result<Vec<UpdateHit>> {
        let url = format!("{}/extensions/check-update", self.base_url);
        debug!(url, count = installed.len(), "batched update check");

        let response = self
            .client
            .post(&url)
            .json(installed)
            .send()
            .await
            .map_err(Error::network)?;
        if !response.status().is_success() {
            return Err(Error::network(format!(
                "update check failed: HTTP {}",
                response.status()
            )));
        }

        response.json().await.map_err(Error::network)
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url, "downloading archive");

        let response = self.client.get(url).send().await.map_err(Error::network)?;
        if !response.status().is_success() {
            return Err(Error::network(format!(
                "download failed: HTTP {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await.map_err(Error::network)?;
        Ok(bytes.to_vec())
    }
}
