//! IPFS HTTP API content store provider
//!
//! Talks to a node's RPC endpoint (`/api/v0/add`, `/api/v0/cat`,
//! `/api/v0/block/stat`). The request timeout lives here, on the
//! collaborator side; the core imposes none of its own.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::CapsuleError;

use super::ContentStore;

/// Client for an IPFS-compatible content store API
pub struct IpfsClient {
    http: reqwest::Client,
    api_url: String,
}

/// Response body of /api/v0/add
#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl IpfsClient {
    /// Create a client for the given API base URL (e.g. `http://127.0.0.1:5001`)
    pub fn new(api_url: &str, timeout_secs: u64) -> Result<Self, CapsuleError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CapsuleError::ContentStore(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentStore for IpfsClient {
    async fn upload(&self, data: &[u8]) -> Result<String, CapsuleError> {
        let part = reqwest::multipart::Part::bytes(data.to_vec()).file_name("capsule-content");
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/api/v0/add", self.api_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CapsuleError::ContentStore(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CapsuleError::ContentStore(format!(
                "Upload rejected: HTTP {}",
                response.status()
            )));
        }

        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| CapsuleError::ContentStore(format!("Bad add response: {}", e)))?;

        info!(content_ref = %added.hash, size = data.len(), "Uploaded content to IPFS");
        Ok(added.hash)
    }

    async fn fetch(&self, content_ref: &str) -> Result<Vec<u8>, CapsuleError> {
        let response = self
            .http
            .post(format!("{}/api/v0/cat", self.api_url))
            .query(&[("arg", content_ref)])
            .send()
            .await
            .map_err(|e| CapsuleError::ContentStore(format!("Fetch request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CapsuleError::NotFound(format!(
                "Content not found: {}",
                content_ref
            )));
        }
        if !response.status().is_success() {
            return Err(CapsuleError::ContentStore(format!(
                "Fetch rejected: HTTP {}",
                response.status()
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| CapsuleError::ContentStore(format!("Fetch body read failed: {}", e)))?;

        Ok(data.to_vec())
    }

    async fn exists(&self, content_ref: &str) -> bool {
        let result = self
            .http
            .post(format!("{}/api/v0/block/stat", self.api_url))
            .query(&[("arg", content_ref)])
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(content_ref = %content_ref, error = %e, "Content existence check failed");
                false
            }
        }
    }
}
