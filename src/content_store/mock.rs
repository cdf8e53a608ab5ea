//! In-memory content store provider
//!
//! Content-addressed: the reference is a CIDv0 (`Qm...`) derived from the
//! SHA-256 of the bytes, so re-uploading identical content yields the same
//! reference. Suitable for development and tests; contents die with the
//! process.

use async_trait::async_trait;
use cid::Cid;
use dashmap::DashMap;
use multihash_codetable::{Code, MultihashDigest};
use tracing::{debug, info};

use crate::error::CapsuleError;

use super::ContentStore;

/// In-memory content-addressed store
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the CIDv0 reference for a blob
    pub fn compute_ref(data: &[u8]) -> Result<String, CapsuleError> {
        let digest = Code::Sha2_256.digest(data);
        let cid = Cid::new_v0(digest)
            .map_err(|e| CapsuleError::ContentStore(format!("CID construction failed: {}", e)))?;
        Ok(cid.to_string())
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn upload(&self, data: &[u8]) -> Result<String, CapsuleError> {
        let content_ref = Self::compute_ref(data)?;

        if self.blobs.contains_key(&content_ref) {
            debug!(content_ref = %content_ref, "Content already stored");
            return Ok(content_ref);
        }

        self.blobs.insert(content_ref.clone(), data.to_vec());
        info!(content_ref = %content_ref, size = data.len(), "Stored content");

        Ok(content_ref)
    }

    async fn fetch(&self, content_ref: &str) -> Result<Vec<u8>, CapsuleError> {
        self.blobs
            .get(content_ref)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CapsuleError::NotFound(format!("Content not found: {}", content_ref)))
    }

    async fn exists(&self, content_ref: &str) -> bool {
        self.blobs.contains_key(content_ref)
    }
}
