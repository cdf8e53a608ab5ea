//! Content store collaborator
//!
//! Content-addressed external storage for capsule payloads. The core sees it
//! only through the [`ContentStore`] trait; providers are the in-memory
//! [`MemoryContentStore`] and the [`IpfsClient`] speaking the IPFS HTTP API.
//! References are opaque strings to the core - both shipped providers hand
//! out CIDs, but nothing outside the provider depends on that.

pub mod mock;
pub mod ipfs;

use async_trait::async_trait;

use crate::error::CapsuleError;

/// Capability contract for the external content store
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store content, returning its content-addressed reference
    async fn upload(&self, data: &[u8]) -> Result<String, CapsuleError>;

    /// Fetch content by reference; NotFound if absent
    async fn fetch(&self, content_ref: &str) -> Result<Vec<u8>, CapsuleError>;

    /// Whether content exists under the reference
    async fn exists(&self, content_ref: &str) -> bool;
}

// Re-exports
pub use ipfs::IpfsClient;
pub use mock::MemoryContentStore;
