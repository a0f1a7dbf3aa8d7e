mod azure;
mod memory;
pub mod sas;

pub use azure::AzureBlobStore;
pub use memory::MemoryBlobStore;
pub use sas::{SasPermissions, StorageAccount};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Information about a blob store backend
#[derive(Debug, Clone)]
pub struct BlobStoreInfo {
    /// Human-readable name
    pub name: &'static str,
    /// Container the store operates on
    pub container: String,
}

/// Object store holding the temporary source and output blobs of a batch.
///
/// Every operation is scoped to a single container. Blob names are flat; a
/// "directory" is just a shared name prefix.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Get information about this store
    fn info(&self) -> BlobStoreInfo;

    /// Create the container if it does not exist yet
    async fn ensure_container(&self) -> Result<()>;

    /// Store `data` under `name`. Without `overwrite`, an existing blob is an error.
    async fn upload(&self, name: &str, data: Bytes, overwrite: bool) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Names starting with `prefix`, in lexicographic order
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn download(&self, name: &str) -> Result<Vec<u8>>;

    async fn delete(&self, name: &str) -> Result<()>;

    /// Unsigned URL of the container
    fn container_url(&self) -> String;

    /// Unsigned URL of a blob (name percent-encoded, `/` kept)
    fn blob_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.container_url(),
            urlencoding::encode(name).replace("%2F", "/")
        )
    }

    /// Blob-scoped access token, optionally pinning response headers
    fn sign_blob(
        &self,
        name: &str,
        permissions: SasPermissions,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
        content_type: Option<&str>,
        disposition: Option<&str>,
    ) -> Result<String>;

    /// Container-scoped access token
    fn sign_container(
        &self,
        permissions: SasPermissions,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<String>;
}
