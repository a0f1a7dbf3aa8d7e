use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::sas::{SasPermissions, SasResource, ServiceSas, StorageAccount};
use super::{BlobStore, BlobStoreInfo};
use crate::error::{Error, Result};

/// Base64 of "memory-store-key"
const MEMORY_ACCOUNT_KEY: &str = "bWVtb3J5LXN0b3JlLWtleQ==";

/// In-process blob store.
///
/// Tokens are signed exactly like real ones with a fixed key, so URLs built on
/// top of this store have the same shape as production URLs. Failure switches
/// let callers exercise the error paths of the orchestrator.
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Bytes>>,
    account: Option<StorageAccount>,
    container: String,
    uploads: AtomicUsize,
    fail_container: AtomicBool,
    fail_signing: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
            account: StorageAccount::new("memory", MEMORY_ACCOUNT_KEY, "https://memory.blob.local").ok(),
            container: container.into(),
            uploads: AtomicUsize::new(0),
            fail_container: AtomicBool::new(false),
            fail_signing: AtomicBool::new(false),
        }
    }

    /// Make `ensure_container` fail
    pub fn set_fail_container(&self, fail: bool) {
        self.fail_container.store(fail, Ordering::SeqCst);
    }

    /// Make every signing call fail
    pub fn set_fail_signing(&self, fail: bool) {
        self.fail_signing.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `upload` calls so far
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Place a blob directly, bypassing the upload counter
    pub async fn insert(&self, name: &str, data: impl Into<Bytes>) {
        self.blobs.write().await.insert(name.to_string(), data.into());
    }

    pub async fn get(&self, name: &str) -> Option<Bytes> {
        self.blobs.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    fn account(&self, resource: &str) -> Result<&StorageAccount> {
        if self.fail_signing.load(Ordering::SeqCst) {
            return Err(Error::Signing {
                resource: resource.to_string(),
                reason: "signing disabled".to_string(),
            });
        }
        self.account.as_ref().ok_or_else(|| Error::Signing {
            resource: resource.to_string(),
            reason: "no signing key".to_string(),
        })
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn info(&self) -> BlobStoreInfo {
        BlobStoreInfo {
            name: "In-memory",
            container: self.container.clone(),
        }
    }

    async fn ensure_container(&self) -> Result<()> {
        if self.fail_container.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!(
                "container '{}' could not be provisioned",
                self.container
            )));
        }
        Ok(())
    }

    async fn upload(&self, name: &str, data: Bytes, overwrite: bool) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        if !overwrite && blobs.contains_key(name) {
            return Err(Error::BlobExists(name.to_string()));
        }
        blobs.insert(name.to_string(), data);
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.blobs.read().await.contains_key(name))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .await
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(name)
            .map(|b| b.to_vec())
            .ok_or_else(|| Error::BlobNotFound(name.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.blobs
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::BlobNotFound(name.to_string()))
    }

    fn container_url(&self) -> String {
        format!("https://memory.blob.local/{}", self.container)
    }

    fn sign_blob(
        &self,
        name: &str,
        permissions: SasPermissions,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
        content_type: Option<&str>,
        disposition: Option<&str>,
    ) -> Result<String> {
        self.account(name)?.sign_service(&ServiceSas {
            resource: SasResource::Blob {
                container: &self.container,
                blob: name,
            },
            permissions,
            start,
            expiry,
            content_type,
            content_disposition: disposition,
        })
    }

    fn sign_container(
        &self,
        permissions: SasPermissions,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<String> {
        self.account(&self.container)?.sign_service(&ServiceSas {
            resource: SasResource::Container {
                container: &self.container,
            },
            permissions,
            start,
            expiry,
            content_type: None,
            content_disposition: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_overwrite_semantics() {
        let store = MemoryBlobStore::default();
        store.upload("a.pdf", Bytes::from_static(b"one"), false).await.unwrap();

        let err = store.upload("a.pdf", Bytes::from_static(b"two"), false).await.unwrap_err();
        assert!(matches!(err, Error::BlobExists(_)));

        store.upload("a.pdf", Bytes::from_static(b"two"), true).await.unwrap();
        assert_eq!(store.download("a.pdf").await.unwrap(), b"two");
        assert_eq!(store.upload_count(), 2);
    }

    #[tokio::test]
    async fn test_list_by_prefix_is_sorted() {
        let store = MemoryBlobStore::default();
        store.insert("translated_b/2.pdf", b"x".to_vec()).await;
        store.insert("translated_b/1.pdf", b"x".to_vec()).await;
        store.insert("translated_c/1.pdf", b"x".to_vec()).await;

        let listed = store.list("translated_b").await.unwrap();
        assert_eq!(listed, vec!["translated_b/1.pdf", "translated_b/2.pdf"]);
        assert!(store.list("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_blob() {
        let store = MemoryBlobStore::default();
        assert!(matches!(store.delete("gone").await, Err(Error::BlobNotFound(_))));
        assert!(!store.exists("gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let store = MemoryBlobStore::default();
        store.set_fail_container(true);
        assert!(store.ensure_container().await.is_err());

        store.set_fail_signing(true);
        let now = Utc::now();
        assert!(matches!(
            store.sign_container(SasPermissions::read_only(), now, now),
            Err(Error::Signing { .. })
        ));
    }
}
