use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::sas::{SasPermissions, SasResource, ServiceSas, StorageAccount};
use super::{BlobStore, BlobStoreInfo};
use crate::error::{Error, Result};

/// Lifetime of the tokens this store signs for its own requests
const INTERNAL_TOKEN_MINUTES: i64 = 30;

/// Azure Blob Storage over REST.
///
/// Requests are authorized with SAS tokens signed locally from the account
/// key: an account SAS for container provisioning, a container SAS for blob
/// operations.
pub struct AzureBlobStore {
    client: Client,
    account: StorageAccount,
    container: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: BlobList,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    blob: Vec<BlobEntry>,
}

#[derive(Debug, Deserialize)]
struct BlobEntry {
    #[serde(rename = "Name")]
    name: String,
}

impl AzureBlobStore {
    /// Create a store for `container` in the account named by the connection string.
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be created, which should only happen
    /// in extreme circumstances (e.g., TLS backend unavailable on the system).
    #[allow(clippy::expect_used)]
    pub fn new(account: StorageAccount, container: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            account,
            container: container.into(),
        }
    }

    pub fn from_connection_string(conn: &str, container: impl Into<String>) -> Result<Self> {
        Ok(Self::new(StorageAccount::from_connection_string(conn)?, container))
    }

    fn internal_window() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (
            now - ChronoDuration::minutes(5),
            now + ChronoDuration::minutes(INTERNAL_TOKEN_MINUTES),
        )
    }

    fn container_token(&self) -> Result<String> {
        let (start, expiry) = Self::internal_window();
        self.sign_container(SasPermissions::all(), start, expiry)
    }

    fn signed_blob_url(&self, name: &str) -> Result<String> {
        Ok(format!("{}?{}", self.blob_url(name), self.container_token()?))
    }
}

/// Map a non-success response to an error built by `make`
async fn check(
    response: Response,
    make: impl FnOnce(StatusCode, String) -> Error,
) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(make(status, body))
}

fn storage_error(e: &reqwest::Error) -> Error {
    Error::Storage(e.to_string())
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    fn info(&self) -> BlobStoreInfo {
        BlobStoreInfo {
            name: "Azure Blob Storage",
            container: self.container.clone(),
        }
    }

    async fn ensure_container(&self) -> Result<()> {
        let (start, expiry) = Self::internal_window();
        let token = self.account.sign_account(
            SasPermissions {
                read: true,
                create: true,
                ..Default::default()
            },
            "c",
            start,
            expiry,
        )?;
        let url = format!("{}?restype=container&{token}", self.container_url());

        let existing = self.client.get(&url).send().await.map_err(|e| storage_error(&e))?;
        if existing.status().is_success() {
            return Ok(());
        }
        if existing.status() != StatusCode::NOT_FOUND {
            let status = existing.status();
            return Err(Error::Storage(format!(
                "container lookup for '{}' returned HTTP {status}",
                self.container
            )));
        }

        debug!("Creating container {}", self.container);
        let response = self.client.put(&url).send().await.map_err(|e| storage_error(&e))?;
        // 409: created concurrently by someone else
        if response.status().is_success() || response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Storage(format!(
            "failed to create container '{}': HTTP {status}: {body}",
            self.container
        )))
    }

    async fn upload(&self, name: &str, data: Bytes, overwrite: bool) -> Result<()> {
        let url = self.signed_blob_url(name)?;
        let content_type = mime_guess::from_path(name).first_or_octet_stream();

        let mut request = self
            .client
            .put(&url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", content_type.essence_str())
            .body(data);
        if !overwrite {
            request = request.header("If-None-Match", "*");
        }

        let response = request.send().await.map_err(|e| Error::Upload {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        check(response, |status, body| {
            if status == StatusCode::CONFLICT {
                Error::BlobExists(name.to_string())
            } else {
                Error::Upload {
                    name: name.to_string(),
                    reason: format!("HTTP {status}: {body}"),
                }
            }
        })
        .await?;

        debug!("Uploaded blob {}", name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let url = self.signed_blob_url(name)?;
        let response = self.client.head(&url).send().await.map_err(|e| storage_error(&e))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(Error::Storage(format!("HEAD '{name}' returned HTTP {s}"))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let token = self.container_token()?;
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = format!(
                "{}?restype=container&comp=list&prefix={}&{token}",
                self.container_url(),
                urlencoding::encode(prefix)
            );
            if let Some(ref m) = marker {
                url.push_str("&marker=");
                url.push_str(&urlencoding::encode(m));
            }

            let response = self.client.get(&url).send().await.map_err(|e| storage_error(&e))?;
            let response = check(response, |status, body| {
                Error::Storage(format!("listing '{prefix}' failed: HTTP {status}: {body}"))
            })
            .await?;

            let text = response.text().await.map_err(|e| storage_error(&e))?;
            let page = parse_enumeration(&text)?;
            names.extend(page.blobs.blob.into_iter().map(|b| b.name));

            match page.next_marker.filter(|m| !m.is_empty()) {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        names.sort();
        Ok(names)
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        let url = self.signed_blob_url(name)?;
        let response = self.client.get(&url).send().await.map_err(|e| Error::Download {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let response = check(response, |status, body| {
            if status == StatusCode::NOT_FOUND {
                Error::BlobNotFound(name.to_string())
            } else {
                Error::Download {
                    name: name.to_string(),
                    reason: format!("HTTP {status}: {body}"),
                }
            }
        })
        .await?;

        let bytes = response.bytes().await.map_err(|e| Error::Download {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let url = self.signed_blob_url(name)?;
        let response = self.client.delete(&url).send().await.map_err(|e| Error::Delete {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        check(response, |status, body| {
            if status == StatusCode::NOT_FOUND {
                Error::BlobNotFound(name.to_string())
            } else {
                Error::Delete {
                    name: name.to_string(),
                    reason: format!("HTTP {status}: {body}"),
                }
            }
        })
        .await?;

        debug!("Deleted blob {}", name);
        Ok(())
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.account.blob_endpoint(), self.container)
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
        self.account.sign_service(&ServiceSas {
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
        self.account.sign_service(&ServiceSas {
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

fn parse_enumeration(xml: &str) -> Result<EnumerationResults> {
    // The service prefixes its XML bodies with a byte order mark
    quick_xml::de::from_str(xml.trim_start_matches('\u{feff}'))
        .map_err(|e| Error::Storage(format!("invalid blob listing: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enumeration() {
        let xml = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\
            <EnumerationResults ServiceEndpoint=\"https://acme.blob.core.windows.net/\" ContainerName=\"docs\">\
            <Prefix>translated_</Prefix>\
            <Blobs>\
              <Blob><Name>translated_1_fr_a/a.pdf</Name><Properties><Content-Length>3</Content-Length></Properties></Blob>\
              <Blob><Name>translated_1_fr_a/b.pdf</Name><Properties /></Blob>\
            </Blobs>\
            <NextMarker>page2</NextMarker>\
            </EnumerationResults>";

        let page = parse_enumeration(xml).unwrap();
        let names: Vec<_> = page.blobs.blob.into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["translated_1_fr_a/a.pdf", "translated_1_fr_a/b.pdf"]);
        assert_eq!(page.next_marker.as_deref(), Some("page2"));
    }

    #[test]
    fn test_parse_empty_enumeration() {
        let xml = "<EnumerationResults><Blobs /><NextMarker /></EnumerationResults>";
        let page = parse_enumeration(xml).unwrap();
        assert!(page.blobs.blob.is_empty());
        assert!(page.next_marker.unwrap_or_default().is_empty());
    }

    #[test]
    fn test_urls() {
        let store = AzureBlobStore::from_connection_string(
            "AccountName=acme;AccountKey=c2VjcmV0",
            "docs",
        )
        .unwrap();
        assert_eq!(store.container_url(), "https://acme.blob.core.windows.net/docs");
        assert_eq!(
            store.blob_url("b1_fr_my report.pdf"),
            "https://acme.blob.core.windows.net/docs/b1_fr_my%20report.pdf"
        );
        assert_eq!(
            store.blob_url("translated_x/out.pdf"),
            "https://acme.blob.core.windows.net/docs/translated_x/out.pdf"
        );
    }
}
