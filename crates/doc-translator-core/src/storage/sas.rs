//! Shared access signatures for Azure Blob Storage.
//!
//! Tokens are HMAC-SHA256 signatures over a canonical string-to-sign, keyed
//! with the storage account key. Only the fields this crate uses are
//! populated; the rest stay empty in the string-to-sign as the format requires.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Storage service version the tokens are signed for
pub const SAS_VERSION: &str = "2022-11-02";

/// Well-known key of the local storage emulator
const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Permission set of a token. Rendered in the canonical `racwdl` order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SasPermissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl SasPermissions {
    pub const fn read_only() -> Self {
        Self {
            read: true,
            add: false,
            create: false,
            write: false,
            delete: false,
            list: false,
        }
    }

    /// What the translation service needs on its output container
    pub const fn read_write_list_delete() -> Self {
        Self {
            read: true,
            add: false,
            create: false,
            write: true,
            delete: true,
            list: true,
        }
    }

    /// Everything blob operations of this crate need
    pub const fn all() -> Self {
        Self {
            read: true,
            add: true,
            create: true,
            write: true,
            delete: true,
            list: true,
        }
    }

    pub fn as_str(&self) -> String {
        [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.list, 'l'),
        ]
        .iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, c)| *c)
        .collect()
    }
}

/// Resource a service SAS grants access to
#[derive(Debug, Clone, Copy)]
pub enum SasResource<'a> {
    Blob { container: &'a str, blob: &'a str },
    Container { container: &'a str },
}

impl SasResource<'_> {
    const fn code(&self) -> &'static str {
        match self {
            Self::Blob { .. } => "b",
            Self::Container { .. } => "c",
        }
    }
}

/// Parameters of a service SAS
#[derive(Debug, Clone)]
pub struct ServiceSas<'a> {
    pub resource: SasResource<'a>,
    pub permissions: SasPermissions,
    pub start: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    /// `rsct`: Content-Type served with the blob
    pub content_type: Option<&'a str>,
    /// `rscd`: Content-Disposition served with the blob
    pub content_disposition: Option<&'a str>,
}

/// Storage account credentials parsed from a connection string
#[derive(Clone)]
pub struct StorageAccount {
    name: String,
    key: Vec<u8>,
    blob_endpoint: String,
}

impl StorageAccount {
    pub fn new(name: impl Into<String>, key_base64: &str, blob_endpoint: impl Into<String>) -> Result<Self> {
        let key = BASE64
            .decode(key_base64.trim())
            .map_err(|e| Error::ConfigInvalid {
                field: "AccountKey".to_string(),
                reason: format!("not valid base64: {e}"),
            })?;

        Ok(Self {
            name: name.into(),
            key,
            blob_endpoint: blob_endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    /// Parse `DefaultEndpointsProtocol=https;AccountName=..;AccountKey=..;EndpointSuffix=..`.
    ///
    /// `BlobEndpoint` overrides the derived endpoint; `UseDevelopmentStorage=true`
    /// selects the local emulator.
    pub fn from_connection_string(conn: &str) -> Result<Self> {
        let mut protocol = "https";
        let mut suffix = "core.windows.net";
        let mut name = None;
        let mut key = None;
        let mut endpoint = None;

        for part in conn.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((k, v)) = part.split_once('=') else {
                return Err(Error::ConfigInvalid {
                    field: "connection_string".to_string(),
                    reason: format!("malformed segment '{part}'"),
                });
            };
            match k {
                "DefaultEndpointsProtocol" => protocol = v,
                "EndpointSuffix" => suffix = v,
                "AccountName" => name = Some(v),
                // base64 keys end in '=' padding; split_once keeps it in `v`
                "AccountKey" => key = Some(v),
                "BlobEndpoint" => endpoint = Some(v.to_string()),
                "UseDevelopmentStorage" if v.eq_ignore_ascii_case("true") => {
                    return Self::new(DEV_ACCOUNT_NAME, DEV_ACCOUNT_KEY, DEV_BLOB_ENDPOINT);
                }
                _ => {}
            }
        }

        let name = name.ok_or_else(|| Error::ConfigInvalid {
            field: "connection_string".to_string(),
            reason: "AccountName is missing".to_string(),
        })?;
        let key = key.ok_or_else(|| Error::ConfigInvalid {
            field: "connection_string".to_string(),
            reason: "AccountKey is missing".to_string(),
        })?;
        let endpoint = endpoint.unwrap_or_else(|| format!("{protocol}://{name}.blob.{suffix}"));

        Self::new(name, key, endpoint)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URL of the blob service, without trailing slash
    pub fn blob_endpoint(&self) -> &str {
        &self.blob_endpoint
    }

    /// Sign a service SAS and return the query string (without leading `?`)
    pub fn sign_service(&self, sas: &ServiceSas<'_>) -> Result<String> {
        let canonical = match sas.resource {
            SasResource::Blob { container, blob } => {
                format!("/blob/{}/{container}/{blob}", self.name)
            }
            SasResource::Container { container } => format!("/blob/{}/{container}", self.name),
        };

        let permissions = sas.permissions.as_str();
        let start = format_time(sas.start);
        let expiry = format_time(sas.expiry);
        let resource = sas.resource.code();
        let disposition = sas.content_disposition.unwrap_or("");
        let content_type = sas.content_type.unwrap_or("");

        let fields: [&str; 16] = [
            permissions.as_str(),
            &start,
            &expiry,
            &canonical,
            "", // signed identifier
            "", // signed IP
            "", // signed protocol
            SAS_VERSION,
            resource,
            "", // snapshot time
            "", // encryption scope
            "", // rscc
            disposition,
            "", // rsce
            "", // rscl
            content_type,
        ];
        let string_to_sign = fields.join("\n");

        let signature = self.sign(&string_to_sign, &canonical)?;

        let mut params = vec![
            ("sv", SAS_VERSION.to_string()),
            ("st", start),
            ("se", expiry),
            ("sr", resource.to_string()),
            ("sp", permissions),
        ];
        if let Some(d) = sas.content_disposition {
            params.push(("rscd", d.to_string()));
        }
        if let Some(t) = sas.content_type {
            params.push(("rsct", t.to_string()));
        }
        params.push(("sig", signature));

        Ok(encode_query(&params))
    }

    /// Sign an account SAS for the blob service.
    ///
    /// `resource_types` is a subset of `sco` (service, container, object).
    pub fn sign_account(
        &self,
        permissions: SasPermissions,
        resource_types: &str,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<String> {
        let permissions = permissions.as_str();
        let start = format_time(start);
        let expiry = format_time(expiry);

        let string_to_sign = format!(
            "{}\n{permissions}\nb\n{resource_types}\n{start}\n{expiry}\n\n\n{SAS_VERSION}\n\n",
            self.name
        );
        let signature = self.sign(&string_to_sign, self.name())?;

        Ok(encode_query(&[
            ("sv", SAS_VERSION.to_string()),
            ("ss", "b".to_string()),
            ("srt", resource_types.to_string()),
            ("sp", permissions),
            ("st", start),
            ("se", expiry),
            ("sig", signature),
        ]))
    }

    fn sign(&self, string_to_sign: &str, resource: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|e| Error::Signing {
            resource: resource.to_string(),
            reason: e.to_string(),
        })?;
        mac.update(string_to_sign.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAccount")
            .field("name", &self.name)
            .field("blob_endpoint", &self.blob_endpoint)
            .finish_non_exhaustive()
    }
}

/// ISO 8601 at second precision, as the service expects
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
