//! Time-boxed access URLs for blobs and the working container.

use chrono::{Duration, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::warn;

use crate::config::SigningConfig;
use crate::error::Result;
use crate::storage::{BlobStore, SasPermissions};

/// Placeholder handed out when a URL could not be signed
pub const DISABLED_URL: &str = "#";

const OFFICE_VIEWER: &str = "https://view.officeapps.live.com/op/view.aspx?src=";
const OFFICE_EXTENSIONS: [&str; 6] = ["pptx", "ppt", "docx", "doc", "xlsx", "xls"];

// Display names may carry a page reference such as "manual.pdf (p.3)"
#[allow(clippy::expect_used)]
static PAGE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\s*p\.?\s*\d+\s*\)").expect("page suffix pattern is valid"));

/// A signed URL, or the sentinel left behind by a signing failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedUrl {
    Ready(String),
    Disabled { reason: String },
}

impl SignedUrl {
    pub const fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }

    /// The URL, or `#` when disabled
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready(url) => url,
            Self::Disabled { .. } => DISABLED_URL,
        }
    }

    /// Query component of a ready URL (after `?`, before any `#`)
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Ready(url) => url
                .split_once('?')
                .map(|(_, q)| q.split('#').next().unwrap_or(q)),
            Self::Disabled { .. } => None,
        }
    }
}

impl std::fmt::Display for SignedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a blob URL
#[derive(Debug, Clone, Default)]
pub struct BlobUrlOptions {
    /// Page anchor for PDFs (1-based)
    pub page: Option<u32>,
    /// Overrides the configured validity
    pub expiry_hours: Option<u32>,
    /// Defaults to `inline`
    pub content_disposition: Option<String>,
    /// Return the raw signed URL, never a viewer redirect
    pub no_viewer: bool,
    /// Sign `name` as given, without stripping page references
    pub exact_name: bool,
}

impl BlobUrlOptions {
    /// Raw read URL for a stored blob, as handed to the translation service
    pub fn raw() -> Self {
        Self {
            no_viewer: true,
            exact_name: true,
            ..Default::default()
        }
    }
}

/// Builds signed URLs on top of a blob store's signing primitives
pub struct UrlSigner {
    store: Arc<dyn BlobStore>,
    config: SigningConfig,
}

impl UrlSigner {
    pub fn new(store: Arc<dyn BlobStore>, config: SigningConfig) -> Self {
        Self { store, config }
    }

    /// `[now - skew, now + hours]`
    fn window(&self, expiry_hours: Option<u32>) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
        let now = Utc::now();
        let hours = expiry_hours.unwrap_or(self.config.expiry_hours);
        (
            now - Duration::minutes(i64::from(self.config.clock_skew_minutes)),
            now + Duration::hours(i64::from(hours)),
        )
    }

    /// Read-only URL for a single blob.
    ///
    /// PDFs are served inline as `application/pdf`; Office documents are
    /// wrapped in the online viewer unless `no_viewer` is set.
    pub fn blob_url(&self, name: &str, options: &BlobUrlOptions) -> SignedUrl {
        let clean = if options.exact_name {
            name.to_string()
        } else {
            normalize_blob_name(name)
        };
        match self.try_blob_url(&clean, options) {
            Ok(url) => SignedUrl::Ready(url),
            Err(e) => {
                warn!("Failed to sign URL for {}: {}", clean, e);
                SignedUrl::Disabled {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn try_blob_url(&self, clean: &str, options: &BlobUrlOptions) -> Result<String> {
        let (start, expiry) = self.window(options.expiry_hours);
        let is_pdf = extension(clean) == "pdf";

        let (content_type, disposition) = if is_pdf {
            ("application/pdf".to_string(), "inline".to_string())
        } else {
            (
                mime_guess::from_path(clean)
                    .first_raw()
                    .unwrap_or("application/octet-stream")
                    .to_string(),
                options
                    .content_disposition
                    .clone()
                    .unwrap_or_else(|| "inline".to_string()),
            )
        };

        let token = self.store.sign_blob(
            clean,
            SasPermissions::read_only(),
            start,
            expiry,
            Some(&content_type),
            Some(&disposition),
        )?;
        let url = format!("{}?{token}", self.store.blob_url(clean));

        if options.no_viewer {
            return Ok(url);
        }

        let ext = extension(clean);
        if OFFICE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(format!("{OFFICE_VIEWER}{}", urlencoding::encode(&url)))
        } else if let (true, Some(page)) = (is_pdf, options.page) {
            Ok(format!("{url}#page={page}"))
        } else {
            Ok(url)
        }
    }

    /// Read/write/list/delete URL for the whole container
    pub fn container_url(&self, expiry_hours: Option<u32>) -> SignedUrl {
        let (start, expiry) = self.window(expiry_hours);
        match self
            .store
            .sign_container(SasPermissions::read_write_list_delete(), start, expiry)
        {
            Ok(token) => SignedUrl::Ready(format!("{}?{token}", self.store.container_url())),
            Err(e) => {
                warn!("Failed to sign container URL: {}", e);
                SignedUrl::Disabled {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Writable location under `prefix`, reusing the container URL's token
    pub fn output_url(&self, prefix: &str, container: &SignedUrl) -> SignedUrl {
        match container.query() {
            Some(query) => SignedUrl::Ready(format!(
                "{}/{}?{query}",
                self.store.container_url(),
                urlencoding::encode(prefix)
            )),
            None => container.clone(),
        }
    }
}

/// Strip page references like `" (p.12)"` and surrounding whitespace
pub fn normalize_blob_name(name: &str) -> String {
    PAGE_SUFFIX.replace_all(name, "").trim().to_string()
}

fn extension(name: &str) -> String {
    crate::util::extension_of(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn signer() -> (Arc<MemoryBlobStore>, UrlSigner) {
        let store = Arc::new(MemoryBlobStore::new("docs"));
        let signer = UrlSigner::new(store.clone(), SigningConfig::default());
        (store, signer)
    }

    #[test]
    fn test_normalize_blob_name() {
        assert_eq!(normalize_blob_name("manual.pdf (p.3)"), "manual.pdf");
        assert_eq!(normalize_blob_name("manual.pdf ( p 12 )"), "manual.pdf");
        assert_eq!(normalize_blob_name("  plain.docx "), "plain.docx");
        assert_eq!(normalize_blob_name("chapter (part 2).pdf"), "chapter (part 2).pdf");
    }

    #[test]
    fn test_pdf_url_is_inline_with_page_anchor() {
        let (_, signer) = signer();
        let url = signer.blob_url(
            "guide.pdf (p.4)",
            &BlobUrlOptions {
                page: Some(4),
                content_disposition: Some("attachment".into()),
                ..Default::default()
            },
        );

        let s = url.as_str();
        assert!(s.starts_with("https://memory.blob.local/docs/guide.pdf?"));
        assert!(s.contains("rsct=application%2Fpdf"));
        assert!(s.contains("rscd=inline"));
        assert!(s.contains("sp=r&"));
        assert!(s.ends_with("#page=4"));
        assert!(!s.contains("(p.4)"));
    }

    #[test]
    fn test_office_url_wrapped_in_viewer() {
        let (_, signer) = signer();
        let url = signer.blob_url("deck.pptx", &BlobUrlOptions::default());
        assert!(url.as_str().starts_with(OFFICE_VIEWER));
        assert!(url.as_str().contains("https%3A%2F%2Fmemory.blob.local%2Fdocs%2Fdeck.pptx"));

        let raw = signer.blob_url("deck.pptx", &BlobUrlOptions::raw());
        assert!(raw.as_str().starts_with("https://memory.blob.local/docs/deck.pptx?"));
    }

    #[test]
    fn test_raw_url_keeps_page_like_names() {
        let (_, signer) = signer();
        let url = signer.blob_url("b1_fr_Manual (p.3).pdf", &BlobUrlOptions::raw());
        assert!(url
            .as_str()
            .starts_with("https://memory.blob.local/docs/b1_fr_Manual%20%28p.3%29.pdf?"));
    }

    #[test]
    fn test_unknown_type_defaults() {
        let (_, signer) = signer();
        let url = signer.blob_url("blob.unknownext", &BlobUrlOptions::default());
        assert!(url.as_str().contains("rsct=application%2Foctet-stream"));
    }

    #[test]
    fn test_container_and_output_urls() {
        let (_, signer) = signer();
        let container = signer.container_url(None);
        assert!(container.as_str().contains("sr=c"));
        assert!(container.as_str().contains("sp=rwdl"));

        let output = signer.output_url("translated_b1_fr_report", &container);
        assert_eq!(
            output.as_str(),
            format!(
                "https://memory.blob.local/docs/translated_b1_fr_report?{}",
                container.query().unwrap()
            )
        );
    }

    #[test]
    fn test_signing_failure_yields_sentinel() {
        let (store, signer) = signer();
        store.set_fail_signing(true);

        let url = signer.blob_url("a.pdf", &BlobUrlOptions::raw());
        assert!(url.is_disabled());
        assert_eq!(url.as_str(), DISABLED_URL);

        let container = signer.container_url(None);
        assert!(container.is_disabled());
        assert!(signer.output_url("prefix", &container).is_disabled());
    }

    #[test]
    fn test_window_is_backdated() {
        let (_, signer) = signer();
        let before = Utc::now();
        let (start, expiry) = signer.window(Some(2));
        assert!(start <= before - Duration::minutes(15) + Duration::seconds(1));
        assert!(expiry >= before + Duration::hours(2) - Duration::seconds(1));
    }
}
