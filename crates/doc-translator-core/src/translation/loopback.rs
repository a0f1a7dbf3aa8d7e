use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::traits::{
    TargetOutcome, TranslationHandle, TranslationRequest, TranslationService,
    TranslationServiceInfo,
};
use crate::config::Lang;
use crate::error::{Error, Result};
use crate::storage::BlobStore;

/// Offline translation backend working directly against a blob store.
///
/// "Translating" copies the source blob to `{target prefix}/{source name}`,
/// so the rest of the pipeline (listing, download, cleanup) runs unchanged.
/// Individual languages can be scripted to fail or to report success without
/// writing any output.
pub struct LoopbackTranslator {
    store: Arc<dyn BlobStore>,
    failures: HashMap<Lang, (String, String)>,
    missing_output: HashSet<Lang>,
    pending: Mutex<HashMap<String, TranslationRequest>>,
}

impl LoopbackTranslator {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            failures: HashMap::new(),
            missing_output: HashSet::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Report `lang` as failed with the given service error
    #[must_use]
    pub fn with_failure(
        mut self,
        lang: impl Into<Lang>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.failures
            .insert(lang.into(), (code.into(), message.into()));
        self
    }

    /// Report `lang` as succeeded but write nothing
    #[must_use]
    pub fn without_output(mut self, lang: impl Into<Lang>) -> Self {
        self.missing_output.insert(lang.into());
        self
    }

    /// Map a URL issued for this store back to a blob name
    fn blob_name(&self, url: &str) -> Result<String> {
        let base = format!("{}/", self.store.container_url());
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let encoded = path.strip_prefix(&base).ok_or_else(|| {
            Error::TranslationRequest(format!("URL outside the working container: {path}"))
        })?;
        urlencoding::decode(encoded)
            .map(|name| name.into_owned())
            .map_err(|e| Error::TranslationRequest(e.to_string()))
    }

    async fn run(&self, request: &TranslationRequest) -> Result<Vec<TargetOutcome>> {
        let source = self.blob_name(&request.source_url)?;
        let data = Bytes::from(self.store.download(&source).await?);
        let file_name = source.rsplit('/').next().unwrap_or(&source).to_string();

        let mut outcomes = Vec::with_capacity(request.targets.len());
        for target in &request.targets {
            if let Some((code, message)) = self.failures.get(&target.language) {
                outcomes.push(TargetOutcome::failed(target.language.clone(), code, message));
                continue;
            }

            if !self.missing_output.contains(&target.language) {
                let prefix = self.blob_name(&target.target_url)?;
                let output = format!("{prefix}/{file_name}");
                debug!("Loopback copy {} -> {}", source, output);
                self.store.upload(&output, data.clone(), true).await?;
            }
            outcomes.push(TargetOutcome::succeeded(target.language.clone()));
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl TranslationService for LoopbackTranslator {
    fn info(&self) -> TranslationServiceInfo {
        TranslationServiceInfo {
            name: "Loopback",
            remote: false,
        }
    }

    async fn submit(&self, request: &TranslationRequest) -> Result<TranslationHandle> {
        let id = uuid::Uuid::new_v4().to_string();
        self.pending.lock().await.insert(id.clone(), request.clone());
        Ok(TranslationHandle {
            id,
            languages: request.targets.iter().map(|t| t.language.clone()).collect(),
        })
    }

    async fn await_result(&self, handle: &TranslationHandle) -> Result<Vec<TargetOutcome>> {
        let request = self
            .pending
            .lock()
            .await
            .remove(&handle.id)
            .ok_or_else(|| {
                Error::TranslationInvalidResponse(format!("unknown operation {}", handle.id))
            })?;
        self.run(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;
    use crate::translation::{OutcomeStatus, StorageKind, TranslationTarget};

    fn request(store: &MemoryBlobStore, langs: &[&str]) -> TranslationRequest {
        let base = store.container_url();
        TranslationRequest {
            source_url: format!("{base}/b1_fr_my%20report.pdf?sv=x&sig=y"),
            storage_kind: StorageKind::File,
            targets: langs
                .iter()
                .map(|l| TranslationTarget {
                    target_url: format!("{base}/translated_b1_{l}_my%20report?sp=rwdl"),
                    language: Lang::from(*l),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_copies_source_under_prefix() {
        let store = Arc::new(MemoryBlobStore::new("work"));
        store.insert("b1_fr_my report.pdf", b"%PDF-1.4".to_vec()).await;

        let translator = LoopbackTranslator::new(store.clone());
        let outcomes = translator.translate(&request(&store, &["fr"])).await.unwrap();

        assert_eq!(outcomes, vec![TargetOutcome::succeeded(Lang::from("fr"))]);
        let copied = store.get("translated_b1_fr_my report/b1_fr_my report.pdf").await;
        assert_eq!(copied.as_deref(), Some(&b"%PDF-1.4"[..]));
    }

    #[tokio::test]
    async fn test_scripted_failure_and_missing_output() {
        let store = Arc::new(MemoryBlobStore::new("work"));
        store.insert("b1_fr_my report.pdf", b"data".to_vec()).await;

        let translator = LoopbackTranslator::new(store.clone())
            .with_failure("de", "UnsupportedLanguage", "nope")
            .without_output("ja");
        let outcomes = translator
            .translate(&request(&store, &["de", "ja"]))
            .await
            .unwrap();

        assert_eq!(outcomes[0].status, OutcomeStatus::Failed);
        assert_eq!(outcomes[0].error.as_ref().unwrap().code, "UnsupportedLanguage");
        assert_eq!(outcomes[1].status, OutcomeStatus::Succeeded);
        assert_eq!(store.names().await, vec!["b1_fr_my report.pdf"]);
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let translator = LoopbackTranslator::new(Arc::new(MemoryBlobStore::default()));
        let handle = TranslationHandle {
            id: "missing".into(),
            languages: vec![],
        };
        assert!(translator.await_result(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_foreign_url_rejected() {
        let store = Arc::new(MemoryBlobStore::default());
        let translator = LoopbackTranslator::new(store);
        let mut req = request(&MemoryBlobStore::new("elsewhere"), &["fr"]);
        req.source_url = "https://other.example/x.pdf".into();
        assert!(matches!(
            translator.translate(&req).await,
            Err(Error::TranslationRequest(_))
        ));
    }
}
