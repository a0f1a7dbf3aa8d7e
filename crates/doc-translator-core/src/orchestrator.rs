//! Batch orchestration: upload → translate → fetch → cleanup → deliver.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};

use crate::archive::{archive_filename, build_zip};
use crate::batch::{
    BatchArtifact, BatchId, BatchResult, BatchStatus, TaskError, TaskErrorKind, TaskReport,
    TranslationTask,
};
use crate::config::{AppConfig, Lang};
use crate::document::UploadedDocument;
use crate::error::{Error, Result};
use crate::guard::{self, GuardVerdict};
use crate::results::BatchResultStore;
use crate::signing::{BlobUrlOptions, SignedUrl, UrlSigner};
use crate::storage::{AzureBlobStore, BlobStore};
use crate::translation::{
    OutcomeStatus, StorageKind, TranslationRequest, TranslationService, TranslationTarget,
    create_translation_service,
};

const PROTECTED_MESSAGE: &str = "DRM/encrypted document cannot be translated";

/// Called with `(completed, total)` each time a task reaches a final state
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Drives batches of (document × language) tasks against a blob store and a
/// translation service, and keeps the terminal result of each batch.
pub struct BatchOrchestrator {
    store: Arc<dyn BlobStore>,
    translator: Arc<dyn TranslationService>,
    signer: UrlSigner,
    results: BatchResultStore,
    config: AppConfig,
    progress: Option<ProgressCallback>,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn BlobStore>,
        translator: Arc<dyn TranslationService>,
        config: AppConfig,
    ) -> Self {
        Self {
            signer: UrlSigner::new(store.clone(), config.signing.clone()),
            results: BatchResultStore::new(&config.results),
            store,
            translator,
            config,
            progress: None,
        }
    }

    /// Create the Azure-backed orchestrator described by `config`
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let connection_string = config
            .storage
            .connection_string
            .as_deref()
            .ok_or_else(|| Error::ConfigMissing("storage.connection_string".to_string()))?;

        let store = AzureBlobStore::from_connection_string(
            connection_string,
            config.storage.container_name.clone(),
        )?;
        let translator = create_translation_service(&config.translator)?;

        Ok(Self::new(Arc::new(store), translator, config))
    }

    #[must_use]
    pub fn with_progress(mut self, callback: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn translator_name(&self) -> &'static str {
        self.translator.name()
    }

    pub const fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Stored result of a finished batch
    pub async fn result(&self, batch_id: &BatchId) -> Option<Arc<BatchResult>> {
        self.results.get(batch_id).await
    }

    /// Drop the stored result of a batch
    pub async fn forget(&self, batch_id: &BatchId) -> Option<Arc<BatchResult>> {
        self.results.remove(batch_id).await
    }

    /// Translate every document into every language.
    ///
    /// Request validation errors are returned as `Err` with no side effects.
    /// Every other outcome, including total failure, is an `Ok` result that is
    /// also stored under `batch_id`. Reusing a `batch_id` retries every task of
    /// the batch under the same blob names.
    pub async fn submit(
        &self,
        batch_id: BatchId,
        documents: &[UploadedDocument],
        languages: &[Lang],
    ) -> Result<Arc<BatchResult>> {
        let languages = validate_request(documents, languages)?;

        if self.results.remove(&batch_id).await.is_some() {
            debug!("Cleared previous result of batch {}", batch_id);
        }

        info!(
            "Batch {}: {} document(s) x {} language(s) with {}",
            batch_id,
            documents.len(),
            languages.len(),
            self.translator.name()
        );

        if let Err(e) = self.store.ensure_container().await {
            error!("Batch {} aborted, container unavailable: {}", batch_id, e);
            return Ok(self
                .finish(BatchResult {
                    batch_id,
                    status: BatchStatus::Failure,
                    artifact: None,
                    errors: vec![Error::BatchFatal(e.to_string()).to_string()],
                    tasks: Vec::new(),
                })
                .await);
        }

        let work = plan_tasks(batch_id, documents, &languages)?;
        let tasks = self.run_tasks(work).await;
        let result = assemble(batch_id, &tasks);

        Ok(self.finish(result).await)
    }

    async fn finish(&self, result: BatchResult) -> Arc<BatchResult> {
        info!(
            "Batch {} finished: {:?}, {} succeeded, {} failed",
            result.batch_id,
            result.status,
            result.succeeded_count(),
            result.failed_count()
        );
        self.results.insert(result).await
    }

    async fn run_tasks(&self, work: Vec<(TranslationTask, Option<Bytes>)>) -> Vec<TranslationTask> {
        let total = work.len();
        let completed = AtomicUsize::new(0);
        let concurrency = self.config.orchestrator.max_concurrent_tasks.max(1);

        stream::iter(work)
            .map(|(task, bytes)| {
                let completed = &completed;
                async move {
                    let task = self.run_task(task, bytes).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref callback) = self.progress {
                        callback(done, total);
                    }
                    task
                }
            })
            .buffered(concurrency)
            .collect()
            .await
    }

    /// Never fails: any error becomes the task's failure
    async fn run_task(&self, mut task: TranslationTask, bytes: Option<Bytes>) -> TranslationTask {
        if task.status().is_terminal() {
            return task;
        }

        let outcome = match bytes {
            Some(bytes) => self.process(&mut task, bytes).await,
            None => Err(Error::Validation(format!(
                "no content for {}",
                task.filename()
            ))),
        };

        match outcome {
            Ok(()) => info!(
                "Task {} [{}] succeeded",
                task.filename(),
                task.language()
            ),
            Err(e) => {
                warn!(
                    "Task {} [{}] failed while {}: {}",
                    task.filename(),
                    task.language(),
                    task.status(),
                    e
                );
                if let Err(transition) = task.fail(TaskError::from(&e)) {
                    error!("Could not record failure of {}: {}", task.filename(), transition);
                }
            }
        }
        task
    }

    async fn process(&self, task: &mut TranslationTask, bytes: Bytes) -> Result<()> {
        let source_blob = task.source_blob().to_string();
        let prefix = task.output_prefix().to_string();

        // Deterministic names plus overwrite keep retries from piling up blobs
        self.store
            .upload(&source_blob, bytes, true)
            .await
            .map_err(|e| match e {
                Error::Upload { .. } => e,
                other => Error::Upload {
                    name: source_blob.clone(),
                    reason: other.to_string(),
                },
            })?;
        task.mark_uploaded()?;
        info!("Uploaded {} as {}", task.filename(), source_blob);

        let source_url = ready(
            self.signer.blob_url(&source_blob, &BlobUrlOptions::raw()),
            &source_blob,
        )?;
        let container = self.signer.container_url(None);
        let target_url = ready(self.signer.output_url(&prefix, &container), &prefix)?;

        let request = TranslationRequest {
            source_url,
            storage_kind: StorageKind::File,
            targets: vec![TranslationTarget {
                target_url,
                language: task.language().clone(),
            }],
        };
        let handle = self.translator.submit(&request).await?;
        task.mark_translating()?;
        info!("Translating {} into {}", task.filename(), task.language());

        let outcomes = self.translator.await_result(&handle).await?;
        let outcome = outcomes
            .iter()
            .find(|o| o.language == *task.language())
            .or_else(|| outcomes.first())
            .ok_or_else(|| {
                Error::TranslationInvalidResponse("no outcome for the requested target".to_string())
            })?;

        if outcome.status != OutcomeStatus::Succeeded {
            // Source and any partial output stay in place for inspection
            let (code, message) = outcome.error.as_ref().map_or_else(
                || ("Unknown".to_string(), "Unknown Error".to_string()),
                |e| (e.code.clone(), e.message.clone()),
            );
            return Err(Error::TranslationService { code, message });
        }

        let outputs = self.output_blobs(&prefix).await?;
        let first = outputs
            .first()
            .ok_or_else(|| Error::ResultMissing(prefix.clone()))?;
        let data = self
            .store
            .download(first)
            .await
            .map_err(|e| Error::Download {
                name: first.clone(),
                reason: e.to_string(),
            })?;

        for name in &outputs {
            self.delete(name).await?;
        }
        self.delete(&source_blob).await?;
        debug!("Removed {} temporary blob(s) for {}", outputs.len() + 1, task.filename());

        let filename = crate::document::translated_filename(task.filename(), task.language());
        task.succeed(Bytes::from(data), filename)
    }

    /// The output written at `prefix` itself or inside the `prefix/` folder
    async fn output_blobs(&self, prefix: &str) -> Result<Vec<String>> {
        let folder = format!("{prefix}/");
        Ok(self
            .store
            .list(prefix)
            .await?
            .into_iter()
            .filter(|name| name == prefix || name.starts_with(&folder))
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.store.delete(name).await.map_err(|e| Error::Delete {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

fn ready(url: SignedUrl, resource: &str) -> Result<String> {
    match url {
        SignedUrl::Ready(url) => Ok(url),
        SignedUrl::Disabled { reason } => Err(Error::Signing {
            resource: resource.to_string(),
            reason,
        }),
    }
}

/// Reject unusable requests; returns the languages with duplicates removed,
/// first occurrence winning
fn validate_request(documents: &[UploadedDocument], languages: &[Lang]) -> Result<Vec<Lang>> {
    if languages.is_empty() {
        return Err(Error::Validation(
            "at least one target language is required".to_string(),
        ));
    }
    if documents.is_empty() {
        return Err(Error::Validation(
            "at least one document is required".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for doc in documents {
        if !names.insert(doc.filename()) {
            return Err(Error::Validation(format!(
                "duplicate document name '{}'",
                doc.filename()
            )));
        }
    }

    // Languages sharing a filename suffix (`fr`/`FR`) would produce the same output name
    let mut seen = HashSet::new();
    Ok(languages
        .iter()
        .filter(|lang| {
            let first = seen.insert(lang.filename_suffix());
            if !first {
                debug!("Dropping duplicate target language {}", lang);
            }
            first
        })
        .cloned()
        .collect())
}

/// One task per (document, language), in document-major order. Tasks of a
/// protected document start out failed and carry no bytes.
fn plan_tasks(
    batch_id: BatchId,
    documents: &[UploadedDocument],
    languages: &[Lang],
) -> Result<Vec<(TranslationTask, Option<Bytes>)>> {
    let mut work = Vec::with_capacity(documents.len() * languages.len());

    for (index, document) in documents.iter().enumerate() {
        let verdict = guard::classify(document);
        if let GuardVerdict::Protected(ref reason) | GuardVerdict::Unreadable(ref reason) = verdict {
            warn!("Skipping protected document {}: {}", document.filename(), reason);
        }
        let bytes = (!verdict.is_protected()).then(|| document.shared_bytes());

        for language in languages {
            let mut task = TranslationTask::new(batch_id, index, document, language.clone());
            if bytes.is_none() {
                task.fail(TaskError {
                    kind: TaskErrorKind::ProtectedDocument,
                    message: PROTECTED_MESSAGE.to_string(),
                })?;
            }
            work.push((task, bytes.clone()));
        }
    }

    Ok(work)
}

/// Build the terminal result from finished tasks
fn assemble(batch_id: BatchId, tasks: &[TranslationTask]) -> BatchResult {
    let reports: Vec<TaskReport> = tasks.iter().map(TranslationTask::report).collect();
    let mut errors: Vec<String> = reports.iter().filter_map(TaskReport::error_line).collect();

    let succeeded: Vec<(&str, &Bytes)> = tasks
        .iter()
        .filter_map(|t| Some((t.finalized_filename()?, t.result()?)))
        .collect();

    let artifact = match succeeded.as_slice() {
        [] => None,
        [(filename, bytes)] => Some(BatchArtifact {
            bytes: (*bytes).clone(),
            filename: (*filename).to_string(),
            is_archive: false,
        }),
        many => match build_zip(many.iter().map(|(name, bytes)| (*name, &bytes[..]))) {
            Ok(zip) => Some(BatchArtifact {
                bytes: Bytes::from(zip),
                filename: archive_filename(chrono::Local::now()),
                is_archive: true,
            }),
            Err(e) => {
                error!("Batch {} aborted, packaging failed: {}", batch_id, e);
                errors.push(Error::BatchFatal(e.to_string()).to_string());
                return BatchResult {
                    batch_id,
                    status: BatchStatus::Failure,
                    artifact: None,
                    errors,
                    tasks: reports,
                };
            }
        },
    };

    BatchResult {
        batch_id,
        status: if artifact.is_some() {
            BatchStatus::Success
        } else {
            BatchStatus::Failure
        },
        artifact,
        errors,
        tasks: reports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::TaskStatus;

    fn doc(name: &str) -> UploadedDocument {
        UploadedDocument::from_bytes(name, b"plain text".to_vec())
    }

    #[test]
    fn test_validate_request() {
        let docs = [doc("a.txt")];
        assert!(matches!(
            validate_request(&docs, &[]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_request(&[], &[Lang::from("fr")]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_request(&[doc("a.txt"), doc("a.txt")], &[Lang::from("fr")]),
            Err(Error::Validation(_))
        ));

        let langs = validate_request(
            &docs,
            &[Lang::from("fr"), Lang::from("de"), Lang::from("fr")],
        )
        .unwrap();
        assert_eq!(langs, vec![Lang::from("fr"), Lang::from("de")]);
    }

    #[test]
    fn test_languages_with_same_suffix_collapse() {
        let langs = validate_request(
            &[doc("a.txt")],
            &[Lang::from("fr"), Lang::from("FR"), Lang::from("zh-Hans"), Lang::from("cn")],
        )
        .unwrap();
        assert_eq!(langs, vec![Lang::from("fr"), Lang::from("zh-Hans")]);
    }

    #[test]
    fn test_plan_marks_protected_documents() {
        let docs = [
            doc("a.txt"),
            UploadedDocument::from_bytes("locked.docx", b"\xD0\xCF\x11\xE0".to_vec()),
        ];
        let langs = [Lang::from("fr"), Lang::from("ja")];
        let work = plan_tasks(BatchId::new_v4(), &docs, &langs).unwrap();

        assert_eq!(work.len(), 4);
        assert!(work[..2].iter().all(|(t, b)| t.status() == TaskStatus::Pending && b.is_some()));
        for (task, bytes) in &work[2..] {
            assert!(bytes.is_none());
            assert_eq!(task.status(), TaskStatus::Failed);
            assert_eq!(task.error().unwrap().kind, TaskErrorKind::ProtectedDocument);
        }
    }

    #[test]
    fn test_assemble_without_success_is_failure() {
        let docs = [UploadedDocument::from_bytes("x.pdf", b"junk".to_vec())];
        let id = BatchId::new_v4();
        let tasks: Vec<_> = plan_tasks(id, &docs, &[Lang::from("fr")])
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();

        let result = assemble(id, &tasks);
        assert_eq!(result.status, BatchStatus::Failure);
        assert!(result.artifact.is_none());
        assert_eq!(
            result.errors,
            vec![format!("x.pdf [fr]: {PROTECTED_MESSAGE}")]
        );
    }

    #[test]
    fn test_ready_rejects_sentinel() {
        let err = ready(
            SignedUrl::Disabled {
                reason: "no key".into(),
            },
            "blob",
        )
        .unwrap_err();
        assert_eq!(TaskErrorKind::from(&err), TaskErrorKind::Signing);
    }
}
