//! Document Translator Core Library
//!
//! This library provides the core functionality for translating office and PDF
//! documents through a managed document-translation service:
//! - Rejection of encrypted or DRM-protected files before any upload
//! - Temporary blob storage with self-signed access tokens
//! - Batch orchestration of (document × language) tasks with cleanup
//! - Packaging of the translated outputs as a single file or zip archive

pub mod archive;
pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod guard;
pub mod languages;
pub mod orchestrator;
pub mod results;
pub mod signing;
pub mod storage;
pub mod translation;
pub mod util;

pub use batch::{
    BatchArtifact, BatchId, BatchResult, BatchStatus, TaskError, TaskErrorKind, TaskReport,
    TaskStatus, TranslationTask,
};
pub use config::{AppConfig, Lang, TranslatorConfig};
pub use document::{DocumentKind, UploadedDocument, translated_filename};
pub use error::{Error, Result};
pub use guard::{GuardVerdict, classify, is_protected};
pub use languages::{LanguageOption, default_languages, default_target_index};
pub use orchestrator::{BatchOrchestrator, ProgressCallback};
pub use results::BatchResultStore;
pub use signing::{BlobUrlOptions, SignedUrl, UrlSigner};
pub use storage::{AzureBlobStore, BlobStore, MemoryBlobStore};
pub use translation::{
    AzureDocumentTranslator, LoopbackTranslator, TranslationService, create_translation_service,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.storage.container_name, "doc-translator");
        assert_eq!(config.orchestrator.max_concurrent_tasks, 1);
    }
}
