use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Lang;
use crate::error::Result;

/// Information about a translation backend
#[derive(Debug, Clone)]
pub struct TranslationServiceInfo {
    /// Human-readable name
    pub name: &'static str,
    /// Whether this backend calls out to a remote service
    pub remote: bool,
}

/// Whether a source URL names a single file or a folder of files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    File,
    Folder,
}

/// One output of a translation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationTarget {
    /// Writable location for the translated document
    pub target_url: String,
    pub language: Lang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    /// Readable location of the source document
    pub source_url: String,
    pub storage_kind: StorageKind,
    pub targets: Vec<TranslationTarget>,
}

/// Reference to a submitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationHandle {
    /// Backend-specific operation id (a status URL for the REST backend)
    pub id: String,
    /// Languages requested, in submission order
    pub languages: Vec<Lang>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
}

/// Error reported by the service for one target
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceError {
    pub code: String,
    pub message: String,
}

/// Final state of one target language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub language: Lang,
    pub status: OutcomeStatus,
    /// Present when the target failed
    pub error: Option<ServiceError>,
}

impl TargetOutcome {
    pub const fn succeeded(language: Lang) -> Self {
        Self {
            language,
            status: OutcomeStatus::Succeeded,
            error: None,
        }
    }

    pub fn failed(language: Lang, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            language,
            status: OutcomeStatus::Failed,
            error: Some(ServiceError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// Trait for document translation backends.
///
/// Work runs asynchronously on the service side; `await_result` resolves once
/// every target of the request has reached a final state.
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Get information about this backend
    fn info(&self) -> TranslationServiceInfo;

    /// Get the backend name (convenience method)
    fn name(&self) -> &'static str {
        self.info().name
    }

    /// Start translating the source into every target
    async fn submit(&self, request: &TranslationRequest) -> Result<TranslationHandle>;

    /// Wait for the request to finish and report each target
    async fn await_result(&self, handle: &TranslationHandle) -> Result<Vec<TargetOutcome>>;

    /// Submit and wait
    async fn translate(&self, request: &TranslationRequest) -> Result<Vec<TargetOutcome>> {
        let handle = self.submit(request).await?;
        self.await_result(&handle).await
    }
}
