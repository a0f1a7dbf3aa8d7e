use thiserror::Error;

/// Unified error type for doc-translator-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Batch validation and orchestration
/// - Blob storage operations (upload, download, listing, deletion)
/// - Translation service operations (submission, polling, vendor failures)
/// - URL signing and result packaging
/// - Configuration operations (loading, validation)
/// - General I/O operations
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Batch Errors
    // ==========================================================================
    /// The batch request was rejected before any side effect
    #[error("invalid batch request: {0}")]
    Validation(String),

    /// The document is encrypted, DRM-protected or structurally unreadable
    #[error("protected document '{filename}': {reason}")]
    ProtectedDocument { filename: String, reason: String },

    /// A task attempted a state transition the state machine does not allow
    #[error("invalid task transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A failure outside the per-task loop aborted the whole batch
    #[error("batch aborted: {0}")]
    BatchFatal(String),

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    /// Failed to upload a blob
    #[error("upload of '{name}' failed: {reason}")]
    Upload { name: String, reason: String },

    /// Failed to download a blob
    #[error("download of '{name}' failed: {reason}")]
    Download { name: String, reason: String },

    /// Failed to delete a blob
    #[error("delete of '{name}' failed: {reason}")]
    Delete { name: String, reason: String },

    /// Blob does not exist
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Blob already exists and overwrite was not requested
    #[error("blob already exists: {0}")]
    BlobExists(String),

    /// Any other storage backend failure (listing, container provisioning)
    #[error("storage error: {0}")]
    Storage(String),

    // ==========================================================================
    // Translation Errors
    // ==========================================================================
    /// Translation API request failed
    #[error("translation API request failed: {0}")]
    TranslationRequest(String),

    /// Invalid response from translation API
    #[error("invalid translation API response: {0}")]
    TranslationInvalidResponse(String),

    /// The translation service reported a failure for a target
    #[error("translation failed: {code} - {message}")]
    TranslationService { code: String, message: String },

    /// Rate limited by translation API
    #[error("translation rate limited{}", retry_after.map(|s| format!(", retry after {s} seconds")).unwrap_or_default())]
    TranslationRateLimited { retry_after: Option<u64> },

    /// Waiting for the translation operation exceeded the configured limit
    #[error("translation request timed out")]
    TranslationTimeout,

    /// Maximum retry attempts exceeded for translation
    #[error("translation failed after maximum retries")]
    TranslationMaxRetriesExceeded,

    /// The service reported success but no output blob was found
    #[error("translation succeeded but no result was found under '{0}'")]
    ResultMissing(String),

    // ==========================================================================
    // Signing & Packaging Errors
    // ==========================================================================
    /// Failed to produce a signed access token
    #[error("failed to sign URL for '{resource}': {reason}")]
    Signing { resource: String, reason: String },

    /// Failed to build the result archive
    #[error("failed to build archive: {0}")]
    Archive(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    /// Missing required configuration field
    #[error("missing required config field: {0}")]
    ConfigMissing(String),

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}
