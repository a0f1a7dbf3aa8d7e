//! Batch and task model: identifiers, the per-task state machine and the
//! terminal result handed back to callers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::Lang;
use crate::document::UploadedDocument;
use crate::error::{Error, Result};

/// Identifier shared by every task of one submission.
///
/// Reusing an id resubmits the batch under the same deterministic blob names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(uuid::Uuid);

impl BatchId {
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self> {
        uuid::Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::Validation(format!("invalid batch id '{s}': {e}")))
    }

    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new_v4()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<uuid::Uuid> for BatchId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Uploaded,
    Translating,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Translating => "translating",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Forward edges of the task lifecycle
    const fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Uploaded)
                | (Self::Uploaded, Self::Translating)
                | (Self::Translating, Self::Succeeded)
                | (Self::Pending | Self::Uploaded | Self::Translating, Self::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a task failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    ProtectedDocument,
    Upload,
    Signing,
    TranslationService,
    ResultMissing,
    Unhandled,
}

impl From<&Error> for TaskErrorKind {
    fn from(e: &Error) -> Self {
        match e {
            Error::ProtectedDocument { .. } => Self::ProtectedDocument,
            Error::Upload { .. } | Error::BlobExists(_) => Self::Upload,
            Error::Signing { .. } => Self::Signing,
            Error::TranslationService { .. } => Self::TranslationService,
            Error::ResultMissing(_) => Self::ResultMissing,
            _ => Self::Unhandled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl From<&Error> for TaskError {
    fn from(e: &Error) -> Self {
        Self {
            kind: TaskErrorKind::from(e),
            message: e.to_string(),
        }
    }
}

impl From<Error> for TaskError {
    fn from(e: Error) -> Self {
        Self::from(&e)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One (document, target language) pair of a batch
#[derive(Debug, Clone)]
pub struct TranslationTask {
    batch_id: BatchId,
    document_index: usize,
    filename: String,
    source_blob: String,
    output_prefix: String,
    language: Lang,
    status: TaskStatus,
    error: Option<TaskError>,
    result: Option<Bytes>,
    finalized_filename: Option<String>,
}

impl TranslationTask {
    pub fn new(
        batch_id: BatchId,
        document_index: usize,
        document: &UploadedDocument,
        language: Lang,
    ) -> Self {
        let source_blob = format!("{batch_id}_{language}_{}", document.filename());
        let output_prefix = format!("translated_{batch_id}_{language}_{}", document.basename());
        Self {
            batch_id,
            document_index,
            filename: document.filename().to_string(),
            source_blob,
            output_prefix,
            language,
            status: TaskStatus::Pending,
            error: None,
            result: None,
            finalized_filename: None,
        }
    }

    pub const fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub const fn document_index(&self) -> usize {
        self.document_index
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// `{batch_id}_{lang}_{filename}`
    pub fn source_blob(&self) -> &str {
        &self.source_blob
    }

    /// `translated_{batch_id}_{lang}_{basename}`
    pub fn output_prefix(&self) -> &str {
        &self.output_prefix
    }

    pub const fn language(&self) -> &Lang {
        &self.language
    }

    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    pub const fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    pub const fn result(&self) -> Option<&Bytes> {
        self.result.as_ref()
    }

    pub fn finalized_filename(&self) -> Option<&str> {
        self.finalized_filename.as_deref()
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.allows(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_uploaded(&mut self) -> Result<()> {
        self.transition(TaskStatus::Uploaded)
    }

    pub fn mark_translating(&mut self) -> Result<()> {
        self.transition(TaskStatus::Translating)
    }

    /// Record the downloaded output and its delivery filename
    pub fn succeed(&mut self, bytes: Bytes, finalized_filename: String) -> Result<()> {
        self.transition(TaskStatus::Succeeded)?;
        self.result = Some(bytes);
        self.finalized_filename = Some(finalized_filename);
        Ok(())
    }

    pub fn fail(&mut self, error: TaskError) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Byte-free summary for callers
    pub fn report(&self) -> TaskReport {
        TaskReport {
            filename: self.filename.clone(),
            language: self.language.clone(),
            status: self.status,
            error: self.error.clone(),
            finalized_filename: self.finalized_filename.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub filename: String,
    pub language: Lang,
    pub status: TaskStatus,
    pub error: Option<TaskError>,
    pub finalized_filename: Option<String>,
}

impl TaskReport {
    /// `"{filename} [{lang}]: {message}"`
    pub fn error_line(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| format!("{} [{}]: {}", self.filename, self.language, e.message))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Failure,
}

/// The deliverable of a successful batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchArtifact {
    pub bytes: Bytes,
    pub filename: String,
    /// Zip of several outputs rather than a single translated file
    pub is_archive: bool,
}

/// Terminal outcome of a batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub artifact: Option<BatchArtifact>,
    pub errors: Vec<String>,
    pub tasks: Vec<TaskReport>,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Success
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(TaskStatus::Succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(lang: &str) -> TranslationTask {
        let id = BatchId::parse("7f1c2d3e-4a5b-4c6d-8e9f-0a1b2c3d4e5f").unwrap();
        let doc = UploadedDocument::from_bytes("report.pdf", b"%PDF-1.4".to_vec());
        TranslationTask::new(id, 0, &doc, Lang::from(lang))
    }

    #[test]
    fn test_blob_names() {
        let t = task("zh-Hans");
        assert_eq!(
            t.source_blob(),
            "7f1c2d3e-4a5b-4c6d-8e9f-0a1b2c3d4e5f_zh-Hans_report.pdf"
        );
        assert_eq!(
            t.output_prefix(),
            "translated_7f1c2d3e-4a5b-4c6d-8e9f-0a1b2c3d4e5f_zh-Hans_report"
        );
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut t = task("fr");
        t.mark_uploaded().unwrap();
        t.mark_translating().unwrap();
        t.succeed(Bytes::from_static(b"out"), "report_FR.pdf".into()).unwrap();

        assert_eq!(t.status(), TaskStatus::Succeeded);
        assert_eq!(t.finalized_filename(), Some("report_FR.pdf"));
        assert!(t.error().is_none());
    }

    #[test]
    fn test_skipped_transition_rejected() {
        let mut t = task("fr");
        assert!(matches!(
            t.mark_translating(),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(t
            .succeed(Bytes::new(), "x".into())
            .is_err());
        assert_eq!(t.status(), TaskStatus::Pending);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut t = task("fr");
        let err = TaskError {
            kind: TaskErrorKind::ProtectedDocument,
            message: "encrypted".into(),
        };
        t.fail(err.clone()).unwrap();
        assert!(t.fail(err).is_err());
        assert!(t.mark_uploaded().is_err());

        let report = t.report();
        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(
            report.error_line().unwrap(),
            "report.pdf [fr]: encrypted"
        );
    }

    #[test]
    fn test_error_classification() {
        let e = Error::TranslationService {
            code: "InvalidRequest".into(),
            message: "bad".into(),
        };
        assert_eq!(TaskErrorKind::from(&e), TaskErrorKind::TranslationService);
        assert_eq!(
            TaskErrorKind::from(&Error::ResultMissing("p".into())),
            TaskErrorKind::ResultMissing
        );
        assert_eq!(
            TaskErrorKind::from(&Error::Storage("x".into())),
            TaskErrorKind::Unhandled
        );
    }

    #[test]
    fn test_batch_id_parse() {
        assert!(BatchId::parse("not-a-uuid").is_err());
        let id = BatchId::new_v4();
        assert_eq!(BatchId::parse(&id.to_string()).unwrap(), id);
    }
}
