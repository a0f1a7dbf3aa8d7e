use bytes::Bytes;
use std::path::Path;

use crate::config::Lang;
use crate::error::{Error, Result};
use crate::util::{extension_of, split_filename};

/// Document formats the guard knows how to inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Other,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "pptx" => Self::Pptx,
            "xlsx" => Self::Xlsx,
            _ => Self::Other,
        }
    }

    /// Office Open XML packages (zip containers)
    pub const fn is_office(self) -> bool {
        matches!(self, Self::Docx | Self::Pptx | Self::Xlsx)
    }
}

/// An uploaded document. Immutable once created.
pub struct UploadedDocument {
    /// Raw bytes, shared across every language task of the document
    bytes: Bytes,
    filename: String,
    extension: String,
    kind: DocumentKind,
}

impl UploadedDocument {
    /// Wrap in-memory bytes under the given original filename
    pub fn from_bytes(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let filename = filename.into();
        let extension = extension_of(&filename);
        let kind = DocumentKind::from_extension(&extension);

        Self {
            bytes: Bytes::from(bytes.into()),
            filename,
            extension,
            kind,
        }
    }

    /// Read a document from disk; the file name becomes the original filename
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Validation(format!("not a file path: {}", path.display())))?
            .to_string();

        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(filename, bytes))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Lower-cased extension without the dot
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub const fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Filename without its extension
    pub fn basename(&self) -> &str {
        split_filename(&self.filename).0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reference-counted handle to the bytes, O(1)
    pub fn shared_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Name of the translated copy for `lang`: `{basename}_{SUFFIX}{ext}`
    pub fn translated_filename(&self, lang: &Lang) -> String {
        translated_filename(&self.filename, lang)
    }
}

/// `report.pdf` + `zh-Hans` → `report_CN.pdf`
pub fn translated_filename(original: &str, lang: &Lang) -> String {
    let (stem, ext) = split_filename(original);
    format!("{stem}_{}{ext}", lang.filename_suffix())
}

impl Clone for UploadedDocument {
    /// O(1): the byte buffer is reference-counted, not copied.
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
            filename: self.filename.clone(),
            extension: self.extension.clone(),
            kind: self.kind,
        }
    }
}

impl std::fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("filename", &self.filename)
            .field("kind", &self.kind)
            .field("bytes_len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translated_filename() {
        assert_eq!(translated_filename("report.pdf", &Lang::new("zh-Hans")), "report_CN.pdf");
        assert_eq!(translated_filename("report.pdf", &Lang::new("fr")), "report_FR.pdf");
        assert_eq!(translated_filename("deck.v2.pptx", &Lang::new("zh-Hant")), "deck.v2_TW.pptx");
        assert_eq!(translated_filename("notes", &Lang::new("en")), "notes_EN");
    }

    #[test]
    fn test_document_metadata() {
        let doc = UploadedDocument::from_bytes("Quarterly.DOCX", vec![1, 2, 3]);
        assert_eq!(doc.extension(), "docx");
        assert_eq!(doc.kind(), DocumentKind::Docx);
        assert!(doc.kind().is_office());
        assert_eq!(doc.basename(), "Quarterly");
        assert_eq!(doc.len(), 3);
    }

    #[test]
    fn test_clone_shares_bytes() {
        let doc = UploadedDocument::from_bytes("a.pdf", vec![0u8; 16]);
        let copy = doc.clone();
        assert_eq!(doc.shared_bytes().as_ptr(), copy.shared_bytes().as_ptr());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.xlsx");
        std::fs::write(&path, b"data").unwrap();

        let doc = UploadedDocument::from_file(&path).unwrap();
        assert_eq!(doc.filename(), "memo.xlsx");
        assert_eq!(doc.kind(), DocumentKind::Xlsx);
        assert_eq!(doc.bytes(), b"data");
    }
}
