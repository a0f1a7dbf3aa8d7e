//! Pre-flight inspection of uploaded documents.
//!
//! Encrypted or DRM-wrapped documents cannot be processed by the translation
//! service, so they are rejected before anything is uploaded. Inspection is
//! heuristic and fail-closed: a document whose structure cannot be read is
//! treated the same as a protected one.

use std::io::Cursor;

use tracing::debug;

use crate::document::{DocumentKind, UploadedDocument};

/// Package manifest every Office Open XML archive carries
const OOXML_MANIFEST: &str = "[Content_Types].xml";

/// How far into the file the `%PDF-` header may appear
const PDF_HEADER_WINDOW: usize = 1024;

/// Outcome of inspecting one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    /// Safe to upload
    Usable,
    /// The container parsed, and it is access-controlled
    Protected(String),
    /// The container could not be parsed
    Unreadable(String),
}

impl GuardVerdict {
    pub const fn is_protected(&self) -> bool {
        !matches!(self, Self::Usable)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Usable => None,
            Self::Protected(reason) | Self::Unreadable(reason) => Some(reason),
        }
    }
}

/// Classify a document. Never fails; the bytes are only read.
pub fn classify(document: &UploadedDocument) -> GuardVerdict {
    let verdict = match document.kind() {
        DocumentKind::Pdf => classify_pdf(document.bytes()),
        DocumentKind::Docx | DocumentKind::Pptx | DocumentKind::Xlsx => {
            classify_office(document.bytes())
        }
        DocumentKind::Other => GuardVerdict::Usable,
    };

    debug!("Guard verdict for {}: {:?}", document.filename(), verdict);
    verdict
}

/// `Protected` and `Unreadable` both count as protected.
pub fn is_protected(document: &UploadedDocument) -> bool {
    classify(document).is_protected()
}

fn classify_pdf(bytes: &[u8]) -> GuardVerdict {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    if find(window, b"%PDF-").is_none() {
        return GuardVerdict::Unreadable("missing %PDF header".to_string());
    }

    match lopdf::Document::load_mem(bytes) {
        Ok(doc) => classify_loaded(&doc, bytes),
        // A declared encryption dictionary the loader cannot handle is still protection
        Err(_) if declares_encryption(bytes) => {
            GuardVerdict::Protected("trailer declares an /Encrypt dictionary".to_string())
        }
        Err(e) => GuardVerdict::Unreadable(format!("failed to parse PDF: {e}")),
    }
}

/// The loader may decrypt documents with an empty user password and drop the
/// /Encrypt entry, so the raw trailer is consulted as well.
fn classify_loaded(doc: &lopdf::Document, bytes: &[u8]) -> GuardVerdict {
    if doc.is_encrypted() {
        GuardVerdict::Protected("document is encrypted".to_string())
    } else if declares_encryption(bytes) {
        GuardVerdict::Protected("trailer declares an /Encrypt dictionary".to_string())
    } else {
        GuardVerdict::Usable
    }
}

fn classify_office(bytes: &[u8]) -> GuardVerdict {
    // Encrypted OOXML is stored as an OLE compound file, not a zip.
    let archive = match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(e) => return GuardVerdict::Unreadable(format!("not a zip package: {e}")),
    };

    if archive.file_names().any(|name| name == OOXML_MANIFEST) {
        GuardVerdict::Usable
    } else {
        GuardVerdict::Protected(format!("package has no {OOXML_MANIFEST}"))
    }
}

/// Whether a trailer or cross-reference stream dictionary carries `/Encrypt`.
/// Stream data is blanked first so page text cannot match.
fn declares_encryption(bytes: &[u8]) -> bool {
    let masked = mask_stream_data(bytes);
    let has_key = |region: &[u8]| key_positions(region, b"/Encrypt").next().is_some();

    let in_trailer = key_positions(&masked, b"trailer").any(|start| {
        let end = find(&masked[start..], b"startxref").map_or(masked.len(), |n| start + n);
        has_key(&masked[start..end])
    });

    // PDF 1.5+ files keep the trailer entries in the /Type /XRef stream dictionary
    in_trailer
        || key_positions(&masked, b"/XRef").any(|pos| {
            let start = rfind(&masked[..pos], b"obj").map_or(0, |n| n + 3);
            let end = find(&masked[pos..], b"stream").map_or(masked.len(), |n| pos + n);
            has_key(&masked[start..end])
        })
}

/// Copy of `bytes` with the data between `stream` and `endstream` blanked
fn mask_stream_data(bytes: &[u8]) -> Vec<u8> {
    const KEYWORD: &[u8] = b"stream";
    const END: &[u8] = b"endstream";

    let mut masked = bytes.to_vec();
    let mut offset = 0;

    while let Some(pos) = find(&masked[offset..], KEYWORD) {
        let keyword = offset + pos;
        let data = keyword + KEYWORD.len();
        let opens_data =
            !masked[..keyword].ends_with(b"end") && matches!(masked.get(data), Some(b'\r' | b'\n'));
        if !opens_data {
            offset = data;
            continue;
        }

        let end = find(&masked[data..], END).map_or(masked.len(), |n| data + n);
        masked[data..end].fill(b' ');
        offset = (end + END.len()).min(masked.len());
    }
    masked
}

/// Offsets of `key` where it is not the prefix of a longer name
/// (`/Encrypt` but not `/EncryptMetadata`)
fn key_positions<'a>(bytes: &'a [u8], key: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    let mut offset = 0;
    std::iter::from_fn(move || {
        while let Some(pos) = find(&bytes[offset..], key) {
            let at = offset + pos;
            offset = at + key.len();
            if !bytes.get(offset).is_some_and(u8::is_ascii_alphanumeric) {
                return Some(at);
            }
        }
        None
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_extension_is_usable() {
        let doc = UploadedDocument::from_bytes("notes.txt", b"plain text".to_vec());
        assert_eq!(classify(&doc), GuardVerdict::Usable);
        assert!(!is_protected(&doc));
    }

    #[test]
    fn test_pdf_without_header_is_unreadable() {
        let doc = UploadedDocument::from_bytes("scan.pdf", b"not a pdf at all".to_vec());
        assert!(matches!(classify(&doc), GuardVerdict::Unreadable(_)));
    }

    #[test]
    fn test_truncated_pdf_is_unreadable() {
        let doc = UploadedDocument::from_bytes("scan.pdf", b"%PDF-1.7\n1 0 obj\n<<".to_vec());
        assert!(is_protected(&doc));
    }

    #[test]
    fn test_office_that_is_not_a_zip() {
        // OLE compound file signature
        let ole = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0, 0, 0, 0];
        let doc = UploadedDocument::from_bytes("secret.docx", ole);
        assert!(matches!(classify(&doc), GuardVerdict::Unreadable(_)));
        assert!(is_protected(&doc));
    }

    #[test]
    fn test_trailer_encrypt_detection() {
        assert!(declares_encryption(
            b"xref\n0 1\ntrailer\n<< /Root 1 0 R /Encrypt 5 0 R >>\nstartxref\n9\n%%EOF"
        ));
        assert!(declares_encryption(b"trailer<</Encrypt<</Filter/Standard>>>>"));
        assert!(!declares_encryption(b"trailer\n<< /Root 1 0 R /EncryptMetadata false >>"));
        assert!(!declares_encryption(b"trailer\n<< /Root 1 0 R >>\nstartxref\n9"));
    }

    #[test]
    fn test_xref_stream_encrypt_detection() {
        let encrypted = b"9 0 obj\n<< /Type /XRef /Size 9 /Encrypt 8 0 R /Root 1 0 R >>\nstream\n\x01\x02\nendstream\nendobj";
        let plain = b"9 0 obj\n<< /Type /XRef /Size 9 /Root 1 0 R >>\nstream\n\x01\x02\nendstream\nendobj";
        assert!(declares_encryption(encrypted));
        assert!(!declares_encryption(plain));
    }

    #[test]
    fn test_encrypt_in_page_text_is_ignored() {
        let content = b"4 0 obj\n<< /Length 40 >>\nstream\nBT (trailer /Encrypt 5 0 R) Tj /XRef ET\nendstream\nendobj\n\
trailer\n<< /Root 1 0 R >>\nstartxref\n0\n%%EOF";
        assert!(!declares_encryption(content));
    }

    #[test]
    fn test_encrypted_document_model() {
        let mut doc = lopdf::Document::with_version("1.5");
        assert_eq!(classify_loaded(&doc, b"%PDF-1.5"), GuardVerdict::Usable);

        let encrypt_id =
            doc.add_object(lopdf::dictionary! { "Filter" => "Standard", "V" => 2, "R" => 3 });
        doc.trailer.set("Encrypt", encrypt_id);
        assert_eq!(
            classify_loaded(&doc, b"%PDF-1.5"),
            GuardVerdict::Protected("document is encrypted".to_string())
        );
    }

    #[test]
    fn test_verdict_reason() {
        assert_eq!(GuardVerdict::Usable.reason(), None);
        assert_eq!(GuardVerdict::Protected("x".into()).reason(), Some("x"));
        assert!(GuardVerdict::Unreadable("y".into()).is_protected());
    }
}
