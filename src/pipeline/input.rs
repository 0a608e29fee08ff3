//! Upload validation: turn a file path or an in-memory upload into an
//! [`InputDocument`] the pipeline can trust.
//!
//! Everything here runs before any expensive work. A rejected upload never
//! reaches rasterisation, OCR or the remote model, and the caller gets a
//! [`ValidationError`] it can act on directly. PDFs are checked for their
//! `%PDF` magic bytes so a renamed image fails here with a clear message
//! instead of as an opaque pdfium load error later on.

use crate::error::ValidationError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Which of the two uploads a document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRole {
    Passport,
    /// The G-28 attorney-representation form.
    Representation,
}

impl fmt::Display for DocumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentRole::Passport => f.write_str("passport"),
            DocumentRole::Representation => f.write_str("G-28"),
        }
    }
}

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Jpeg,
    Png,
}

impl DocumentKind {
    /// Classify a file name by extension, case-insensitively.
    pub fn from_file_name(name: &str) -> Result<Self, ValidationError> {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "jpg" | "jpeg" => Ok(DocumentKind::Jpeg),
            "png" => Ok(DocumentKind::Png),
            _ => Err(ValidationError::UnsupportedType {
                name: name.to_string(),
                extension,
            }),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Jpeg => "image/jpeg",
            DocumentKind::Png => "image/png",
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, DocumentKind::Pdf)
    }
}

/// A validated upload. Bytes are shared so blocking stages can take a
/// cheap clone into `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct InputDocument {
    name: String,
    kind: DocumentKind,
    bytes: Arc<[u8]>,
}

impl InputDocument {
    /// Validate an in-memory upload (e.g. a multipart form field).
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        max_file_size_mb: u64,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::MissingFileName);
        }
        let kind = DocumentKind::from_file_name(&name)?;
        let bytes: Vec<u8> = bytes.into();

        if bytes.is_empty() {
            return Err(ValidationError::Empty { name });
        }

        let max_bytes = max_file_size_mb.saturating_mul(1024 * 1024);
        if bytes.len() as u64 > max_bytes {
            return Err(ValidationError::TooLarge {
                name,
                size_bytes: bytes.len() as u64,
                max_mb: max_file_size_mb,
            });
        }

        if kind == DocumentKind::Pdf && !bytes.starts_with(b"%PDF") {
            let mut magic = [0u8; 4];
            let n = bytes.len().min(4);
            magic[..n].copy_from_slice(&bytes[..n]);
            return Err(ValidationError::NotAPdf { name, magic });
        }

        debug!("Validated upload '{}' ({:?}, {} bytes)", name, kind, bytes.len());
        Ok(Self {
            name,
            kind,
            bytes: bytes.into(),
        })
    }

    /// Read and validate a local file.
    pub async fn from_path(
        path: impl AsRef<Path>,
        max_file_size_mb: u64,
    ) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(ValidationError::MissingFileName)?
            .to_string();

        // Reject by extension before reading a potentially large file.
        DocumentKind::from_file_name(&name)?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ValidationError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_bytes(name, bytes, max_file_size_mb)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_PDF: &[u8] = b"%PDF-1.4\n%%EOF\n";

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(DocumentKind::from_file_name("a.pdf").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_file_name("A.PDF").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_file_name("scan.JPG").unwrap(), DocumentKind::Jpeg);
        assert_eq!(DocumentKind::from_file_name("scan.jpeg").unwrap(), DocumentKind::Jpeg);
        assert_eq!(DocumentKind::from_file_name("scan.png").unwrap(), DocumentKind::Png);
        assert!(matches!(
            DocumentKind::from_file_name("scan.gif"),
            Err(ValidationError::UnsupportedType { .. })
        ));
        assert!(matches!(
            DocumentKind::from_file_name("no_extension"),
            Err(ValidationError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_accepts_valid_pdf() {
        let doc = InputDocument::from_bytes("g28.pdf", MINIMAL_PDF, 20).unwrap();
        assert_eq!(doc.kind(), DocumentKind::Pdf);
        assert_eq!(doc.name(), "g28.pdf");
        assert_eq!(doc.bytes(), MINIMAL_PDF);
    }

    #[test]
    fn test_rejects_renamed_image_as_pdf() {
        let err = InputDocument::from_bytes("passport.pdf", b"\x89PNG\r\n", 20).unwrap_err();
        match err {
            ValidationError::NotAPdf { magic, .. } => assert_eq!(&magic, b"\x89PNG"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_empty_and_nameless() {
        assert!(matches!(
            InputDocument::from_bytes("a.png", Vec::new(), 20),
            Err(ValidationError::Empty { .. })
        ));
        assert!(matches!(
            InputDocument::from_bytes("  ", MINIMAL_PDF, 20),
            Err(ValidationError::MissingFileName)
        ));
    }

    #[test]
    fn test_rejects_oversized_upload() {
        let bytes = vec![0u8; 1024 * 1024 + 1];
        assert!(matches!(
            InputDocument::from_bytes("scan.png", bytes, 1),
            Err(ValidationError::TooLarge { max_mb: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("form.pdf");
        std::fs::write(&path, MINIMAL_PDF).unwrap();

        let doc = InputDocument::from_path(&path, 20).await.unwrap();
        assert_eq!(doc.name(), "form.pdf");

        let missing = InputDocument::from_path(dir.path().join("gone.pdf"), 20).await;
        assert!(matches!(missing, Err(ValidationError::Unreadable { .. })));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(DocumentRole::Passport.to_string(), "passport");
        assert_eq!(DocumentRole::Representation.to_string(), "G-28");
    }
}
