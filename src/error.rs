//! Error types for the g28-autofill library.
//!
//! Failures split along the request lifecycle:
//!
//! * [`ValidationError`] — an upload was rejected before any processing
//!   started (wrong type, empty, oversized). Caller-correctable.
//! * [`AcquisitionError`] — no text could be obtained from one of the two
//!   documents by any strategy. Names the document that failed.
//! * [`ExtractionError`] — the joint structured-extraction call failed
//!   outright. Variants exist purely for user messaging; control flow is the
//!   same for all of them.
//!
//! All three abort the request and are wrapped by [`AutofillError`].
//! Per-field form-filling failures are not errors at all: they accumulate in
//! [`crate::fill::FillReport`].
//!
//! Every message ends with a line telling the caller what to try next.

use crate::pipeline::input::DocumentRole;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the g28-autofill library.
#[derive(Debug, Error)]
pub enum AutofillError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}\nFix the value and run again.")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}\nRe-run with --verbose and report the log if it persists.")]
    Internal(String),
}

// ── Validation ───────────────────────────────────────────────────────────

/// An uploaded document was rejected before the pipeline started.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No file uploaded.\nAttach both a passport and a G-28 form (PDF, JPEG or PNG).")]
    MissingFileName,

    #[error("Invalid file type '.{extension}' for '{name}'.\nSupported formats: PDF, JPEG, PNG.")]
    UnsupportedType { name: String, extension: String },

    #[error("'{name}' is empty.\nRe-upload the file; the upload may have been interrupted.")]
    Empty { name: String },

    #[error("'{name}' is {size_bytes} bytes, above the {max_mb} MB limit.\nCompress the scan or export fewer pages.")]
    TooLarge {
        name: String,
        size_bytes: u64,
        max_mb: u64,
    },

    #[error("'{name}' is not a valid PDF (first bytes: {magic:?}).\nRe-export the document as PDF, or upload a JPEG/PNG scan instead.")]
    NotAPdf { name: String, magic: [u8; 4] },

    #[error("Cannot read '{path}': {source}\nCheck the path exists and is readable.")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ── Acquisition ──────────────────────────────────────────────────────────

/// No text could be obtained from a document by any strategy.
///
/// Not retried; the caller may resubmit a clearer scan.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("No pages could be read from the {role} document ({detail}).\nCheck that the file is a valid, unencrypted PDF.")]
    Unreadable { role: DocumentRole, detail: String },

    #[error("No text could be recognised in the {role} document ({pages} page(s) tried).\nUpload a clearer, higher-resolution scan.")]
    NoText { role: DocumentRole, pages: usize },

    #[error("The {role} image could not be decoded: {detail}\nRe-export the image as PNG or JPEG and try again.")]
    UndecodableImage { role: DocumentRole, detail: String },

    #[error("OCR engine unavailable: {detail}\nInstall tesseract with the 'eng' language data, or set TESSERACT_PATH.")]
    EngineUnavailable { detail: String },

    #[error("Internal error while reading the {role} document: {detail}\nRe-run with --verbose and report the log if it persists.")]
    Internal { role: DocumentRole, detail: String },
}

impl AcquisitionError {
    /// The document this failure belongs to, when it is document-specific.
    pub fn role(&self) -> Option<DocumentRole> {
        match self {
            AcquisitionError::Unreadable { role, .. }
            | AcquisitionError::NoText { role, .. }
            | AcquisitionError::UndecodableImage { role, .. }
            | AcquisitionError::Internal { role, .. } => Some(*role),
            AcquisitionError::EngineUnavailable { .. } => None,
        }
    }
}

// ── Remote calls ─────────────────────────────────────────────────────────

/// A failure talking to a remote model or file service.
///
/// Carries only text: classification into an [`ErrorCategory`] is done by
/// [`crate::pipeline::llm::classify_remote_error`].
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Error text reported by the provider library or transport.
    #[error("{0}")]
    Service(String),

    /// The service answered, but not with what the protocol promised.
    #[error("unexpected response: {0}")]
    Response(String),
}

// ── Extraction ───────────────────────────────────────────────────────────

/// User-facing bucket for an [`ExtractionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Quota,
    InvalidModel,
    Timeout,
    InvalidResponse,
    Generic,
}

/// The joint structured-extraction step failed outright.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Remote model authentication failed: {detail}\nVerify GEMINI_API_KEY (or the configured provider's API key).")]
    Authentication { detail: String },

    #[error("Remote model quota exceeded or rate limit reached: {detail}\nWait a few minutes and try again.")]
    Quota { detail: String },

    #[error("Invalid model name '{model}': {detail}\nCheck --model / EDGEQUAKE_MODEL.")]
    InvalidModel { model: String, detail: String },

    #[error("Remote model call timed out after {secs}s.\nRetry, or raise --api-timeout.")]
    Timeout { secs: u64 },

    #[error("Remote model returned invalid JSON: {diagnostic}\nResponse excerpt: {excerpt}\nResubmit the documents; if this persists the model output format has drifted.")]
    InvalidJson { diagnostic: String, excerpt: String },

    #[error("Remote model response does not match the record schema: {detail}\nResubmit the documents; if this persists check the model configuration.")]
    Schema { detail: String },

    #[error("LLM extraction error: {detail}\nCheck your API key and model configuration, then retry.")]
    Service { detail: String },
}

impl ExtractionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExtractionError::Authentication { .. } => ErrorCategory::Authentication,
            ExtractionError::Quota { .. } => ErrorCategory::Quota,
            ExtractionError::InvalidModel { .. } => ErrorCategory::InvalidModel,
            ExtractionError::Timeout { .. } => ErrorCategory::Timeout,
            ExtractionError::InvalidJson { .. } | ExtractionError::Schema { .. } => {
                ErrorCategory::InvalidResponse
            }
            ExtractionError::Service { .. } => ErrorCategory::Generic,
        }
    }

    /// Network-class failures that a bounded retry may cure.
    ///
    /// Content-shape errors are handled separately (one re-ask on invalid
    /// JSON) and credential/model errors never change on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExtractionError::Timeout { .. } | ExtractionError::Service { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_fatal_message_carries_a_hint_line() {
        let errors: Vec<AutofillError> = vec![
            ValidationError::MissingFileName.into(),
            ValidationError::UnsupportedType {
                name: "scan.gif".into(),
                extension: "gif".into(),
            }
            .into(),
            AcquisitionError::NoText {
                role: DocumentRole::Passport,
                pages: 2,
            }
            .into(),
            ExtractionError::Quota {
                detail: "429".into(),
            }
            .into(),
            AutofillError::InvalidConfig("dpi".into()),
        ];
        for e in errors {
            let msg = e.to_string();
            assert!(msg.lines().count() >= 2, "no hint line in: {msg}");
        }
    }

    #[test]
    fn acquisition_error_names_the_document() {
        let e = AcquisitionError::NoText {
            role: DocumentRole::Representation,
            pages: 3,
        };
        assert!(e.to_string().contains("G-28"), "got: {e}");
        assert_eq!(e.role(), Some(DocumentRole::Representation));
    }

    #[test]
    fn invalid_json_display_keeps_diagnostic_and_excerpt() {
        let e = ExtractionError::InvalidJson {
            diagnostic: "expected value at line 1 column 1".into(),
            excerpt: "Sure! Here is".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("invalid JSON"));
        assert!(msg.contains("line 1 column 1"));
        assert!(msg.contains("Sure! Here is"));
        assert_eq!(e.category(), ErrorCategory::InvalidResponse);
    }

    #[test]
    fn only_network_class_errors_are_transient() {
        assert!(ExtractionError::Timeout { secs: 5 }.is_transient());
        assert!(ExtractionError::Service {
            detail: "connection reset".into()
        }
        .is_transient());
        assert!(!ExtractionError::Authentication {
            detail: "bad key".into()
        }
        .is_transient());
        assert!(!ExtractionError::Schema {
            detail: "array".into()
        }
        .is_transient());
    }

    #[test]
    fn too_large_display() {
        let e = ValidationError::TooLarge {
            name: "passport.pdf".into(),
            size_bytes: 30_000_000,
            max_mb: 20,
        };
        let msg = e.to_string();
        assert!(msg.contains("passport.pdf"));
        assert!(msg.contains("20 MB"));
    }
}
