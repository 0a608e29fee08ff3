//! # g28-autofill
//!
//! Read a passport and a G-28 (Notice of Entry of Appearance as Attorney),
//! reconcile both with one LLM call, and fill the destination web form.
//!
//! ## Pipeline Overview
//!
//! ```text
//! passport + G-28
//!  │
//!  ├─ 1. Input    validate uploads (type, size, PDF signature)
//!  ├─ 2. Acquire  embedded PDF text ▸ remote transcription ▸ page OCR
//!  │              (both documents concurrently)
//!  ├─ 3. Extract  one joint prompt → passport + G-28 JSON → typed records
//!  ├─ 4. Map      records → field-id → value map + checkbox map
//!  └─ 5. Fill     WebDriver session → screenshot (+ PDF when headless)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use g28_autofill::{FormFillAdapter, FormFillConfig, Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from EDGEQUAKE_LLM_PROVIDER / GEMINI_API_KEY / …
//!     let pipeline = Pipeline::from_config(&PipelineConfig::default())?;
//!     let outcome = pipeline.process_paths("passport.pdf", "g28.pdf").await?;
//!
//!     let filler = FormFillAdapter::new(FormFillConfig::new("https://example.com/form")?);
//!     let report = filler.fill(&outcome.fields, &outcome.checkboxes).await;
//!     eprintln!("{} fields filled, {} failed", report.total_filled, report.total_failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `g28-autofill` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External tools
//!
//! - **pdfium** shared library for PDF text and rendering (`PDFIUM_LIB_PATH`
//!   or the system search path).
//! - **tesseract** on `PATH` (or `TESSERACT_PATH`) for optical recognition.
//! - A WebDriver server (chromedriver on port 9515 by default) for filling.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod fill;
pub mod mapping;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod records;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    Browser, FillMode, FormFillConfig, PassportStrategy, PipelineConfig, PipelineConfigBuilder,
};
pub use error::{
    AcquisitionError, AutofillError, ErrorCategory, ExtractionError, RemoteError, ValidationError,
};
pub use fill::{fill_form, DebugSession, FillReport, FormDriver, FormFillAdapter};
pub use mapping::{map_to_fields, CheckboxMap, FieldValueMap};
pub use pipeline::acquire::{AcquiredText, TextAcquisition, TextSource};
pub use pipeline::extract::{Extraction, StructuredExtractor};
pub use pipeline::input::{DocumentKind, DocumentRole, InputDocument};
pub use process::{process_documents, Pipeline, ProcessingOutcome};
pub use progress::{NoopProgressCallback, ProcessProgressCallback, ProgressCallback};
pub use records::{AttorneyInfo, ClientInfo, EligibilityInfo, PassportRecord, RepresentationRecord};
