//! Pipeline stages from uploaded document to structured records.
//!
//! Each submodule implements one step; the external engines (pdfium,
//! tesseract, the LLM, the remote file store) sit behind traits so every
//! stage can be tested with fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ acquire ──────────────────────────────▶ extract
//!  (validate)  ├─ render ──▶ preprocess ──▶ ocr       (joint LLM call,
//!              │  (pdfium)   (contrast,    (tesseract) JSON repair)
//!              └─ encode / remote_files ──▶ llm
//!                 (passport transcription by the remote model)
//! ```
//!
//! 1. [`input`]      — validate an upload (extension, size, PDF magic)
//! 2. [`acquire`]    — choose embedded text, remote transcription or OCR
//! 3. [`render`]     — embedded text and page rasterisation; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 4. [`preprocess`] — deterministic contrast and sharpness conditioning
//! 5. [`ocr`]        — confidence-filtered recognition over a shared engine
//! 6. `paddle` / [`tesseract`] — the production recognition engines:
//!    PaddleOCR models with orientation, unwarping and text-line
//!    orientation (`paddle` feature), or the tesseract CLI
//! 7. [`encode`] / [`remote_files`] — get passport bytes to the remote model
//! 8. [`llm`]        — model calls with timeout, retry and error classification
//! 9. [`extract`]    — the joint extraction request and its repair rules
//! 10. [`postprocess`] — fence stripping and transcription clean-up

pub mod acquire;
pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod ocr;
#[cfg(feature = "paddle")]
pub mod paddle;
pub mod postprocess;
pub mod preprocess;
pub mod remote_files;
pub mod render;
pub mod tesseract;
