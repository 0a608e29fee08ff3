//! Text acquisition: turn one validated document into one text blob.
//!
//! ## Strategy order (first success wins)
//!
//! PDF:
//! 1. **Embedded text** when its trimmed length reaches the threshold.
//! 2. **Remote transcription** (passport only, `PassportStrategy::RemoteModel`,
//!    file API configured): upload, transcribe, delete.
//! 3. **Page OCR**: count the pages (a PDF that cannot be opened or has no
//!    pages fails here, before the engine is started), render every page,
//!    recognise, keep the pages that produced text under their `[Page N]`
//!    markers. A page that fails is skipped; the document fails only when
//!    no page produced text.
//!
//! JPEG/PNG:
//! 1. **Remote transcription** (passport only) with the image sent inline.
//! 2. **OCR** of the decoded image, without page markers.
//!
//! A remote failure is logged and the local strategy takes over.
//!
//! ## Page order
//!
//! Pages may be recognised concurrently (`ocr_concurrency`), but results are
//! collected with `buffered`, which yields in input order: page N's text
//! always precedes page N+1's.

use crate::config::{PassportStrategy, PipelineConfig};
use crate::error::AcquisitionError;
use crate::pipeline::encode::encode_upload;
use crate::pipeline::input::{DocumentKind, DocumentRole, InputDocument};
use crate::pipeline::llm::LanguageModel;
use crate::pipeline::ocr::OpticalRecognizer;
use crate::pipeline::postprocess::clean_transcription;
use crate::pipeline::remote_files::{generate_from_upload, RemoteFileApi};
use crate::pipeline::render::{assemble_pages, PageRasterizer, RasterError};
use crate::prompts::PASSPORT_TRANSCRIPTION_PROMPT;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Which strategy produced a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    Embedded,
    Optical,
    RemoteModel,
}

/// Text obtained from one document, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquiredText {
    pub text: String,
    pub source: TextSource,
    /// Pages contributing text (1 for images and remote transcriptions).
    pub pages: usize,
}

/// Per-document acquisition pipeline.
#[derive(Clone)]
pub struct TextAcquisition {
    rasterizer: Arc<dyn PageRasterizer>,
    recognizer: OpticalRecognizer,
    model: Option<Arc<dyn LanguageModel>>,
    files: Option<Arc<dyn RemoteFileApi>>,
    dpi: u32,
    threshold: usize,
    ocr_concurrency: usize,
    passport_strategy: PassportStrategy,
}

impl TextAcquisition {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        recognizer: OpticalRecognizer,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            rasterizer,
            recognizer,
            model: None,
            files: None,
            dpi: config.dpi,
            threshold: config.embedded_text_threshold,
            ocr_concurrency: config.ocr_concurrency.max(1),
            passport_strategy: config.passport_strategy,
        }
    }

    /// Model used to transcribe passport images sent inline.
    pub fn with_remote_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// File store used to transcribe passport PDFs.
    pub fn with_file_api(mut self, files: Arc<dyn RemoteFileApi>) -> Self {
        self.files = Some(files);
        self
    }

    fn remote_allowed(&self, role: DocumentRole) -> bool {
        role == DocumentRole::Passport && self.passport_strategy == PassportStrategy::RemoteModel
    }

    /// Obtain the text of `doc`.
    pub async fn acquire(
        &self,
        doc: &InputDocument,
        role: DocumentRole,
    ) -> Result<AcquiredText, AcquisitionError> {
        info!("Processing {} document: {} ({:?})", role, doc.name(), doc.kind());
        let acquired = match doc.kind() {
            DocumentKind::Pdf => self.acquire_pdf(doc, role).await?,
            DocumentKind::Jpeg | DocumentKind::Png => self.acquire_image(doc, role).await?,
        };
        info!(
            "{} text acquired: {} characters via {:?} ({} page(s))",
            role,
            acquired.text.chars().count(),
            acquired.source,
            acquired.pages
        );
        debug!("{} text excerpt: {}", role, excerpt(&acquired.text, 200));
        Ok(acquired)
    }

    async fn acquire_pdf(
        &self,
        doc: &InputDocument,
        role: DocumentRole,
    ) -> Result<AcquiredText, AcquisitionError> {
        // ── Step 1: embedded text ───────────────────────────────────────
        let bytes = doc.shared_bytes();
        let rasterizer = Arc::clone(&self.rasterizer);
        let embedded = tokio::task::spawn_blocking(move || rasterizer.extract_embedded_text(&bytes))
            .await
            .map_err(|e| internal(role, "text extraction", e))?;

        if let Some(text) = embedded {
            let len = text.trim().chars().count();
            if len >= self.threshold {
                info!("Direct text extraction successful ({} characters)", len);
                let pages = match self.page_count(doc, role).await? {
                    Ok(n) => n.max(1),
                    Err(e) => {
                        warn!("Embedded text found but page count failed: {}", e);
                        1
                    }
                };
                return Ok(AcquiredText {
                    text,
                    source: TextSource::Embedded,
                    pages,
                });
            }
            info!(
                "Direct text extraction yielded insufficient text ({} < {} characters)",
                len, self.threshold
            );
        }

        // ── Step 2: remote transcription (passport) ─────────────────────
        if self.remote_allowed(role) {
            if let Some(files) = &self.files {
                info!("Uploading {} PDF for remote transcription...", role);
                match generate_from_upload(
                    Arc::clone(files),
                    doc.bytes(),
                    doc.kind().mime_type(),
                    doc.name(),
                    PASSPORT_TRANSCRIPTION_PROMPT,
                )
                .await
                {
                    Ok(raw) => {
                        if let Some(acquired) = remote_text(&raw) {
                            return Ok(acquired);
                        }
                        warn!("Remote transcription of the {} was empty; using OCR", role);
                    }
                    Err(e) => warn!("Remote transcription of the {} failed: {}; using OCR", role, e),
                }
            }
        }

        // ── Step 3: page OCR ────────────────────────────────────────────
        let page_count = match self.page_count(doc, role).await? {
            Ok(0) => {
                error!("{} PDF has no pages", role);
                return Err(AcquisitionError::Unreadable {
                    role,
                    detail: "document has no pages".into(),
                });
            }
            Ok(n) => n,
            Err(e) => {
                error!("Failed to get {} PDF page count: {}", role, e);
                return Err(AcquisitionError::Unreadable {
                    role,
                    detail: e.to_string(),
                });
            }
        };
        self.recognizer.ensure_engine()?;
        info!("Processing {} pages with OCR", page_count);

        let texts: Vec<(usize, Option<String>)> = stream::iter((0..page_count).map(|index| {
            let bytes = doc.shared_bytes();
            let rasterizer = Arc::clone(&self.rasterizer);
            let recognizer = self.recognizer.clone();
            let dpi = self.dpi;
            async move {
                let result = tokio::task::spawn_blocking(move || {
                    let Some(page) = rasterizer.render_page(&bytes, index, dpi) else {
                        warn!("Failed to convert page {} to image", index + 1);
                        return None;
                    };
                    recognizer.recognize(&page.image)
                })
                .await;
                match result {
                    Ok(text) => (index, text),
                    Err(e) => {
                        warn!("Failed to process page {}: {}", index + 1, e);
                        (index, None)
                    }
                }
            }
        }))
        .buffered(self.ocr_concurrency)
        .collect()
        .await;

        let recognised: Vec<(usize, String)> = texts
            .into_iter()
            .filter_map(|(index, text)| text.map(|t| (index, t)))
            .collect();
        for (index, text) in &recognised {
            debug!("Extracted {} characters from page {}", text.chars().count(), index + 1);
        }
        let pages = recognised.len();

        match assemble_pages(recognised) {
            Some(text) => Ok(AcquiredText {
                text,
                source: TextSource::Optical,
                pages,
            }),
            None => {
                error!("Failed to extract text from any {} page using OCR", role);
                Err(AcquisitionError::NoText {
                    role,
                    pages: page_count,
                })
            }
        }
    }

    async fn page_count(
        &self,
        doc: &InputDocument,
        role: DocumentRole,
    ) -> Result<Result<usize, RasterError>, AcquisitionError> {
        let bytes = doc.shared_bytes();
        let rasterizer = Arc::clone(&self.rasterizer);
        tokio::task::spawn_blocking(move || rasterizer.page_count(&bytes))
            .await
            .map_err(|e| internal(role, "page count", e))
    }

    async fn acquire_image(
        &self,
        doc: &InputDocument,
        role: DocumentRole,
    ) -> Result<AcquiredText, AcquisitionError> {
        if self.remote_allowed(role) {
            if let Some(model) = &self.model {
                info!("Transcribing {} image with {}", role, model.model_name());
                let image = encode_upload(doc.bytes(), doc.kind().mime_type());
                match model
                    .transcribe_image(PASSPORT_TRANSCRIPTION_PROMPT, image)
                    .await
                {
                    Ok(raw) => {
                        if let Some(acquired) = remote_text(&raw) {
                            return Ok(acquired);
                        }
                        warn!("Remote transcription of the {} was empty; using OCR", role);
                    }
                    Err(e) => warn!("Remote transcription of the {} failed: {}; using OCR", role, e),
                }
            }
        }

        self.recognizer.ensure_engine()?;

        let bytes = doc.shared_bytes();
        let recognizer = self.recognizer.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map(|img| recognizer.recognize(&img))
        })
        .await
        .map_err(|e| internal(role, "image OCR", e))?;

        match outcome {
            Err(e) => Err(AcquisitionError::UndecodableImage {
                role,
                detail: e.to_string(),
            }),
            Ok(Some(text)) => Ok(AcquiredText {
                text,
                source: TextSource::Optical,
                pages: 1,
            }),
            Ok(None) => Err(AcquisitionError::NoText { role, pages: 1 }),
        }
    }
}

fn remote_text(raw: &str) -> Option<AcquiredText> {
    let text = clean_transcription(raw);
    (!text.is_empty()).then(|| AcquiredText {
        text,
        source: TextSource::RemoteModel,
        pages: 1,
    })
}

fn internal(role: DocumentRole, stage: &str, e: tokio::task::JoinError) -> AcquisitionError {
    AcquisitionError::Internal {
        role,
        detail: format!("{stage} task panicked: {e}"),
    }
}

/// First `max_chars` characters, cut on a character boundary.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((at, _)) => &text[..at],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("ÉÉÉÉ", 2), "ÉÉ");
        assert_eq!(excerpt("short", 50), "short");
    }

    #[test]
    fn empty_remote_transcription_is_rejected() {
        assert!(remote_text("```\n  \n```").is_none());
        let t = remote_text("P<USADOE<<JOHN\r\n").unwrap();
        assert_eq!(t.text, "P<USADOE<<JOHN");
        assert_eq!(t.source, TextSource::RemoteModel);
    }
}
