//! End-to-end processing: two documents in, fill-ready maps out.
//!
//! ```text
//! passport ─┐                         ┌─▶ PassportRecord ─┐
//!           ├─ acquire (concurrent) ──┤  joint extract    ├─▶ map ─▶ FieldValueMap
//! G-28 ─────┘                         └─▶ Representation ─┘          CheckboxMap
//! ```
//!
//! Any acquisition or extraction failure aborts the run; there is no
//! partial result.

use crate::config::PipelineConfig;
use crate::error::{AcquisitionError, AutofillError};
use crate::mapping::{map_to_fields, CheckboxMap, FieldValueMap};
use crate::pipeline::acquire::{AcquiredText, TextAcquisition, TextSource};
use crate::pipeline::extract::StructuredExtractor;
use crate::pipeline::input::{DocumentRole, InputDocument};
use crate::pipeline::llm::{EdgequakeModel, LanguageModel};
use crate::pipeline::ocr::{EngineProvider, OcrError, OpticalRecognizer, TextDetector};
#[cfg(feature = "paddle")]
use crate::pipeline::paddle::PaddleEngine;
use crate::pipeline::remote_files::GeminiFileApi;
use crate::pipeline::render::PdfiumRasterizer;
use crate::pipeline::tesseract::TesseractEngine;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::records::{PassportRecord, RepresentationRecord};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Where a document's text came from. The text itself is not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextProvenance {
    pub source: TextSource,
    pub pages: usize,
    pub characters: usize,
}

impl From<&AcquiredText> for TextProvenance {
    fn from(acquired: &AcquiredText) -> Self {
        Self {
            source: acquired.source,
            pages: acquired.pages,
            characters: acquired.text.chars().count(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    pub acquisition_ms: u64,
    pub extraction_ms: u64,
    pub total_ms: u64,
}

/// Everything a run produced before form filling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingOutcome {
    pub passport_text: TextProvenance,
    pub g28_text: TextProvenance,
    pub passport: PassportRecord,
    pub representation: RepresentationRecord,
    pub validation_notes: Option<String>,
    pub fields: FieldValueMap,
    pub checkboxes: CheckboxMap,
    pub timings: StageTimings,
}

/// Wired acquisition and extraction stages.
pub struct Pipeline {
    acquisition: TextAcquisition,
    extractor: StructuredExtractor,
    model_name: String,
    max_file_size_mb: u64,
    progress: ProgressCallback,
}

impl Pipeline {
    /// Build the production pipeline: pdfium rendering, the local OCR engine
    /// (oar-ocr or tesseract, constructed on first use), the resolved LLM provider and, for gemini
    /// models with an API key, the Gemini File API for passport PDFs.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, AutofillError> {
        let model: Arc<dyn LanguageModel> = Arc::new(EdgequakeModel::from_config(config)?);

        let mut rasterizer =
            PdfiumRasterizer::new().with_max_rendered_pixels(config.max_rendered_pixels);
        if let Some(dir) = &config.pdfium_lib_path {
            rasterizer = rasterizer.with_library_dir(dir.clone());
        }

        let binary = config.tesseract_path.clone();
        let language = config.ocr_language.clone();
        let models_dir = config.ocr_models_dir.clone();
        let engines = EngineProvider::lazy(move || {
            local_engine(&binary, &language, models_dir.as_deref())
        });
        let recognizer = OpticalRecognizer::new(Arc::new(engines), config.ocr_min_confidence);

        let mut acquisition = TextAcquisition::new(Arc::new(rasterizer), recognizer, config)
            .with_remote_model(Arc::clone(&model));
        if let Some(files) = file_api(config, model.model_name()) {
            acquisition = acquisition.with_file_api(Arc::new(files));
        }

        let extractor = StructuredExtractor::new(model, config);
        Ok(Self::from_parts(acquisition, extractor, config))
    }

    /// Assemble a pipeline from already constructed stages.
    pub fn from_parts(
        acquisition: TextAcquisition,
        extractor: StructuredExtractor,
        config: &PipelineConfig,
    ) -> Self {
        let model_name = extractor.model_name().to_string();
        Self {
            acquisition,
            extractor,
            model_name,
            max_file_size_mb: config.max_file_size_mb,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Read and validate both files from disk, then process them.
    pub async fn process_paths(
        &self,
        passport: impl AsRef<Path>,
        g28: impl AsRef<Path>,
    ) -> Result<ProcessingOutcome, AutofillError> {
        let passport = InputDocument::from_path(passport.as_ref(), self.max_file_size_mb).await?;
        let g28 = InputDocument::from_path(g28.as_ref(), self.max_file_size_mb).await?;
        process_documents(&passport, &g28, self).await
    }

    async fn acquire(
        &self,
        doc: &InputDocument,
        role: DocumentRole,
    ) -> Result<AcquiredText, AcquisitionError> {
        self.progress.on_document_start(role, doc.name());
        match self.acquisition.acquire(doc, role).await {
            Ok(acquired) => {
                self.progress
                    .on_document_complete(role, acquired.source, acquired.text.chars().count());
                Ok(acquired)
            }
            Err(e) => {
                self.progress.on_document_error(role, &e.to_string());
                Err(e)
            }
        }
    }
}

/// The oar-ocr engine when a models directory is configured, else tesseract.
fn local_engine(
    tesseract: &Path,
    language: &str,
    models_dir: Option<&Path>,
) -> Result<Arc<dyn TextDetector>, OcrError> {
    #[cfg(feature = "paddle")]
    if let Some(dir) = models_dir {
        return PaddleEngine::load(dir).map(|engine| Arc::new(engine) as Arc<dyn TextDetector>);
    }
    #[cfg(not(feature = "paddle"))]
    let _ = models_dir;

    warn!("Using tesseract: pages are not unwarped (set an OCR models directory for oar-ocr)");
    TesseractEngine::probe(tesseract, language)
        .map(|engine| Arc::new(engine) as Arc<dyn TextDetector>)
}

fn file_api(config: &PipelineConfig, model: &str) -> Option<GeminiFileApi> {
    if !model.starts_with("gemini") {
        return None;
    }
    let key = config
        .gemini_api_key
        .clone()
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())?;
    match GeminiFileApi::new(key, model, config.api_timeout_secs) {
        Ok(api) => Some(api.with_generation(config.temperature, config.max_tokens)),
        Err(e) => {
            warn!("Gemini File API unavailable ({}); passport PDFs will use OCR", e);
            None
        }
    }
}

/// Process one passport and one G-28.
///
/// Both documents are acquired concurrently; the first failure cancels the
/// other and is returned.
pub async fn process_documents(
    passport: &InputDocument,
    g28: &InputDocument,
    pipeline: &Pipeline,
) -> Result<ProcessingOutcome, AutofillError> {
    let start = Instant::now();
    info!("Processing passport '{}' and G-28 '{}'", passport.name(), g28.name());
    pipeline.progress.on_process_start();

    // ── Step 1: acquire both texts ───────────────────────────────────────
    let (passport_text, g28_text) = tokio::try_join!(
        pipeline.acquire(passport, DocumentRole::Passport),
        pipeline.acquire(g28, DocumentRole::Representation),
    )?;
    let acquisition_ms = start.elapsed().as_millis() as u64;

    // ── Step 2: joint extraction ─────────────────────────────────────────
    let extraction_start = Instant::now();
    pipeline.progress.on_extraction_start(&pipeline.model_name);
    let extraction = pipeline
        .extractor
        .extract(&passport_text.text, &g28_text.text)
        .await?;
    let extraction_ms = extraction_start.elapsed().as_millis() as u64;

    // ── Step 3: map to form fields ───────────────────────────────────────
    let (fields, checkboxes) = map_to_fields(&extraction.passport, &extraction.representation);
    let mapped = fields.non_empty().count();
    let total_ms = start.elapsed().as_millis() as u64;

    info!(
        "Processing complete: {} of {} fields populated, {} checkbox(es), {}ms",
        mapped,
        fields.len(),
        checkboxes.len(),
        total_ms
    );
    pipeline.progress.on_process_complete(mapped, total_ms);

    Ok(ProcessingOutcome {
        passport_text: TextProvenance::from(&passport_text),
        g28_text: TextProvenance::from(&g28_text),
        passport: extraction.passport,
        representation: extraction.representation,
        validation_notes: extraction.validation_notes,
        fields,
        checkboxes,
        timings: StageTimings {
            acquisition_ms,
            extraction_ms,
            total_ms,
        },
    })
}
