//! Optical text recognition over a single raster image.
//!
//! The engine is reached through two layers:
//!
//! - [`TextDetector`] is the engine port: image in, `(box, text, confidence)`
//!   detections out. Production engines are `pipeline::paddle::PaddleEngine`
//!   (oar-ocr) and [`crate::pipeline::tesseract::TesseractEngine`]; tests
//!   use fakes.
//! - [`EngineProvider`] owns the one engine instance for the process. It is
//!   constructed lazily on first use (engine start-up probes the installation
//!   and can take seconds) and reused afterwards. Engines that report
//!   themselves as not re-entrant are serialised behind a single mutex.
//!
//! [`OpticalRecognizer`] combines the two with the preprocessing and
//! confidence-filter policy.

use crate::error::AcquisitionError;
use crate::pipeline::preprocess::preprocess;
use image::{DynamicImage, RgbImage};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Axis-aligned box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// One recognised text fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub text: String,
    /// 0.0–1.0.
    pub confidence: f32,
}

impl Detection {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox: BoundingBox::default(),
            text: text.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum OcrError {
    #[error("OCR engine could not be initialised: {0}")]
    Init(String),
    #[error("OCR engine failed: {0}")]
    Run(String),
}

/// A recognition engine.
pub trait TextDetector: Send + Sync {
    /// Detections in reading order.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, OcrError>;

    /// Whether `detect` may run on several threads at once.
    fn is_reentrant(&self) -> bool {
        true
    }
}

/// An initialised engine plus its access gate.
pub struct SharedEngine {
    engine: Arc<dyn TextDetector>,
    gate: Option<Mutex<()>>,
}

impl SharedEngine {
    fn new(engine: Arc<dyn TextDetector>) -> Self {
        let gate = (!engine.is_reentrant()).then(|| Mutex::new(()));
        Self { engine, gate }
    }

    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, OcrError> {
        match &self.gate {
            Some(gate) => {
                let _guard = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                self.engine.detect(image)
            }
            None => self.engine.detect(image),
        }
    }

    pub fn is_serialised(&self) -> bool {
        self.gate.is_some()
    }
}

type EngineFactory = Box<dyn Fn() -> Result<Arc<dyn TextDetector>, OcrError> + Send + Sync>;

/// Process-wide, lazily constructed engine handle.
///
/// Construction runs at most once on success. A failed construction is not
/// cached, so a later call retries (e.g. after tesseract is installed).
pub struct EngineProvider {
    cell: OnceCell<SharedEngine>,
    factory: Option<EngineFactory>,
}

impl EngineProvider {
    /// Construct the engine with `factory` on first use.
    pub fn lazy<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TextDetector>, OcrError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Some(Box::new(factory)),
        }
    }

    /// Wrap an already constructed engine.
    pub fn with_engine(engine: Arc<dyn TextDetector>) -> Self {
        Self {
            cell: OnceCell::with_value(SharedEngine::new(engine)),
            factory: None,
        }
    }

    pub fn get(&self) -> Result<&SharedEngine, OcrError> {
        self.cell.get_or_try_init(|| {
            let factory = self
                .factory
                .as_ref()
                .ok_or_else(|| OcrError::Init("no engine factory configured".into()))?;
            info!("Initializing OCR engine (this may take a moment on first run)...");
            let engine = factory()?;
            let shared = SharedEngine::new(engine);
            info!(
                "OCR engine initialized{}",
                if shared.is_serialised() { " (serialised access)" } else { "" }
            );
            Ok(shared)
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for EngineProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineProvider")
            .field("initialized", &self.is_initialized())
            .field("lazy", &self.factory.is_some())
            .finish()
    }
}

/// Preprocess → detect → confidence filter → join.
#[derive(Debug, Clone)]
pub struct OpticalRecognizer {
    provider: Arc<EngineProvider>,
    min_confidence: f32,
}

impl OpticalRecognizer {
    pub fn new(provider: Arc<EngineProvider>, min_confidence: f32) -> Self {
        Self {
            provider,
            min_confidence,
        }
    }

    /// Force engine construction, surfacing a failure as a fatal error.
    ///
    /// [`Self::recognize`] only logs engine failures, since a single page
    /// failing must not sink a document. Calling this first keeps a missing
    /// engine from being reported as "no text found".
    pub fn ensure_engine(&self) -> Result<(), AcquisitionError> {
        self.provider
            .get()
            .map(|_| ())
            .map_err(|e| AcquisitionError::EngineUnavailable {
                detail: e.to_string(),
            })
    }

    /// Best-effort text from one image, or `None` if nothing survives.
    pub fn recognize(&self, image: &DynamicImage) -> Option<String> {
        let prepared = preprocess(image);

        let engine = match self.provider.get() {
            Ok(engine) => engine,
            Err(e) => {
                warn!("OCR extraction failed: {}", e);
                return None;
            }
        };

        let detections = match engine.detect(&prepared) {
            Ok(d) => d,
            Err(e) => {
                warn!("OCR extraction failed: {}", e);
                return None;
            }
        };

        if detections.is_empty() {
            warn!("OCR returned no results");
            return None;
        }

        let kept = detections
            .iter()
            .filter(|d| d.confidence > self.min_confidence)
            .count();
        match join_confident(&detections, self.min_confidence) {
            Some(text) => {
                info!(
                    "OCR extracted {} characters ({} of {} text boxes kept)",
                    text.chars().count(),
                    kept,
                    detections.len()
                );
                Some(text)
            }
            None => {
                warn!("OCR extracted no text from image");
                None
            }
        }
    }
}

/// Join the text of detections scoring strictly above `min_confidence`,
/// single-space separated, in detection order.
pub fn join_confident(detections: &[Detection], min_confidence: f32) -> Option<String> {
    let parts: Vec<&str> = detections
        .iter()
        .filter(|d| {
            let keep = d.confidence > min_confidence;
            if !keep {
                debug!("Dropping '{}' (confidence {:.2})", d.text, d.confidence);
            }
            keep
        })
        .map(|d| d.text.as_str())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}
