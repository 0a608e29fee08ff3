//! [`TextDetector`] backed by `oar-ocr` (PaddleOCR models on ONNX Runtime).
//!
//! The pipeline runs, per image:
//!
//! 1. document orientation classification (0/90/180/270°, page rotated back),
//! 2. document rectification (UVDoc unwarping of curved or skewed scans),
//! 3. text detection,
//! 4. text-line orientation classification (upside-down lines flipped),
//! 5. text recognition.
//!
//! All six model files are read from one directory:
//!
//! ```text
//! <models>/
//!   pp-ocrv5_mobile_det.onnx
//!   pp-ocrv5_mobile_rec.onnx
//!   ppocrv5_dict.txt
//!   pp-lcnet_x1_0_doc_ori.onnx
//!   pp-lcnet_x1_0_textline_ori.onnx
//!   uvdoc.onnx
//! ```

use crate::pipeline::ocr::{Detection, OcrError, TextDetector};
use image::RgbImage;
use oar_ocr::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

pub const DETECTION_MODEL: &str = "pp-ocrv5_mobile_det.onnx";
pub const RECOGNITION_MODEL: &str = "pp-ocrv5_mobile_rec.onnx";
pub const CHARACTER_DICT: &str = "ppocrv5_dict.txt";
pub const DOCUMENT_ORIENTATION_MODEL: &str = "pp-lcnet_x1_0_doc_ori.onnx";
pub const TEXT_LINE_ORIENTATION_MODEL: &str = "pp-lcnet_x1_0_textline_ori.onnx";
pub const RECTIFICATION_MODEL: &str = "uvdoc.onnx";

/// Resolved model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddleModels {
    pub detection: PathBuf,
    pub recognition: PathBuf,
    pub dictionary: PathBuf,
    pub document_orientation: PathBuf,
    pub text_line_orientation: PathBuf,
    pub rectification: PathBuf,
}

impl PaddleModels {
    /// Locate every model under `dir`. Fails listing all missing files.
    pub fn in_dir(dir: &Path) -> Result<Self, OcrError> {
        let models = Self {
            detection: dir.join(DETECTION_MODEL),
            recognition: dir.join(RECOGNITION_MODEL),
            dictionary: dir.join(CHARACTER_DICT),
            document_orientation: dir.join(DOCUMENT_ORIENTATION_MODEL),
            text_line_orientation: dir.join(TEXT_LINE_ORIENTATION_MODEL),
            rectification: dir.join(RECTIFICATION_MODEL),
        };
        let missing: Vec<String> = models
            .all()
            .iter()
            .filter(|p| !p.is_file())
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        if !missing.is_empty() {
            return Err(OcrError::Init(format!(
                "OCR models missing from '{}': {}",
                dir.display(),
                missing.join(", ")
            )));
        }
        Ok(models)
    }

    fn all(&self) -> [&PathBuf; 6] {
        [
            &self.detection,
            &self.recognition,
            &self.dictionary,
            &self.document_orientation,
            &self.text_line_orientation,
            &self.rectification,
        ]
    }
}

pub struct PaddleEngine {
    // predict needs exclusive access to the ONNX sessions.
    ocr: Mutex<OAROCR>,
}

impl PaddleEngine {
    pub fn load(dir: &Path) -> Result<Self, OcrError> {
        let models = PaddleModels::in_dir(dir)?;
        let ocr = OAROCRBuilder::new(
            models.detection.clone(),
            models.recognition.clone(),
            models.dictionary.clone(),
        )
        .with_document_image_orientation_classification(models.document_orientation.clone())
        .with_document_image_rectification(models.rectification.clone())
        .with_text_line_orientation_classification(models.text_line_orientation.clone())
        .build()
        .map_err(|e| OcrError::Init(format!("oar-ocr pipeline: {e}")))?;

        info!(
            "oar-ocr ready from {} (orientation, rectification, text-line orientation)",
            dir.display()
        );
        Ok(Self {
            ocr: Mutex::new(ocr),
        })
    }
}

impl TextDetector for PaddleEngine {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, OcrError> {
        let ocr = self
            .ocr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let results = ocr
            .predict(vec![image.clone()])
            .map_err(|e| OcrError::Run(format!("oar-ocr: {e}")))?;

        Ok(results
            .iter()
            .flat_map(|result| result.text_regions.iter())
            .filter_map(|region| region.text_with_confidence())
            .map(|(text, confidence)| Detection::new(text.to_string(), confidence))
            .collect())
    }

    fn is_reentrant(&self) -> bool {
        false
    }
}
