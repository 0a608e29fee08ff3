//! [`TextDetector`] backed by the `tesseract` command-line tool.
//!
//! Each call writes the prepared image to a temporary PNG and runs
//! `tesseract <png> stdout -l <lang> --psm <n> tsv`. The TSV report has one
//! row per layout element; words (level 5) are grouped into lines using
//! their `(page, block, paragraph, line)` key, and each line becomes one
//! [`Detection`] whose confidence is the mean of its word confidences.
//!
//! Orientation: when the `osd` model is installed, page segmentation mode 1
//! (automatic segmentation with orientation and script detection) is used;
//! otherwise mode 3 (fully automatic, no OSD).
//!
//! Every call spawns its own process, so the engine is re-entrant.

use crate::pipeline::ocr::{BoundingBox, Detection, OcrError, TextDetector};
use image::{ImageFormat, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

const PSM_AUTO_OSD: u8 = 1;
const PSM_AUTO: u8 = 3;

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
    psm: u8,
}

impl TesseractEngine {
    /// Check the installation and pick the segmentation mode.
    ///
    /// Fails when the binary cannot be run or `language` is not installed.
    pub fn probe(binary: impl AsRef<Path>, language: &str) -> Result<Self, OcrError> {
        let binary = binary.as_ref().to_path_buf();
        let output = Command::new(&binary)
            .arg("--list-langs")
            .output()
            .map_err(|e| {
                OcrError::Init(format!(
                    "failed to run tesseract (is it installed? path='{}'): {}",
                    binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(OcrError::Init(format!(
                "tesseract --list-langs failed (exit code {}): {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // Older releases print the list on stderr.
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push('\n');
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        let langs = parse_language_list(&listing);

        if !langs.iter().any(|l| l == language) {
            return Err(OcrError::Init(format!(
                "tesseract language '{}' is not installed (available: {})",
                language,
                langs.join(", ")
            )));
        }

        let psm = if langs.iter().any(|l| l == "osd") {
            PSM_AUTO_OSD
        } else {
            PSM_AUTO
        };
        info!(
            "tesseract ready: language={}, psm={}{}",
            language,
            psm,
            if psm == PSM_AUTO { " (osd model missing, no orientation detection)" } else { "" }
        );

        Ok(Self {
            binary,
            language: language.to_string(),
            psm,
        })
    }

    pub fn page_segmentation_mode(&self) -> u8 {
        self.psm
    }
}

impl TextDetector for TesseractEngine {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, OcrError> {
        let input = tempfile::Builder::new()
            .prefix("g28-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Run(format!("failed to create temp file: {}", e)))?;

        image
            .save_with_format(input.path(), ImageFormat::Png)
            .map_err(|e| OcrError::Run(format!("failed to write temp image: {}", e)))?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .output()
            .map_err(|e| OcrError::Run(format!("failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            return Err(OcrError::Run(format!(
                "tesseract failed (exit code {}): {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let detections = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!(
            "tesseract: {} lines from {}x{} image",
            detections.len(),
            image.width(),
            image.height()
        );
        Ok(detections)
    }
}

/// Language codes from `--list-langs` output, skipping the header line.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of") && !l.contains(' '))
        .map(str::to_string)
        .collect()
}

#[derive(Default)]
struct LineAcc {
    bbox: BoundingBox,
    words: Vec<String>,
    conf_sum: f32,
    conf_n: u32,
}

/// Group word rows of a tesseract TSV report into line detections.
pub fn parse_tsv(tsv: &str) -> Vec<Detection> {
    let mut order: Vec<(u32, u32, u32, u32)> = Vec::new();
    let mut lines: HashMap<(u32, u32, u32, u32), LineAcc> = HashMap::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 11 {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().ok();
        let (Some(level), Some(page), Some(block), Some(par), Some(line)) =
            (num(0), num(1), num(2), num(3), num(4))
        else {
            continue;
        };
        let key = (page, block, par, line);

        match level {
            4 => {
                let acc = lines.entry(key).or_insert_with(|| {
                    order.push(key);
                    LineAcc::default()
                });
                acc.bbox = BoundingBox {
                    left: num(6).unwrap_or(0),
                    top: num(7).unwrap_or(0),
                    width: num(8).unwrap_or(0),
                    height: num(9).unwrap_or(0),
                };
            }
            5 => {
                let text = cols.get(11).map(|t| t.trim()).unwrap_or("");
                if text.is_empty() {
                    continue;
                }
                let acc = lines.entry(key).or_insert_with(|| {
                    order.push(key);
                    LineAcc::default()
                });
                acc.words.push(text.to_string());
                if let Ok(conf) = cols[10].trim().parse::<f32>() {
                    if conf >= 0.0 {
                        acc.conf_sum += conf / 100.0;
                        acc.conf_n += 1;
                    }
                }
            }
            _ => {}
        }
    }

    order
        .into_iter()
        .filter_map(|key| lines.remove(&key))
        .filter(|acc| !acc.words.is_empty())
        .map(|acc| Detection {
            bbox: acc.bbox,
            text: acc.words.join(" "),
            confidence: if acc.conf_n == 0 {
                0.0
            } else {
                acc.conf_sum / acc.conf_n as f32
            },
        })
        .collect()
}
