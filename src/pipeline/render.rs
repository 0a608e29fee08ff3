//! PDF access: page count, embedded text, and page rasterisation via pdfium.
//!
//! ## Why a trait?
//!
//! The acquisition pipeline only needs three questions answered about a PDF.
//! Putting them behind [`PageRasterizer`] lets the pipeline tests script
//! "49 characters of embedded text" or "page 2 fails to render" without a
//! real PDF or the pdfium shared library.
//!
//! ## Handle lifetime
//!
//! Every call binds pdfium, opens the document from bytes and drops it again.
//! There is no cross-call handle reuse; calls are rare next to OCR cost.
//! All methods are blocking; async callers wrap them in `spawn_blocking`.

use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Points per inch in PDF user space.
const BASE_DPI: f32 = 72.0;

/// A rendered page. Owned by the caller that requested it and dropped
/// after recognition.
#[derive(Debug, Clone)]
pub struct RasterPage {
    /// 0-based page index.
    pub index: usize,
    pub image: DynamicImage,
}

/// Why a page count could not be determined.
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    #[error("pdfium library could not be loaded: {0}")]
    Bind(String),
    #[error("document could not be opened: {0}")]
    Open(String),
}

/// Read-only access to a PDF held in memory.
pub trait PageRasterizer: Send + Sync {
    /// Number of pages. `Ok(0)` and `Err` both mean "nothing to OCR";
    /// they are kept apart only for logging.
    fn page_count(&self, pdf: &[u8]) -> Result<usize, RasterError>;

    /// All pages' embedded text as `[Page N]` blocks separated by blank
    /// lines, or `None` if no page has any.
    fn extract_embedded_text(&self, pdf: &[u8]) -> Option<String>;

    /// Render one page at `dpi`. `None` if the index is out of range or
    /// rendering fails.
    fn render_page(&self, pdf: &[u8], index: usize, dpi: u32) -> Option<RasterPage>;
}

/// Format one page's text with its 1-based marker.
pub fn page_block(index: usize, text: &str) -> String {
    format!("[Page {}]\n{}", index + 1, text)
}

/// Join `(0-based index, text)` pairs into the page-marked form.
///
/// Whitespace-only pages are skipped. Returns `None` when nothing remains.
pub fn assemble_pages<I, S>(pages: I) -> Option<String>
where
    I: IntoIterator<Item = (usize, S)>,
    S: AsRef<str>,
{
    let blocks: Vec<String> = pages
        .into_iter()
        .filter(|(_, text)| !text.as_ref().trim().is_empty())
        .map(|(index, text)| page_block(index, text.as_ref()))
        .collect();

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

/// [`PageRasterizer`] backed by the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    lib_path: Option<PathBuf>,
    max_rendered_pixels: Option<u32>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for the pdfium library in `dir` instead of `./` and the system
    /// search path.
    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lib_path = Some(dir.into());
        self
    }

    /// Cap either rendered dimension at `px`, scaling the other to match.
    pub fn with_max_rendered_pixels(mut self, px: u32) -> Self {
        self.max_rendered_pixels = Some(px);
        self
    }

    fn bind(&self) -> Result<Pdfium, RasterError> {
        let bindings = match &self.lib_path {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                Path::new("./"),
            ))
            .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| RasterError::Bind(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, RasterError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| RasterError::Open(format!("{:?}", e)))?;
        Ok(document.pages().len() as usize)
    }

    fn extract_embedded_text(&self, pdf: &[u8]) -> Option<String> {
        let pdfium = match self.bind() {
            Ok(p) => p,
            Err(e) => {
                warn!("Embedded text extraction skipped: {}", e);
                return None;
            }
        };
        let document = match pdfium.load_pdf_from_byte_slice(pdf, None) {
            Ok(d) => d,
            Err(e) => {
                warn!("Failed to open PDF for text extraction: {:?}", e);
                return None;
            }
        };

        let pages = document.pages();
        let mut texts = Vec::with_capacity(pages.len() as usize);
        for (index, page) in pages.iter().enumerate() {
            match page.text() {
                Ok(text) => texts.push((index, text.all())),
                Err(e) => debug!("Page {}: no text layer ({:?})", index + 1, e),
            }
        }

        let assembled = assemble_pages(texts);
        match &assembled {
            Some(text) => info!(
                "Extracted {} characters of embedded text from {} pages",
                text.chars().count(),
                pages.len()
            ),
            None => debug!("No embedded text in PDF"),
        }
        assembled
    }

    fn render_page(&self, pdf: &[u8], index: usize, dpi: u32) -> Option<RasterPage> {
        let pdfium = self
            .bind()
            .map_err(|e| warn!("Page {}: {}", index + 1, e))
            .ok()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| warn!("Page {}: failed to open PDF: {:?}", index + 1, e))
            .ok()?;

        let pages = document.pages();
        let total = pages.len() as usize;
        if index >= total {
            warn!("Page {} not found in PDF (document has {} pages)", index + 1, total);
            return None;
        }

        let page = pages
            .get(index as u16)
            .map_err(|e| warn!("Page {}: {:?}", index + 1, e))
            .ok()?;

        let mut render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / BASE_DPI);
        if let Some(cap) = self.max_rendered_pixels {
            render_config = render_config
                .set_maximum_width(cap as i32)
                .set_maximum_height(cap as i32);
        }

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| warn!("Page {}: rendering failed: {:?}", index + 1, e))
            .ok()?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {} dpi → {}x{} px",
            index + 1,
            dpi,
            image.width(),
            image.height()
        );

        Some(RasterPage { index, image })
    }
}
