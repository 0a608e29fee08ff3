//! Configuration types for passport + G-28 processing and form filling.
//!
//! Pipeline behaviour is controlled through [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. Browser-side behaviour lives separately in
//! [`FormFillConfig`] because the extraction pipeline runs fine without a
//! form to fill (`--no-fill`).

use crate::error::AutofillError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Model used for the gemini provider when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// How the passport's text is obtained when its embedded text is too short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassportStrategy {
    /// Transcribe with the remote multimodal model, falling back to local OCR
    /// if that fails. (default)
    #[default]
    RemoteModel,
    /// Local optical recognition only; no document bytes leave the machine
    /// except the assembled text.
    LocalOcr,
}

/// Configuration for a processing run.
///
/// # Example
/// ```rust
/// use g28_autofill::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(200)
///     .ocr_min_confidence(0.5)
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rendering DPI for OCR rasterisation. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Longest edge of a rendered page in pixels. Default: 5000.
    ///
    /// A Letter page at 300 DPI is 2550 × 3300 px; the cap only bites on
    /// oversized pages.
    pub max_rendered_pixels: u32,

    /// Minimum trimmed length of embedded text, in characters, for it to be
    /// accepted without OCR. Default: 50.
    pub embedded_text_threshold: usize,

    /// OCR detections at or below this confidence are dropped. Default: 0.3.
    pub ocr_min_confidence: f32,

    /// Pages recognised concurrently within one document. Default: 1.
    pub ocr_concurrency: usize,

    pub passport_strategy: PassportStrategy,

    /// LLM model identifier. If None, the resolved provider's default
    /// ([`DEFAULT_MODEL`] for gemini).
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Key for the Gemini provider and the Gemini File API.
    pub gemini_api_key: Option<String>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Retries on network-class failures. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Ask the model once more when it returns unparseable JSON. Default: true.
    pub retry_on_invalid_json: bool,

    /// Per remote call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Upload size limit in MiB. Default: 20.
    pub max_file_size_mb: u64,

    /// Tesseract executable. Default: `tesseract` on `PATH`.
    pub tesseract_path: PathBuf,

    /// Tesseract language model. Default: `eng`.
    pub ocr_language: String,

    /// Directory of PaddleOCR models for the `oar-ocr` engine (requires the
    /// `paddle` feature). When set, that engine is used instead of
    /// tesseract. The expected files are listed in `pipeline::paddle`.
    pub ocr_models_dir: Option<PathBuf>,

    /// Directory holding the pdfium shared library. If None, `./` and then
    /// the system library are tried.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Custom extraction prompt template. Must contain `{passport_text}` and
    /// `{g28_text}`. If None, uses the built-in prompt.
    pub extraction_prompt: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 5000,
            embedded_text_threshold: 50,
            ocr_min_confidence: 0.3,
            ocr_concurrency: 1,
            passport_strategy: PassportStrategy::default(),
            model: None,
            provider_name: None,
            provider: None,
            gemini_api_key: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            retry_on_invalid_json: true,
            api_timeout_secs: 120,
            max_file_size_mb: 20,
            tesseract_path: PathBuf::from("tesseract"),
            ocr_language: "eng".to_string(),
            ocr_models_dir: None,
            pdfium_lib_path: None,
            extraction_prompt: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("embedded_text_threshold", &self.embedded_text_threshold)
            .field("ocr_min_confidence", &self.ocr_min_confidence)
            .field("ocr_concurrency", &self.ocr_concurrency)
            .field("passport_strategy", &self.passport_strategy)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_on_invalid_json", &self.retry_on_invalid_json)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("tesseract_path", &self.tesseract_path)
            .field("ocr_language", &self.ocr_language)
            .field("ocr_models_dir", &self.ocr_models_dir)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn embedded_text_threshold(mut self, chars: usize) -> Self {
        self.config.embedded_text_threshold = chars;
        self
    }

    /// Not clamped: out-of-range values are rejected by [`Self::build`].
    pub fn ocr_min_confidence(mut self, c: f32) -> Self {
        self.config.ocr_min_confidence = c;
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_concurrency = n.max(1);
        self
    }

    pub fn passport_strategy(mut self, strategy: PassportStrategy) -> Self {
        self.config.passport_strategy = strategy;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.gemini_api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn retry_on_invalid_json(mut self, v: bool) -> Self {
        self.config.retry_on_invalid_json = v;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb;
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn ocr_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.ocr_models_dir = Some(dir.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, AutofillError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(AutofillError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if !(0.0..=1.0).contains(&c.ocr_min_confidence) {
            return Err(AutofillError::InvalidConfig(format!(
                "OCR confidence must be within 0.0–1.0, got {}",
                c.ocr_min_confidence
            )));
        }
        if c.ocr_concurrency == 0 {
            return Err(AutofillError::InvalidConfig(
                "OCR concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_file_size_mb == 0 {
            return Err(AutofillError::InvalidConfig(
                "Maximum file size must be a positive number of MB".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(AutofillError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(AutofillError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.ocr_models_dir.is_some() && !cfg!(feature = "paddle") {
            return Err(AutofillError::InvalidConfig(
                "OCR models directory given, but this build has no oar-ocr engine \
                 (rebuild with --features paddle)"
                    .into(),
            ));
        }
        if let Some(prompt) = &c.extraction_prompt {
            for placeholder in ["{passport_text}", "{g28_text}"] {
                if !prompt.contains(placeholder) {
                    return Err(AutofillError::InvalidConfig(format!(
                        "Custom extraction prompt is missing the {placeholder} placeholder"
                    )));
                }
            }
        }
        Ok(self.config)
    }
}

// ── Form filling ─────────────────────────────────────────────────────────

/// How the browser session is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// One invisible session per fill, always closed afterwards. Also
    /// prints the filled form to PDF. (default)
    #[default]
    Headless,
    /// A visible, long-lived session for debugging. Never shared between
    /// concurrent requests.
    Interactive,
}

/// Browser driven through WebDriver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
}

/// Settings for the browser-driving collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormFillConfig {
    /// Destination form. Must be http(s).
    pub form_url: String,
    /// WebDriver endpoint (chromedriver defaults to port 9515).
    pub webdriver_url: String,
    pub browser: Browser,
    pub mode: FillMode,
    /// Where `form_populated.png` / `form_filled.pdf` are written.
    pub output_dir: PathBuf,
    /// Per WebDriver command timeout in seconds. Default: 30.
    pub command_timeout_secs: u64,
}

impl FormFillConfig {
    pub const DEFAULT_WEBDRIVER_URL: &'static str = "http://localhost:9515";

    /// Create a headless configuration for `form_url`.
    pub fn new(form_url: impl Into<String>) -> Result<Self, AutofillError> {
        let form_url = form_url.into();
        if form_url.trim().is_empty() {
            return Err(AutofillError::InvalidConfig(
                "FORM_URL is required but not set".into(),
            ));
        }
        if !(form_url.starts_with("http://") || form_url.starts_with("https://")) {
            return Err(AutofillError::InvalidConfig(format!(
                "FORM_URL must start with http:// or https://. Got: {form_url}"
            )));
        }
        Ok(Self {
            form_url,
            webdriver_url: Self::DEFAULT_WEBDRIVER_URL.to_string(),
            browser: Browser::default(),
            mode: FillMode::default(),
            output_dir: PathBuf::from("uploads"),
            command_timeout_secs: 30,
        })
    }

    pub fn with_webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.webdriver_url = url.into();
        self
    }

    pub fn with_browser(mut self, browser: Browser) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_mode(mut self, mode: FillMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn headless(&self) -> bool {
        self.mode == FillMode::Headless
    }
}
