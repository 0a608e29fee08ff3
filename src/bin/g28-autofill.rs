//! CLI binary for g28-autofill.
//!
//! A thin shim over the library crate: maps flags onto `PipelineConfig` and
//! `FormFillConfig`, runs the pipeline, fills the form and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use g28_autofill::{
    Browser, DebugSession, DocumentRole, FillMode, FillReport, FormFillAdapter, FormFillConfig,
    PassportStrategy, Pipeline, PipelineConfig, ProcessProgressCallback, ProcessingOutcome,
    ProgressCallback, TextSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner with one log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Validating uploads…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProcessProgressCallback for CliProgressCallback {
    fn on_process_start(&self) {
        self.bar.set_prefix("Reading");
        self.bar.set_message("passport and G-28");
    }

    fn on_document_complete(&self, role: DocumentRole, source: TextSource, chars: usize) {
        let via = match source {
            TextSource::Embedded => "embedded text",
            TextSource::Optical => "OCR",
            TextSource::RemoteModel => "remote model",
        };
        self.bar.println(format!(
            "  {} {:<9} {}  {}",
            green("✓"),
            role.to_string(),
            dim(&format!("{chars:>6} chars")),
            dim(via)
        ));
    }

    fn on_document_error(&self, role: DocumentRole, _error: &str) {
        self.bar.println(format!("  {} {}", red("✘"), role));
    }

    fn on_extraction_start(&self, model: &str) {
        self.bar.set_prefix("Extracting");
        self.bar.set_message(format!("with {model}"));
    }

    fn on_process_complete(&self, mapped_fields: usize, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {} fields mapped  {}",
            green("✓"),
            bold(&mapped_fields.to_string()),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0))
        ));
        self.finish();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract and fill (headless; writes uploads/form_populated.png + form_filled.pdf)
  g28-autofill --passport passport.pdf --g28 g28.pdf --form-url https://example.com/form

  # Extract only, print JSON
  g28-autofill --passport passport.jpg --g28 g28.pdf --no-fill --json

  # Watch the browser fill the form; Ctrl-C closes it
  g28-autofill --passport passport.png --g28 g28.pdf --form-url http://localhost:8000 --interactive

  # Keep the passport on this machine (local OCR only)
  g28-autofill --passport-strategy local-ocr --passport p.pdf --g28 g.pdf --no-fill

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  FORM_URL                Destination form (http/https)
  WEBDRIVER_URL           WebDriver endpoint (default http://localhost:9515)
  PDFIUM_LIB_PATH         Directory containing libpdfium
  TESSERACT_PATH          tesseract binary (default: tesseract on PATH)
  G28_OCR_MODELS          PaddleOCR models for the oar-ocr engine

SETUP:
  1. Install the pdfium shared library, and tesseract or the PaddleOCR
     models (cargo install --features paddle).
  2. Start chromedriver (or geckodriver with --browser firefox).
  3. export GEMINI_API_KEY=...
"#;

/// Fill a web form from a passport and a G-28.
#[derive(Parser, Debug)]
#[command(
    name = "g28-autofill",
    version,
    about = "Extract passport and G-28 data with an LLM and fill the destination web form",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Passport scan (PDF, JPEG or PNG).
    #[arg(long)]
    passport: PathBuf,

    /// G-28 form (PDF, JPEG or PNG).
    #[arg(long)]
    g28: PathBuf,

    /// Destination form URL.
    #[arg(long, env = "FORM_URL")]
    form_url: Option<String>,

    /// Stop after mapping; do not open a browser.
    #[arg(long)]
    no_fill: bool,

    /// Fill in a visible browser that stays open until Ctrl-C.
    #[arg(long)]
    interactive: bool,

    /// WebDriver endpoint.
    #[arg(long, env = "WEBDRIVER_URL", default_value = FormFillConfig::DEFAULT_WEBDRIVER_URL)]
    webdriver_url: String,

    #[arg(long, value_enum, default_value = "chrome")]
    browser: BrowserArg,

    /// Directory for the screenshot and PDF.
    #[arg(long, env = "G28_OUTPUT_DIR", default_value = "uploads")]
    output_dir: PathBuf,

    /// LLM model ID (default: gemini-2.0-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, …
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// How passport text is obtained when the PDF has no usable text layer.
    #[arg(long, env = "G28_PASSPORT_STRATEGY", value_enum, default_value = "remote-model")]
    passport_strategy: StrategyArg,

    /// Rendering DPI for OCR (72–600).
    #[arg(long, env = "G28_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Minimum OCR confidence (0.0–1.0).
    #[arg(long, env = "G28_OCR_CONFIDENCE", default_value_t = 0.3)]
    ocr_confidence: f32,

    /// Pages recognised in parallel.
    #[arg(long, env = "G28_OCR_CONCURRENCY", default_value_t = 1)]
    ocr_concurrency: usize,

    /// Tesseract language model.
    #[arg(long, env = "G28_OCR_LANGUAGE", default_value = "eng")]
    ocr_language: String,

    #[arg(long, env = "TESSERACT_PATH", default_value = "tesseract")]
    tesseract: PathBuf,

    /// PaddleOCR model directory; selects the oar-ocr engine (orientation,
    /// unwarping, text-line orientation). Needs a `paddle` build.
    #[arg(long, env = "G28_OCR_MODELS")]
    ocr_models: Option<PathBuf>,

    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Maximum upload size in MB.
    #[arg(long, env = "G28_MAX_FILE_SIZE_MB", default_value_t = 20)]
    max_file_size: u64,

    /// Retries on network-class LLM failures.
    #[arg(long, env = "G28_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// LLM call timeout in seconds.
    #[arg(long, env = "G28_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    #[arg(long, env = "G28_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    #[arg(long, env = "G28_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Text file with a custom extraction prompt ({passport_text} and {g28_text} placeholders).
    #[arg(long, env = "G28_EXTRACTION_PROMPT")]
    extraction_prompt: Option<PathBuf>,

    /// Print a JSON payload instead of the human summary.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "G28_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "G28_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "G28_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BrowserArg {
    Chrome,
    Firefox,
}

impl From<BrowserArg> for Browser {
    fn from(v: BrowserArg) -> Self {
        match v {
            BrowserArg::Chrome => Browser::Chrome,
            BrowserArg::Firefox => Browser::Firefox,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    RemoteModel,
    LocalOcr,
}

impl From<StrategyArg> for PassportStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::RemoteModel => PassportStrategy::RemoteModel,
            StrategyArg::LocalOcr => PassportStrategy::LocalOcr,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO library logs are suppressed while the spinner is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // Validate the fill settings before spending an LLM call.
    let fill_config = if cli.no_fill {
        None
    } else {
        let url = cli
            .form_url
            .clone()
            .context("--form-url (or FORM_URL) is required unless --no-fill is given")?;
        let mode = if cli.interactive {
            FillMode::Interactive
        } else {
            FillMode::Headless
        };
        Some(
            FormFillConfig::new(url)?
                .with_webdriver_url(cli.webdriver_url.clone())
                .with_browser(cli.browser.into())
                .with_mode(mode)
                .with_output_dir(cli.output_dir.clone()),
        )
    };

    let config = build_config(&cli).await?;
    let progress = show_progress.then(CliProgressCallback::new);

    let mut pipeline = Pipeline::from_config(&config).context("Failed to initialise the pipeline")?;
    if let Some(cb) = &progress {
        pipeline = pipeline.with_progress(Arc::clone(cb) as ProgressCallback);
    }

    let outcome = pipeline.process_paths(&cli.passport, &cli.g28).await;
    if let Some(cb) = &progress {
        cb.finish();
    }
    let outcome = outcome.context("Processing failed")?;

    let report = match fill_config {
        None => None,
        Some(fc) if fc.headless() => {
            if !cli.quiet && !cli.json {
                eprintln!("{} Filling {}", cyan("◆"), bold(&fc.form_url));
            }
            Some(FormFillAdapter::new(fc).fill(&outcome.fields, &outcome.checkboxes).await)
        }
        Some(fc) => Some(fill_interactive(fc, &outcome).await?),
    };

    if cli.json {
        let payload = serde_json::json!({ "outcome": &outcome, "fill": &report });
        let json = serde_json::to_string_pretty(&payload).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&outcome, report.as_ref());
    }

    match report {
        Some(r) if !r.success => bail!(
            "Form filling failed: {}",
            r.error.as_deref().unwrap_or("no field could be filled")
        ),
        _ => Ok(()),
    }
}

/// Fill in a visible browser and keep it open until Ctrl-C.
async fn fill_interactive(config: FormFillConfig, outcome: &ProcessingOutcome) -> Result<FillReport> {
    let session = DebugSession::start(config)
        .await
        .context("Failed to start the debug browser session")?;
    let report = session.fill(&outcome.fields, &outcome.checkboxes).await;
    eprintln!(
        "{} Browser left open for inspection. Press Ctrl-C to close it.",
        cyan("◆")
    );
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("{} Failed to wait for Ctrl-C: {e}", red("✘"));
    }
    session.stop().await;
    Ok(report)
}

fn print_summary(outcome: &ProcessingOutcome, report: Option<&FillReport>) {
    println!("{}", bold("Extracted fields"));
    for (id, value) in outcome.fields.non_empty() {
        println!("  {:<28} {}", id, value);
    }
    for (id, checked) in outcome.checkboxes.iter() {
        println!("  {:<28} {}", id, if checked { "[x]" } else { "[ ]" });
    }
    if let Some(notes) = &outcome.validation_notes {
        println!("\n{} {}", bold("Notes:"), notes);
    }
    eprintln!(
        "{}",
        dim(&format!(
            "acquisition {}ms, extraction {}ms, total {}ms",
            outcome.timings.acquisition_ms, outcome.timings.extraction_ms, outcome.timings.total_ms
        ))
    );

    let Some(report) = report else {
        return;
    };
    let mark = if report.success && report.total_failed == 0 {
        green("✔")
    } else if report.success {
        cyan("⚠")
    } else {
        red("✘")
    };
    eprintln!(
        "{} {} fields filled, {} failed",
        mark,
        bold(&report.total_filled.to_string()),
        report.total_failed
    );
    if !report.failed_fields.is_empty() {
        eprintln!("   failed: {}", report.failed_fields.join(", "));
    }
    for path in report.screenshot_path.iter().chain(report.pdf_path.iter()) {
        eprintln!("   {} {}", dim("→"), path.display());
    }
    if let Some(error) = &report.error {
        eprintln!("   {}", red(error));
    }
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .ocr_min_confidence(cli.ocr_confidence)
        .ocr_concurrency(cli.ocr_concurrency)
        .ocr_language(cli.ocr_language.clone())
        .tesseract_path(cli.tesseract.clone())
        .passport_strategy(cli.passport_strategy.into())
        .max_file_size_mb(cli.max_file_size)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens);

    if let Some(dir) = &cli.ocr_models {
        builder = builder.ocr_models_dir(dir.clone());
    }
    if let Some(model) = &cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(key) = &cli.gemini_api_key {
        builder = builder.gemini_api_key(key.clone());
    }
    if let Some(dir) = &cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(dir.clone());
    }
    if let Some(path) = &cli.extraction_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read extraction prompt from {:?}", path))?;
        builder = builder.extraction_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}
