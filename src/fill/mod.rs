//! Form filling: drive the destination web form from the two field maps.
//!
//! The browser is reached through the [`FormDriver`] port (locate elements
//! by CSS, set values, capture artifacts). [`fill_form`] implements the
//! contract on top of it:
//!
//! - empty values are skipped, never written as blanks;
//! - the virtual second given-name id resolves to the *second*
//!   `#passport-given-names` element;
//! - `<select>` elements get option selection, everything else is typed;
//! - checkboxes are explicitly checked or unchecked;
//! - one field failing is recorded in the [`FillReport`] and the run goes
//!   on. The run is a success when at least one field was filled.
//!
//! Session management lives in [`session`]: [`FormFillAdapter`] opens a
//! headless session per request, [`DebugSession`] keeps a visible browser
//! open until it is stopped. [`webdriver::WebDriverClient`] is the W3C
//! WebDriver implementation of [`FormDriver`].

pub mod session;
pub mod webdriver;

pub use session::{DebugSession, FormFillAdapter};
pub use webdriver::WebDriverClient;

use crate::mapping::{field_ids, CheckboxMap, FieldValueMap};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SCREENSHOT_FILE: &str = "form_populated.png";
pub const PDF_FILE: &str = "form_filled.pdf";

/// Opaque reference to an element in the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("WebDriver request failed: {0}")]
    Transport(String),
    #[error("WebDriver error '{error}': {message}")]
    Command { error: String, message: String },
    #[error("unexpected WebDriver response: {0}")]
    Protocol(String),
    #[error("no option '{0}' in select element")]
    NoSuchOption(String),
}

/// Browser operations needed to fill a form.
#[async_trait]
pub trait FormDriver: Send + Sync {
    /// Load `url` and wait for the document to finish loading.
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;
    /// All elements matching `css`, in document order.
    async fn find_all(&self, css: &str) -> Result<Vec<ElementHandle>, DriverError>;
    /// Lowercase tag name.
    async fn tag_name(&self, element: &ElementHandle) -> Result<String, DriverError>;
    /// Replace the element's value with `value`.
    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError>;
    /// Select the option whose value (or visible text) is `value`.
    async fn select_option(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError>;
    async fn set_checked(&self, element: &ElementHandle, checked: bool) -> Result<(), DriverError>;
    /// PNG of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;
    /// PDF of the current page. Only headless browsers support this.
    async fn print_pdf(&self) -> Result<Vec<u8>, DriverError>;
    async fn close(&self) -> Result<(), DriverError>;
}

/// Outcome of one fill run. Never an error: partial success is useful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FillReport {
    pub success: bool,
    pub total_filled: usize,
    pub total_failed: usize,
    pub filled_fields: Vec<String>,
    pub failed_fields: Vec<String>,
    pub screenshot_path: Option<PathBuf>,
    pub pdf_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl FillReport {
    /// A run that could not start or was aborted.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    fn record(&mut self, id: &str, result: Result<(), String>) {
        match result {
            Ok(()) => self.filled_fields.push(id.to_string()),
            Err(reason) => {
                warn!("Failed to fill '{}': {}", id, reason);
                self.failed_fields.push(id.to_string());
            }
        }
    }

    fn finish(mut self) -> Self {
        self.total_filled = self.filled_fields.len();
        self.total_failed = self.failed_fields.len();
        self.success = self.total_filled > 0;
        self
    }
}

/// Where artifacts go and which ones to produce.
#[derive(Debug, Clone)]
pub struct ArtifactOptions {
    pub output_dir: PathBuf,
    pub generate_pdf: bool,
}

/// CSS selector and 0-based match index for a field id.
pub fn locate(field_id: &str) -> (String, usize) {
    if field_id == field_ids::PASSPORT_MIDDLE_NAME {
        (format!("#{}", field_ids::PASSPORT_GIVEN_NAMES), 1)
    } else {
        (format!("#{field_id}"), 0)
    }
}

async fn nth_element(
    driver: &dyn FormDriver,
    field_id: &str,
) -> Result<ElementHandle, String> {
    let (css, index) = locate(field_id);
    let mut matches = driver.find_all(&css).await.map_err(|e| e.to_string())?;
    if index < matches.len() {
        Ok(matches.swap_remove(index))
    } else {
        Err(format!("field not found ({css}, match {})", index + 1))
    }
}

async fn fill_one(driver: &dyn FormDriver, field_id: &str, value: &str) -> Result<(), String> {
    let element = nth_element(driver, field_id).await?;
    let tag = driver.tag_name(&element).await.map_err(|e| e.to_string())?;
    if tag.eq_ignore_ascii_case("select") {
        driver.select_option(&element, value).await.map_err(|e| e.to_string())?;
        debug!("Selected '{}' in '{}'", value, field_id);
    } else {
        driver.fill(&element, value).await.map_err(|e| e.to_string())?;
        debug!("Filled '{}': {}", field_id, value);
    }
    Ok(())
}

async fn check_one(driver: &dyn FormDriver, field_id: &str, checked: bool) -> Result<(), String> {
    let element = nth_element(driver, field_id).await?;
    driver
        .set_checked(&element, checked)
        .await
        .map_err(|e| e.to_string())
}

async fn save_artifact(dir: &Path, name: &str, bytes: &[u8]) -> Option<PathBuf> {
    let path = dir.join(name);
    let written = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, bytes).await
    }
    .await;
    match written {
        Ok(()) => {
            info!("Saved {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Failed to write {}: {}", path.display(), e);
            None
        }
    }
}

/// Fill the form at `url` through `driver`.
///
/// Does not close the driver; the caller owns the session.
pub async fn fill_form(
    driver: &dyn FormDriver,
    url: &str,
    fields: &FieldValueMap,
    checkboxes: &CheckboxMap,
    artifacts: &ArtifactOptions,
) -> FillReport {
    info!("Navigating to form: {}", url);
    if let Err(e) = driver.navigate(url).await {
        return FillReport::failed(format!("Form population failed: {e}"));
    }

    let mut report = FillReport::default();

    let to_fill: Vec<(&str, &str)> = fields.non_empty().collect();
    info!("Filling {} text fields...", to_fill.len());
    for (id, value) in to_fill {
        let result = fill_one(driver, id, value).await;
        report.record(id, result);
    }

    info!("Setting {} checkboxes...", checkboxes.len());
    for (id, checked) in checkboxes.iter() {
        let result = check_one(driver, id, checked).await;
        report.record(id, result);
    }

    match driver.screenshot().await {
        Ok(png) => {
            report.screenshot_path = save_artifact(&artifacts.output_dir, SCREENSHOT_FILE, &png).await
        }
        Err(e) => warn!("Screenshot failed: {}", e),
    }

    if artifacts.generate_pdf {
        match driver.print_pdf().await {
            Ok(pdf) => report.pdf_path = save_artifact(&artifacts.output_dir, PDF_FILE, &pdf).await,
            Err(e) => warn!("PDF export failed: {}", e),
        }
    }

    let report = report.finish();
    info!(
        "Form filled: {} fields filled, {} failed",
        report.total_filled, report.total_failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory page: css selector → (tag, element ids).
    #[derive(Default)]
    struct FakePage {
        elements: HashMap<String, Vec<(String, String)>>,
        actions: Mutex<Vec<String>>,
        fail_navigation: bool,
    }

    impl FakePage {
        fn with(mut self, css: &str, tag: &str, ids: &[&str]) -> Self {
            self.elements.insert(
                css.to_string(),
                ids.iter().map(|id| (tag.to_string(), id.to_string())).collect(),
            );
            self
        }

        fn log(&self, entry: String) {
            self.actions.lock().unwrap().push(entry);
        }

        fn tag_of(&self, el: &ElementHandle) -> String {
            self.elements
                .values()
                .flatten()
                .find(|(_, id)| *id == el.0)
                .map(|(tag, _)| tag.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl FormDriver for FakePage {
        async fn navigate(&self, url: &str) -> Result<(), DriverError> {
            if self.fail_navigation {
                return Err(DriverError::Transport("connection refused".into()));
            }
            self.log(format!("goto {url}"));
            Ok(())
        }
        async fn find_all(&self, css: &str) -> Result<Vec<ElementHandle>, DriverError> {
            Ok(self
                .elements
                .get(css)
                .map(|els| els.iter().map(|(_, id)| ElementHandle(id.clone())).collect())
                .unwrap_or_default())
        }
        async fn tag_name(&self, el: &ElementHandle) -> Result<String, DriverError> {
            Ok(self.tag_of(el))
        }
        async fn fill(&self, el: &ElementHandle, value: &str) -> Result<(), DriverError> {
            self.log(format!("fill {}={}", el.0, value));
            Ok(())
        }
        async fn select_option(&self, el: &ElementHandle, value: &str) -> Result<(), DriverError> {
            self.log(format!("select {}={}", el.0, value));
            Ok(())
        }
        async fn set_checked(&self, el: &ElementHandle, checked: bool) -> Result<(), DriverError> {
            self.log(format!("check {}={}", el.0, checked));
            Ok(())
        }
        async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
            Ok(b"\x89PNG".to_vec())
        }
        async fn print_pdf(&self) -> Result<Vec<u8>, DriverError> {
            Ok(b"%PDF".to_vec())
        }
        async fn close(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn artifacts(dir: &Path, generate_pdf: bool) -> ArtifactOptions {
        ArtifactOptions {
            output_dir: dir.to_path_buf(),
            generate_pdf,
        }
    }

    #[test]
    fn virtual_id_targets_second_given_names_element() {
        assert_eq!(locate("passport-middle-name"), ("#passport-given-names".into(), 1));
        assert_eq!(locate("passport-given-names"), ("#passport-given-names".into(), 0));
        assert_eq!(locate("city"), ("#city".into(), 0));
    }

    #[tokio::test]
    async fn fills_skips_blanks_and_records_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::default()
            .with("#passport-given-names", "input", &["gn-1", "gn-2"])
            .with("#passport-sex", "select", &["sex"])
            .with("#not-subject", "input", &["ns"]);
        let fields: FieldValueMap = [
            ("passport-given-names", "John"),
            ("passport-middle-name", "Q"),
            ("passport-sex", "M"),
            ("passport-surname", ""),
            ("bar-number", "12345"),
        ]
        .into_iter()
        .collect();
        let checkboxes: CheckboxMap = [("not-subject", false)].into_iter().collect();

        let report = fill_form(&page, "http://form", &fields, &checkboxes, &artifacts(dir.path(), true)).await;

        let actions = page.actions.lock().unwrap().clone();
        assert!(actions.contains(&"fill gn-1=John".to_string()));
        assert!(actions.contains(&"fill gn-2=Q".to_string()));
        assert!(actions.contains(&"select sex=M".to_string()));
        assert!(actions.contains(&"check ns=false".to_string()));
        assert!(!actions.iter().any(|a| a.contains("surname")));

        assert!(report.success);
        assert_eq!(report.total_filled, 4);
        assert_eq!(report.failed_fields, vec!["bar-number".to_string()]);
        assert_eq!(report.screenshot_path, Some(dir.path().join(SCREENSHOT_FILE)));
        assert_eq!(report.pdf_path, Some(dir.path().join(PDF_FILE)));
        assert!(dir.path().join(PDF_FILE).exists());
    }

    #[tokio::test]
    async fn all_failed_run_is_not_a_success() {
        let dir = tempfile::tempdir().unwrap();
        let fields: FieldValueMap = [("city", "Boston")].into_iter().collect();
        let report = fill_form(
            &FakePage::default(),
            "http://form",
            &fields,
            &CheckboxMap::default(),
            &artifacts(dir.path(), false),
        )
        .await;
        assert!(!report.success);
        assert_eq!(report.total_failed, 1);
        assert_eq!(report.pdf_path, None);
    }

    #[tokio::test]
    async fn navigation_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage {
            fail_navigation: true,
            ..Default::default()
        };
        let report = fill_form(
            &page,
            "http://form",
            &FieldValueMap::default(),
            &CheckboxMap::default(),
            &artifacts(dir.path(), true),
        )
        .await;
        assert!(!report.success);
        assert!(report.error.unwrap().contains("connection refused"));
    }
}
