//! Browser session management for form filling.

use super::{fill_form, ArtifactOptions, FillReport, FormDriver, WebDriverClient};
use crate::config::FormFillConfig;
use crate::mapping::{CheckboxMap, FieldValueMap};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Headless form filling: one fresh browser session per request, always
/// closed afterwards, PDF export enabled.
#[derive(Debug, Clone)]
pub struct FormFillAdapter {
    config: FormFillConfig,
}

impl FormFillAdapter {
    pub fn new(config: FormFillConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FormFillConfig {
        &self.config
    }

    pub async fn fill(&self, fields: &FieldValueMap, checkboxes: &CheckboxMap) -> FillReport {
        let client = match WebDriverClient::start(&self.config, true).await {
            Ok(client) => client,
            Err(e) => return FillReport::failed(format!("Form population failed: {e}")),
        };
        let report = self.fill_with(&client, fields, checkboxes).await;
        if let Err(e) = client.close().await {
            warn!("Failed to close browser session: {}", e);
        }
        report
    }

    /// Fill through an already-open driver. The caller closes it.
    pub async fn fill_with(
        &self,
        driver: &dyn FormDriver,
        fields: &FieldValueMap,
        checkboxes: &CheckboxMap,
    ) -> FillReport {
        let artifacts = ArtifactOptions {
            output_dir: self.config.output_dir.clone(),
            generate_pdf: true,
        };
        fill_form(driver, &self.config.form_url, fields, checkboxes, &artifacts).await
    }
}

/// A visible browser kept open across fills for debugging.
///
/// Fills are serialised through an internal lock so two requests never
/// drive the same page at once. No PDF is produced: printing needs a
/// headless browser.
pub struct DebugSession {
    config: FormFillConfig,
    driver: Mutex<Box<dyn FormDriver>>,
}

impl DebugSession {
    /// Open a visible browser session.
    pub async fn start(config: FormFillConfig) -> Result<Self, super::DriverError> {
        let client = WebDriverClient::start(&config, false).await?;
        info!("Debug browser session started; it stays open until stopped");
        Ok(Self::with_driver(config, Box::new(client)))
    }

    /// Wrap an existing driver.
    pub fn with_driver(config: FormFillConfig, driver: Box<dyn FormDriver>) -> Self {
        Self {
            config,
            driver: Mutex::new(driver),
        }
    }

    pub async fn fill(&self, fields: &FieldValueMap, checkboxes: &CheckboxMap) -> FillReport {
        let driver = self.driver.lock().await;
        let artifacts = ArtifactOptions {
            output_dir: self.config.output_dir.clone(),
            generate_pdf: false,
        };
        fill_form(driver.as_ref(), &self.config.form_url, fields, checkboxes, &artifacts).await
    }

    /// Close the browser.
    pub async fn stop(self) {
        let driver = self.driver.into_inner();
        match driver.close().await {
            Ok(()) => info!("Debug browser session stopped"),
            Err(e) => warn!("Failed to close debug browser session: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::{DriverError, ElementHandle};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Recorder {
        printed: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FormDriver for Recorder {
        async fn navigate(&self, _: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn find_all(&self, css: &str) -> Result<Vec<ElementHandle>, DriverError> {
            Ok(vec![ElementHandle(css.to_string())])
        }
        async fn tag_name(&self, _: &ElementHandle) -> Result<String, DriverError> {
            Ok("input".into())
        }
        async fn fill(&self, _: &ElementHandle, _: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn select_option(&self, _: &ElementHandle, _: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn set_checked(&self, _: &ElementHandle, _: bool) -> Result<(), DriverError> {
            Ok(())
        }
        async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
            Ok(vec![0])
        }
        async fn print_pdf(&self) -> Result<Vec<u8>, DriverError> {
            self.printed.store(true, Ordering::SeqCst);
            Ok(vec![0])
        }
        async fn close(&self) -> Result<(), DriverError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn debug_session_skips_pdf_and_closes_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let config = FormFillConfig::new("http://localhost/form")
            .unwrap()
            .with_output_dir(dir.path());
        let printed = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let session = DebugSession::with_driver(
            config,
            Box::new(Recorder {
                printed: printed.clone(),
                closed: closed.clone(),
            }),
        );

        let fields: FieldValueMap = [("city", "Boston")].into_iter().collect();
        let report = session.fill(&fields, &CheckboxMap::default()).await;
        assert!(report.success);
        assert!(report.pdf_path.is_none());
        assert!(!printed.load(Ordering::SeqCst));

        session.stop().await;
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn adapter_exports_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let config = FormFillConfig::new("http://localhost/form")
            .unwrap()
            .with_output_dir(dir.path());
        let printed = Arc::new(AtomicBool::new(false));
        let driver = Recorder {
            printed: printed.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let fields: FieldValueMap = [("city", "Boston")].into_iter().collect();
        let report = FormFillAdapter::new(config)
            .fill_with(&driver, &fields, &CheckboxMap::default())
            .await;
        assert!(report.success);
        assert!(printed.load(Ordering::SeqCst));
        assert!(report.pdf_path.is_some());
    }
}
