//! Minimal W3C WebDriver client over `reqwest`.
//!
//! Speaks only the endpoints form filling needs: session lifecycle,
//! navigation, element lookup by CSS, value entry, option selection,
//! checkbox state, screenshots and printing. Works against chromedriver
//! and geckodriver.

use super::{DriverError, ElementHandle, FormDriver};
use crate::config::{Browser, FormFillConfig};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Key under which W3C drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// One live WebDriver session.
pub struct WebDriverClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl fmt::Debug for WebDriverClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDriverClient")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// `alwaysMatch` capabilities for a browser.
pub fn capabilities(browser: Browser, headless: bool) -> Value {
    match browser {
        Browser::Chrome => {
            let mut args = vec!["--window-size=1280,2000", "--disable-gpu", "--no-sandbox"];
            if headless {
                args.push("--headless=new");
            }
            json!({ "browserName": "chrome", "goog:chromeOptions": { "args": args } })
        }
        Browser::Firefox => {
            let args: Vec<&str> = if headless { vec!["-headless"] } else { vec![] };
            json!({ "browserName": "firefox", "moz:firefoxOptions": { "args": args } })
        }
    }
}

/// CSS selector for an `<option>` with the given value attribute.
pub fn option_selector(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("option[value=\"{escaped}\"]")
}

impl WebDriverClient {
    /// Open a new browser session.
    pub async fn start(config: &FormFillConfig, headless: bool) -> Result<Self, DriverError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.command_timeout_secs.max(1)))
            .build()
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();

        let body = json!({
            "capabilities": { "alwaysMatch": capabilities(config.browser, headless) }
        });
        let value = send(&http, Method::POST, &format!("{base_url}/session"), Some(body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol("new session response has no sessionId".into()))?
            .to_string();

        info!(
            "Started {:?} session {} ({})",
            config.browser,
            session_id,
            if headless { "headless" } else { "visible" }
        );
        Ok(Self {
            http,
            base_url,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        send(&self.http, method, &url, body).await
    }

    async fn elements_from(&self, path: &str, css: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let value = self
            .command(
                Method::POST,
                path,
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;
        parse_elements(&value)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.command(Method::POST, &format!("/element/{}/click", element.0), Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self
            .command(Method::GET, &format!("/element/{}/text", element.0), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl FormDriver for WebDriverClient {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn find_all(&self, css: &str) -> Result<Vec<ElementHandle>, DriverError> {
        self.elements_from("/elements", css).await
    }

    async fn tag_name(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self
            .command(Method::GET, &format!("/element/{}/name", element.0), None)
            .await?;
        value
            .as_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| DriverError::Protocol("tag name is not a string".into()))
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        self.command(Method::POST, &format!("/element/{}/clear", element.0), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{}/value", element.0),
            Some(json!({ "text": value })),
        )
        .await
        .map(|_| ())
    }

    async fn select_option(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        let scope = format!("/element/{}/elements", element.0);
        if let Some(option) = self.elements_from(&scope, &option_selector(value)).await?.first() {
            return self.click(option).await;
        }
        // No value match: fall back to the visible label.
        for option in self.elements_from(&scope, "option").await? {
            if self.text(&option).await?.trim() == value.trim() {
                return self.click(&option).await;
            }
        }
        Err(DriverError::NoSuchOption(value.to_string()))
    }

    async fn set_checked(&self, element: &ElementHandle, checked: bool) -> Result<(), DriverError> {
        let selected = self
            .command(Method::GET, &format!("/element/{}/selected", element.0), None)
            .await?
            .as_bool()
            .unwrap_or(false);
        if selected != checked {
            self.click(element).await?;
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        decode_base64(&value)
    }

    async fn print_pdf(&self) -> Result<Vec<u8>, DriverError> {
        let value = self
            .command(Method::POST, "/print", Some(json!({ "background": true })))
            .await?;
        decode_base64(&value)
    }

    async fn close(&self) -> Result<(), DriverError> {
        debug!("Closing session {}", self.session_id);
        self.command(Method::DELETE, "", None).await.map(|_| ())
    }
}

async fn send(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .map_err(|e| DriverError::Transport(e.to_string()))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| DriverError::Transport(e.to_string()))?;
    parse_response(status, &text)
}

/// Unwrap the `value` member of a WebDriver response, mapping error payloads.
pub fn parse_response(status: StatusCode, body: &str) -> Result<Value, DriverError> {
    let parsed: Value = serde_json::from_str(body).map_err(|e| {
        DriverError::Protocol(format!("HTTP {}: invalid JSON ({e})", status.as_u16()))
    })?;
    let value = parsed.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let error = field("error");
    Err(DriverError::Command {
        error: if error.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            error
        },
        message: field("message"),
    })
}

fn parse_elements(value: &Value) -> Result<Vec<ElementHandle>, DriverError> {
    let list = value
        .as_array()
        .ok_or_else(|| DriverError::Protocol("element list is not an array".into()))?;
    list.iter()
        .map(|el| {
            el.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementHandle(id.to_string()))
                .ok_or_else(|| DriverError::Protocol("element reference without id".into()))
        })
        .collect()
}

fn decode_base64(value: &Value) -> Result<Vec<u8>, DriverError> {
    let data = value
        .as_str()
        .ok_or_else(|| DriverError::Protocol("expected base64 string".into()))?;
    STANDARD
        .decode(data)
        .map_err(|e| DriverError::Protocol(format!("invalid base64: {e}")))
}
