//! Upload side-channel for multi-page documents: send the raw file to the
//! remote model's file store, generate against the stored handle, delete it.
//!
//! [`generate_from_upload`] owns the lifecycle. Once the store has accepted
//! the bytes, the artifact is deleted whatever happens next: failed
//! processing, failed generation, or the caller dropping the future. A
//! failed delete is logged, never raised, because the generation result is
//! what the caller asked for.
//!
//! [`GeminiFileApi`] implements [`RemoteFileApi`] against the Gemini REST
//! API (`v1beta`) with `reqwest`: resumable upload, `generateContent` with a
//! `file_data` part, and `DELETE` on the file name.

use crate::error::RemoteError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Handle to an uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, e.g. `files/abc123`. Used for deletion.
    pub name: String,
    /// URI passed to generation calls.
    pub uri: String,
    pub mime_type: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[async_trait]
pub trait RemoteFileApi: Send + Sync {
    /// Store `bytes`. Returns as soon as the store has created the file,
    /// which may still be processing.
    async fn upload(
        &self,
        bytes: &[u8],
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, RemoteError>;

    /// Wait until `file` can be used for generation.
    async fn wait_until_active(&self, file: RemoteFile) -> Result<RemoteFile, RemoteError> {
        Ok(file)
    }

    async fn generate_with_file(&self, prompt: &str, file: &RemoteFile)
        -> Result<String, RemoteError>;

    /// Delete an uploaded artifact. Deleting an already deleted file is
    /// not an error.
    async fn delete(&self, file: &RemoteFile) -> Result<(), RemoteError>;
}

/// Upload `bytes`, run `prompt` against the upload, and always delete it.
pub async fn generate_from_upload(
    api: Arc<dyn RemoteFileApi>,
    bytes: &[u8],
    mime_type: &str,
    display_name: &str,
    prompt: &str,
) -> Result<String, RemoteError> {
    let file = api.upload(bytes, mime_type, display_name).await?;
    info!("File uploaded to remote store: {}", file.uri);

    let guard = UploadGuard::new(Arc::clone(&api), file.clone());
    let result = match api.wait_until_active(file).await {
        Ok(active) => api.generate_with_file(prompt, &active).await,
        Err(e) => Err(e),
    };
    guard.release().await;

    result
}

/// Deletes the upload it holds. Dropped without [`UploadGuard::release`]
/// (the owning future was cancelled), it hands the delete to the runtime.
struct UploadGuard {
    api: Arc<dyn RemoteFileApi>,
    file: Option<RemoteFile>,
}

impl UploadGuard {
    fn new(api: Arc<dyn RemoteFileApi>, file: RemoteFile) -> Self {
        Self {
            api,
            file: Some(file),
        }
    }

    async fn release(mut self) {
        if let Some(file) = self.file.take() {
            delete_upload(self.api.as_ref(), &file).await;
        }
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Remote transcription of {} was cancelled; deleting upload", file.name);
                let api = Arc::clone(&self.api);
                handle.spawn(async move { delete_upload(api.as_ref(), &file).await });
            }
            Err(_) => warn!("No runtime left to delete {} from remote store", file.name),
        }
    }
}

async fn delete_upload(api: &dyn RemoteFileApi, file: &RemoteFile) {
    match api.delete(file).await {
        Ok(()) => info!("Cleaned up {} from remote store", file.name),
        Err(e) => warn!("Failed to delete {} from remote store: {}", file.name, e),
    }
}

// ── Gemini ───────────────────────────────────────────────────────────────

/// Gemini File API + `generateContent` client.
#[derive(Clone)]
pub struct GeminiFileApi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: usize,
    timeout_secs: u64,
}

impl std::fmt::Debug for GeminiFileApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiFileApi")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Polls while an uploaded PDF is still being processed.
const ACTIVE_POLL_ATTEMPTS: u32 = 10;
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);

impl GeminiFileApi {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RemoteError::Service(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.into(),
            temperature: 0.1,
            max_output_tokens: 4096,
            timeout_secs,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_output_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn transport_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            RemoteError::Service(format!("request: {e}"))
        }
    }

    async fn read_json(&self, response: reqwest::Response) -> Result<Value, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| RemoteError::Response(format!("body: {e}")))
    }
}

#[async_trait]
impl RemoteFileApi for GeminiFileApi {
    async fn upload(
        &self,
        bytes: &[u8],
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, RemoteError> {
        // Step 1: open a resumable upload session.
        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = start.status();
        if !status.is_success() {
            let body = start.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Response("missing x-goog-upload-url header".into()))?;

        // Step 2: send the bytes and finalise.
        debug!("Uploading {} bytes ({})", bytes.len(), mime_type);
        let response = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        parse_file_response(self.read_json(response).await?)
    }

    async fn wait_until_active(&self, mut file: RemoteFile) -> Result<RemoteFile, RemoteError> {
        for _ in 0..ACTIVE_POLL_ATTEMPTS {
            match file.state.as_deref() {
                Some("PROCESSING") => {}
                Some("FAILED") => {
                    return Err(RemoteError::Service(format!(
                        "remote processing of {} failed",
                        file.name
                    )))
                }
                _ => return Ok(file),
            }
            debug!("{} still processing, polling", file.name);
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;

            let url = format!("{}/v1beta/{}", self.base_url, file.name);
            let response = self
                .client
                .get(&url)
                .header("x-goog-api-key", &self.api_key)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;
            let value = self.read_json(response).await?;
            file = serde_json::from_value(value)
                .map_err(|e| RemoteError::Response(format!("file metadata: {e}")))?;
        }
        Err(RemoteError::Timeout {
            secs: ACTIVE_POLL_INTERVAL.as_secs() * ACTIVE_POLL_ATTEMPTS as u64,
        })
    }

    async fn generate_with_file(
        &self,
        prompt: &str,
        file: &RemoteFile,
    ) -> Result<String, RemoteError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "file_data": { "mime_type": file.mime_type, "file_uri": file.uri } }
                ]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens
            }
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        parse_generate_response(&self.read_json(response).await?)
    }

    async fn delete(&self, file: &RemoteFile) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(format!("{}/v1beta/{}", self.base_url, file.name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(RemoteError::Http {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

/// The upload-finalise answer wraps the file metadata in `{"file": …}`.
fn parse_file_response(value: Value) -> Result<RemoteFile, RemoteError> {
    let file = value
        .get("file")
        .cloned()
        .ok_or_else(|| RemoteError::Response("upload response has no 'file' member".into()))?;
    serde_json::from_value(file).map_err(|e| RemoteError::Response(format!("file metadata: {e}")))
}

/// Concatenate the text parts of the first candidate.
fn parse_generate_response(value: &Value) -> Result<String, RemoteError> {
    if let Some(reason) = value
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(RemoteError::Service(format!("prompt blocked: {reason}")));
    }

    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| RemoteError::Response("no candidate content in response".into()))?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        processing_fails: bool,
        fail_generate: bool,
        hang_generate: bool,
        fail_delete: bool,
        log: Mutex<Vec<String>>,
        deleted: tokio::sync::Notify,
    }

    impl RecordingApi {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteFileApi for RecordingApi {
        async fn upload(&self, _b: &[u8], mime: &str, name: &str) -> Result<RemoteFile, RemoteError> {
            self.log.lock().unwrap().push(format!("upload {name}"));
            Ok(RemoteFile {
                name: "files/abc".into(),
                uri: "https://files/abc".into(),
                mime_type: mime.into(),
                state: Some("PROCESSING".into()),
            })
        }
        async fn wait_until_active(&self, mut f: RemoteFile) -> Result<RemoteFile, RemoteError> {
            if self.processing_fails {
                return Err(RemoteError::Service(format!("remote processing of {} failed", f.name)));
            }
            f.state = Some("ACTIVE".into());
            Ok(f)
        }
        async fn generate_with_file(&self, _p: &str, f: &RemoteFile) -> Result<String, RemoteError> {
            self.log.lock().unwrap().push(format!("generate {}", f.name));
            if self.hang_generate {
                std::future::pending::<()>().await;
            }
            if self.fail_generate {
                Err(RemoteError::Service("boom".into()))
            } else {
                Ok("P<USADOE".into())
            }
        }
        async fn delete(&self, f: &RemoteFile) -> Result<(), RemoteError> {
            self.log.lock().unwrap().push(format!("delete {}", f.name));
            self.deleted.notify_one();
            if self.fail_delete {
                Err(RemoteError::Http { status: 500, body: "x".into() })
            } else {
                Ok(())
            }
        }
    }

    async fn run(api: &Arc<RecordingApi>) -> Result<String, RemoteError> {
        let api: Arc<dyn RemoteFileApi> = api.clone();
        generate_from_upload(api, b"%PDF", "application/pdf", "p.pdf", "read").await
    }

    #[tokio::test]
    async fn upload_is_deleted_after_success() {
        let api = Arc::new(RecordingApi::default());
        assert_eq!(run(&api).await.unwrap(), "P<USADOE");
        assert_eq!(
            api.log(),
            vec!["upload p.pdf", "generate files/abc", "delete files/abc"]
        );
    }

    #[tokio::test]
    async fn upload_is_deleted_after_failure() {
        let api = Arc::new(RecordingApi {
            fail_generate: true,
            ..Default::default()
        });
        let err = run(&api).await.unwrap_err();
        assert!(matches!(err, RemoteError::Service(_)));
        assert_eq!(api.log().last().unwrap(), "delete files/abc");
    }

    #[tokio::test]
    async fn upload_is_deleted_when_remote_processing_fails() {
        let api = Arc::new(RecordingApi {
            processing_fails: true,
            ..Default::default()
        });
        let err = run(&api).await.unwrap_err();
        assert!(err.to_string().contains("files/abc"), "{err}");
        assert_eq!(api.log(), vec!["upload p.pdf", "delete files/abc"]);
    }

    #[tokio::test]
    async fn upload_is_deleted_when_the_caller_gives_up() {
        let api = Arc::new(RecordingApi {
            hang_generate: true,
            ..Default::default()
        });
        let sibling = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<(), _>(RemoteError::Service("other document failed".into()))
        };
        let joined = tokio::try_join!(run(&api), sibling);
        assert!(joined.is_err());

        tokio::time::timeout(Duration::from_secs(2), api.deleted.notified())
            .await
            .expect("upload was not deleted after cancellation");
        assert_eq!(
            api.log().iter().filter(|l| l.starts_with("delete")).count(),
            1
        );
    }

    #[tokio::test]
    async fn failed_delete_does_not_mask_result() {
        let api = Arc::new(RecordingApi {
            fail_delete: true,
            ..Default::default()
        });
        assert_eq!(run(&api).await.unwrap(), "P<USADOE");
    }

    #[test]
    fn parses_file_metadata() {
        let value = json!({"file": {
            "name": "files/xyz",
            "uri": "https://generativelanguage.googleapis.com/v1beta/files/xyz",
            "mimeType": "application/pdf",
            "state": "PROCESSING"
        }});
        let file = parse_file_response(value).unwrap();
        assert_eq!(file.name, "files/xyz");
        assert_eq!(file.mime_type, "application/pdf");
        assert_eq!(file.state.as_deref(), Some("PROCESSING"));
        assert!(parse_file_response(json!({})).is_err());
    }

    #[test]
    fn joins_candidate_text_parts() {
        let value = json!({"candidates": [{"content": {"parts": [
            {"text": "PASSPORT\n"}, {"text": "DOE"}
        ]}}]});
        assert_eq!(parse_generate_response(&value).unwrap(), "PASSPORT\nDOE");
    }

    #[test]
    fn blocked_prompt_is_a_service_error() {
        let value = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert!(matches!(
            parse_generate_response(&value),
            Err(RemoteError::Service(_))
        ));
        assert!(matches!(
            parse_generate_response(&json!({"candidates": []})),
            Err(RemoteError::Response(_))
        ));
    }
}
