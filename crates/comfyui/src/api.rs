//! HTTP client for the render engine's REST endpoints.
//!
//! [`EngineApi`] is the seam the provider adapters and the worker's
//! liveness gate depend on; [`ComfyUiApi`] is the [`reqwest`]
//! implementation. The client is stateless between calls — everything
//! needed to resume polling (prompt id, deadline) is held by the
//! caller.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::EngineError;
use crate::history::OutputRef;

/// Timeout for the liveness probe. Deliberately short: an engine that
/// cannot answer within this is treated as down, not slow.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Render-engine operations used by the pipeline.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Lightweight liveness probe. Never errors — an unreachable
    /// engine is simply `false`.
    async fn is_reachable(&self) -> bool;

    /// Submit a workflow graph for execution. One HTTP call, no
    /// internal retry; retry is the job queue's responsibility.
    async fn submit(&self, graph: &serde_json::Value) -> Result<String, EngineError>;

    /// Fetch the raw execution history for a prompt.
    async fn history(&self, prompt_id: &str) -> Result<serde_json::Value, EngineError>;

    /// Upload a reference image into the engine's local input area.
    /// Returns the engine-side filename to encode into a load node.
    async fn upload_image(&self, filename: &str, bytes: Vec<u8>) -> Result<String, EngineError>;

    /// Construct the retrieval URL for a produced output.
    fn view_url(&self, output: &OutputRef) -> String;
}

/// Response returned by the engine's `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    prompt_id: String,
}

/// Response returned by the engine's `/upload/image` endpoint.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    name: String,
}

/// HTTP client for a single render-engine instance.
pub struct ComfyUiApi {
    client: reqwest::Client,
    base_url: String,
}

impl ComfyUiApi {
    /// Create a new API client.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (connection pooling across adapters).
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Base HTTP URL of the engine.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ensure the response has a success status code, otherwise
    /// capture the status and body verbatim.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl EngineApi for ComfyUiApi {
    async fn is_reachable(&self) -> bool {
        let probe = self
            .client
            .get(format!("{}/system_stats", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match probe {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Engine liveness probe failed");
                false
            }
        }
    }

    async fn submit(&self, graph: &serde_json::Value) -> Result<String, EngineError> {
        let body = serde_json::json!({ "prompt": graph });

        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;

        let response = Self::ensure_success(response).await?;
        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Unreachable(format!("Invalid submit response: {e}")))?;

        tracing::debug!(prompt_id = %submitted.prompt_id, "Workflow submitted to engine");
        Ok(submitted.prompt_id)
    }

    async fn history(&self, prompt_id: &str) -> Result<serde_json::Value, EngineError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.base_url, prompt_id))
            .send()
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;

        let response = Self::ensure_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| EngineError::Unreachable(format!("Invalid history response: {e}")))
    }

    async fn upload_image(&self, filename: &str, bytes: Vec<u8>) -> Result<String, EngineError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;

        let response = Self::ensure_success(response).await?;
        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Unreachable(format!("Invalid upload response: {e}")))?;

        tracing::debug!(name = %uploaded.name, "Reference image uploaded to engine");
        Ok(uploaded.name)
    }

    fn view_url(&self, output: &OutputRef) -> String {
        match reqwest::Url::parse_with_params(
            &format!("{}/view", self.base_url),
            &[
                ("filename", output.filename.as_str()),
                ("subfolder", output.subfolder.as_str()),
                ("type", output.kind.as_str()),
            ],
        ) {
            Ok(url) => url.to_string(),
            // Unparseable base URLs only happen with broken config;
            // fall back to the unencoded form rather than panic.
            Err(_) => format!(
                "{}/view?filename={}&subfolder={}&type={}",
                self.base_url, output.filename, output.subfolder, output.kind
            ),
        }
    }
}
