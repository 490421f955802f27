//! Provider adapters: the uniform contract the worker routes jobs to.
//!
//! One [`MediaProvider`] per job kind. Each wraps graph construction
//! plus the engine submit/poll drive; the dispatcher only sees the
//! trait. Providers hold no per-job state, so a single instance
//! serves concurrent jobs.

use std::sync::Arc;

use async_trait::async_trait;
use fableworks_comfyui::history::inspect_history;
use fableworks_comfyui::{wait_for_output, EngineApi, ExecutionPoll};
use fableworks_core::clock::Clock;
use fableworks_core::config::EngineSettings;
use fableworks_core::job::{JobKind, JobPayload};
use fableworks_core::policy::PollPolicy;
use serde_json::json;

use crate::error::ProviderError;
use crate::graph::WorkflowGraph;

pub mod composite;
pub mod image;
pub mod music;
pub mod video;
pub mod voice;

pub use composite::CompositeProvider;
pub use image::ImageProvider;
pub use music::MusicProvider;
pub use video::VideoProvider;
pub use voice::VoiceProvider;

/// Where a provider reports coarse progress. The dispatcher plugs in
/// a sink that writes through to the job record; tests use
/// [`NoProgress`].
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8);
}

/// Sink that discards progress reports.
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _percent: u8) {}
}

/// What a successful generation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    /// Retrieval URL of the produced asset. `None` only for stubbed
    /// kinds that produce no artifact yet.
    pub output_url: Option<String>,
    pub metadata: serde_json::Value,
}

/// A generation backend for one job kind.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// The single job kind this provider handles.
    fn kind(&self) -> JobKind;

    /// Whether the backing engine can accept work right now.
    async fn is_available(&self) -> bool;

    /// Run one generation to completion. Cancellation-safe: dropping
    /// the future abandons the engine-side run without corrupting
    /// provider state.
    async fn generate(
        &self,
        payload: &JobPayload,
        progress: &dyn ProgressSink,
    ) -> Result<ProviderOutput, ProviderError>;

    /// One non-blocking status check, for callers that hold a prompt
    /// id and poll externally instead of awaiting [`Self::generate`].
    async fn check_status(&self, prompt_id: &str) -> Result<ExecutionPoll, ProviderError>;
}

/// The full provider set for one configured engine, in routing order.
pub fn default_providers(
    api: Arc<dyn EngineApi>,
    clock: Arc<dyn Clock>,
    settings: &EngineSettings,
) -> Vec<Arc<dyn MediaProvider>> {
    vec![
        Arc::new(ImageProvider::new(
            api.clone(),
            clock.clone(),
            settings.family,
            settings.defaults.clone(),
        )),
        Arc::new(VideoProvider::new(api.clone(), clock.clone())),
        Arc::new(VoiceProvider::new(api.clone(), clock.clone())),
        Arc::new(MusicProvider::new(api, clock)),
        Arc::new(CompositeProvider::new()),
    ]
}

/// Upload reference bytes into the engine's input area, returning the
/// engine-side filename callers embed in a payload.
pub async fn upload_reference(
    api: &dyn EngineApi,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<String, ProviderError> {
    if bytes.is_empty() {
        return Err(ProviderError::InvalidInput(
            "Reference image is empty".into(),
        ));
    }
    Ok(api.upload_image(filename, bytes).await?)
}

/// One history fetch, inspected. Shared `check_status` body for the
/// engine-backed providers.
pub(crate) async fn poll_once(
    api: &dyn EngineApi,
    prompt_id: &str,
) -> Result<ExecutionPoll, ProviderError> {
    let raw = api.history(prompt_id).await?;
    Ok(inspect_history(&raw, prompt_id))
}

/// Submit a graph and poll it to completion. Shared drive for every
/// engine-backed provider.
pub(crate) async fn run_graph(
    api: &dyn EngineApi,
    clock: &dyn Clock,
    graph: &WorkflowGraph,
    policy: PollPolicy,
    progress: &dyn ProgressSink,
) -> Result<ProviderOutput, ProviderError> {
    let prompt_id = api.submit(&graph.to_wire()).await?;
    tracing::debug!(prompt_id, "Workflow submitted");
    progress.report(10).await;

    let output = wait_for_output(api, &prompt_id, policy, clock).await?;
    Ok(ProviderOutput {
        output_url: Some(api.view_url(&output)),
        metadata: json!({
            "prompt_id": prompt_id,
            "filename": output.filename,
        }),
    })
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
