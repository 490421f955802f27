//! Composite provider stub.
//!
//! Scene compositing (concatenating segments, muxing audio) is not
//! wired to a backend yet. The kind still exists so composite jobs
//! route, validate, and report through the same machinery; the stub
//! succeeds without producing an artifact.

use async_trait::async_trait;
use fableworks_core::job::{JobKind, JobPayload};
use serde_json::json;

use super::{MediaProvider, ProgressSink, ProviderOutput};
use crate::error::ProviderError;

#[derive(Default)]
pub struct CompositeProvider;

impl CompositeProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaProvider for CompositeProvider {
    fn kind(&self) -> JobKind {
        JobKind::Composite
    }

    // No backend to probe.
    async fn is_available(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        payload: &JobPayload,
        progress: &dyn ProgressSink,
    ) -> Result<ProviderOutput, ProviderError> {
        let JobPayload::Composite(input) = payload else {
            return Err(ProviderError::WrongKind {
                expected: JobKind::Composite,
                got: payload.kind(),
            });
        };
        if input.segment_urls.is_empty() {
            return Err(ProviderError::InvalidInput(
                "Composite requires at least one segment".into(),
            ));
        }

        tracing::info!(
            segments = input.segment_urls.len(),
            has_audio = input.audio_url.is_some(),
            "Composite requested; compositing backend not yet wired",
        );
        progress.report(100).await;
        Ok(ProviderOutput {
            output_url: None,
            metadata: json!({
                "stub": true,
                "segments": input.segment_urls.len(),
            }),
        })
    }

    // Composites never touch the engine, so there is no handle to
    // check.
    async fn check_status(
        &self,
        _prompt_id: &str,
    ) -> Result<fableworks_comfyui::ExecutionPoll, ProviderError> {
        Err(ProviderError::InvalidInput(
            "Composite jobs have no engine handle to poll".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use fableworks_core::job::CompositeInput;

    use super::super::NoProgress;
    use super::*;

    #[tokio::test]
    async fn stub_succeeds_without_an_artifact() {
        let output = CompositeProvider::new()
            .generate(
                &JobPayload::Composite(CompositeInput {
                    segment_urls: vec!["http://cdn/a.webp".into(), "http://cdn/b.webp".into()],
                    audio_url: None,
                }),
                &NoProgress,
            )
            .await
            .unwrap();
        assert!(output.output_url.is_none());
        assert_eq!(output.metadata["stub"], true);
        assert_eq!(output.metadata["segments"], 2);
    }

    #[tokio::test]
    async fn empty_segment_list_rejected() {
        let result = CompositeProvider::new()
            .generate(
                &JobPayload::Composite(CompositeInput {
                    segment_urls: Vec::new(),
                    audio_url: None,
                }),
                &NoProgress,
            )
            .await;
        assert!(matches!(result, Err(ProviderError::InvalidInput(_))));
    }
}
