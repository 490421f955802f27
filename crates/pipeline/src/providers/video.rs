//! Video provider. Always targets wan21 regardless of the configured
//! image family; it is the only family with a video topology.

use std::sync::Arc;

use async_trait::async_trait;
use fableworks_comfyui::{EngineApi, ExecutionPoll};
use fableworks_core::clock::Clock;
use fableworks_core::config::{FamilyDefaults, ModelFamily};
use fableworks_core::job::{JobKind, JobPayload};
use fableworks_core::policy::PollPolicy;

use super::{poll_once, run_graph, MediaProvider, ProgressSink, ProviderOutput};
use crate::error::ProviderError;
use crate::video::build_video_graph;

pub struct VideoProvider {
    api: Arc<dyn EngineApi>,
    clock: Arc<dyn Clock>,
    defaults: FamilyDefaults,
}

impl VideoProvider {
    pub fn new(api: Arc<dyn EngineApi>, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            clock,
            defaults: FamilyDefaults::for_family(ModelFamily::Wan21),
        }
    }
}

#[async_trait]
impl MediaProvider for VideoProvider {
    fn kind(&self) -> JobKind {
        JobKind::Video
    }

    async fn is_available(&self) -> bool {
        self.api.is_reachable().await
    }

    async fn generate(
        &self,
        payload: &JobPayload,
        progress: &dyn ProgressSink,
    ) -> Result<ProviderOutput, ProviderError> {
        let JobPayload::Video(input) = payload else {
            return Err(ProviderError::WrongKind {
                expected: JobKind::Video,
                got: payload.kind(),
            });
        };

        let graph = build_video_graph(input, &self.defaults)?;
        let policy = PollPolicy::for_kind(JobKind::Video, false);
        run_graph(&*self.api, &*self.clock, &graph, policy, progress).await
    }

    async fn check_status(&self, prompt_id: &str) -> Result<ExecutionPoll, ProviderError> {
        poll_once(&*self.api, prompt_id).await
    }
}

#[cfg(test)]
mod tests {
    use fableworks_core::clock::ManualClock;
    use fableworks_core::job::VideoInput;

    use super::super::test_support::FakeEngine;
    use super::super::NoProgress;
    use super::*;

    #[tokio::test]
    async fn submits_wan_video_graph_and_returns_url() {
        let engine = Arc::new(FakeEngine::completing_after(1));
        let provider = VideoProvider::new(engine.clone(), Arc::new(ManualClock::new()));
        let output = provider
            .generate(
                &JobPayload::Video(VideoInput {
                    prompt: "drifting clouds".into(),
                    negative_prompt: None,
                    width: 512,
                    height: 288,
                    frames: 49,
                    fps: 16,
                    start_image: None,
                    seed: Some(5),
                }),
                &NoProgress,
            )
            .await
            .unwrap();
        assert!(output.output_url.is_some());
        let submitted = engine.submissions();
        assert_eq!(submitted[0]["5"]["class_type"], "WanImageToVideo");
        assert_eq!(submitted[0]["9"]["class_type"], "SaveAnimatedWEBP");
    }
}
