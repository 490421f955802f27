//! Voice (speech synthesis) provider.

use std::sync::Arc;

use async_trait::async_trait;
use fableworks_comfyui::{EngineApi, ExecutionPoll};
use fableworks_core::clock::Clock;
use fableworks_core::job::{JobKind, JobPayload};
use fableworks_core::policy::PollPolicy;

use super::{poll_once, run_graph, MediaProvider, ProgressSink, ProviderOutput};
use crate::audio::build_voice_graph;
use crate::error::ProviderError;

pub struct VoiceProvider {
    api: Arc<dyn EngineApi>,
    clock: Arc<dyn Clock>,
}

impl VoiceProvider {
    pub fn new(api: Arc<dyn EngineApi>, clock: Arc<dyn Clock>) -> Self {
        Self { api, clock }
    }
}

#[async_trait]
impl MediaProvider for VoiceProvider {
    fn kind(&self) -> JobKind {
        JobKind::Voice
    }

    async fn is_available(&self) -> bool {
        self.api.is_reachable().await
    }

    async fn generate(
        &self,
        payload: &JobPayload,
        progress: &dyn ProgressSink,
    ) -> Result<ProviderOutput, ProviderError> {
        let JobPayload::Voice(input) = payload else {
            return Err(ProviderError::WrongKind {
                expected: JobKind::Voice,
                got: payload.kind(),
            });
        };

        let graph = build_voice_graph(input)?;
        let policy = PollPolicy::for_kind(JobKind::Voice, false);
        run_graph(&*self.api, &*self.clock, &graph, policy, progress).await
    }

    async fn check_status(&self, prompt_id: &str) -> Result<ExecutionPoll, ProviderError> {
        poll_once(&*self.api, prompt_id).await
    }
}
