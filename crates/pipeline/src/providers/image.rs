//! Image provider: family graph builder plus the engine drive.

use std::sync::Arc;

use async_trait::async_trait;
use fableworks_comfyui::{EngineApi, ExecutionPoll};
use fableworks_core::clock::Clock;
use fableworks_core::config::{FamilyDefaults, ModelFamily};
use fableworks_core::job::{JobKind, JobPayload};
use fableworks_core::policy::PollPolicy;

use super::{poll_once, run_graph, MediaProvider, ProgressSink, ProviderOutput};
use crate::error::ProviderError;
use crate::families::{builder_for, GraphBuilder};

pub struct ImageProvider {
    api: Arc<dyn EngineApi>,
    clock: Arc<dyn Clock>,
    builder: Box<dyn GraphBuilder>,
}

impl ImageProvider {
    pub fn new(
        api: Arc<dyn EngineApi>,
        clock: Arc<dyn Clock>,
        family: ModelFamily,
        defaults: FamilyDefaults,
    ) -> Self {
        Self {
            api,
            clock,
            builder: builder_for(family, defaults),
        }
    }

    /// The family this provider's graphs target.
    pub fn family(&self) -> ModelFamily {
        self.builder.family()
    }
}

#[async_trait]
impl MediaProvider for ImageProvider {
    fn kind(&self) -> JobKind {
        JobKind::Image
    }

    async fn is_available(&self) -> bool {
        self.api.is_reachable().await
    }

    async fn generate(
        &self,
        payload: &JobPayload,
        progress: &dyn ProgressSink,
    ) -> Result<ProviderOutput, ProviderError> {
        let JobPayload::Image(input) = payload else {
            return Err(ProviderError::WrongKind {
                expected: JobKind::Image,
                got: payload.kind(),
            });
        };

        let graph = self.builder.build(input)?;
        // Reference-conditioned runs get the longer img2img deadline.
        let policy = PollPolicy::for_kind(JobKind::Image, input.reference_image.is_some());
        run_graph(&*self.api, &*self.clock, &graph, policy, progress).await
    }

    async fn check_status(&self, prompt_id: &str) -> Result<ExecutionPoll, ProviderError> {
        poll_once(&*self.api, prompt_id).await
    }
}
