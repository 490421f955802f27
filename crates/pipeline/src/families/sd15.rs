//! SD 1.5 graph builder: single checkpoint loader, euler/normal
//! sampling at 512x512 defaults.

use fableworks_core::config::{FamilyDefaults, ModelFamily};
use fableworks_core::job::ImageInput;

use super::{
    add_prompts, add_reference_latent, add_sampler_and_save, ids, resolve_image, GraphBuilder,
    SamplerSpec,
};
use crate::error::ProviderError;
use crate::graph::{Link, Node, WorkflowGraph};

pub struct Sd15Builder {
    defaults: FamilyDefaults,
}

impl Sd15Builder {
    pub fn new(defaults: FamilyDefaults) -> Self {
        Self { defaults }
    }
}

impl GraphBuilder for Sd15Builder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Sd15
    }

    fn build(&self, input: &ImageInput) -> Result<WorkflowGraph, ProviderError> {
        let resolved = resolve_image(input, &self.defaults)?;
        let checkpoint = self.defaults.checkpoint.clone().ok_or_else(|| {
            ProviderError::InvalidInput("sd15 requires a checkpoint name".into())
        })?;

        let mut graph = WorkflowGraph::new(ids::SAVE);
        let model = graph.insert(ids::LOADER, Node::CheckpointLoader { ckpt_name: checkpoint });
        let clip = Link::new(ids::LOADER, 1);
        let vae = Link::new(ids::LOADER, 2);

        let (positive, negative) =
            add_prompts(&mut graph, clip, &resolved.prompt, &resolved.negative_prompt);

        let latent = match &resolved.reference {
            Some(filename) => add_reference_latent(&mut graph, vae, filename),
            None => graph.insert(
                ids::LATENT,
                Node::EmptyLatentImage {
                    width: resolved.width,
                    height: resolved.height,
                    batch_size: 1,
                },
            ),
        };

        add_sampler_and_save(
            &mut graph,
            SamplerSpec {
                model,
                positive,
                negative,
                latent,
                vae,
                seed: resolved.seed,
                steps: resolved.steps,
                cfg: resolved.guidance,
                sampler_name: self.defaults.sampler,
                scheduler: self.defaults.scheduler,
                denoise: resolved.denoise,
            },
        );
        Ok(graph)
    }
}
