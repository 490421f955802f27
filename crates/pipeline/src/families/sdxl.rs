//! SDXL graph builder. Same single-checkpoint topology as SD 1.5 but
//! tuned for the larger base model: dpmpp_2m/karras at 1024x1024.

use fableworks_core::config::{FamilyDefaults, ModelFamily};
use fableworks_core::job::ImageInput;

use super::{
    add_prompts, add_reference_latent, add_sampler_and_save, ids, resolve_image, GraphBuilder,
    SamplerSpec,
};
use crate::error::ProviderError;
use crate::graph::{Link, Node, WorkflowGraph};

pub struct SdxlBuilder {
    defaults: FamilyDefaults,
}

impl SdxlBuilder {
    pub fn new(defaults: FamilyDefaults) -> Self {
        Self { defaults }
    }
}

impl GraphBuilder for SdxlBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Sdxl
    }

    fn build(&self, input: &ImageInput) -> Result<WorkflowGraph, ProviderError> {
        let resolved = resolve_image(input, &self.defaults)?;
        let checkpoint = self.defaults.checkpoint.clone().ok_or_else(|| {
            ProviderError::InvalidInput("sdxl requires a checkpoint name".into())
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

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn builder() -> SdxlBuilder {
        SdxlBuilder::new(FamilyDefaults::for_family(ModelFamily::Sdxl))
    }

    #[test]
    fn defaults_are_base_model_at_1024() {
        let wire = builder().build(&plain_input("a castle")).unwrap().to_wire();
        assert_eq!(wire["4"]["inputs"]["ckpt_name"], "sd_xl_base_1.0.safetensors");
        assert_eq!(wire["5"]["inputs"]["width"], 1024);
        assert_eq!(wire["5"]["inputs"]["height"], 1024);
        assert_eq!(wire["3"]["inputs"]["sampler_name"], "dpmpp_2m");
        assert_eq!(wire["3"]["inputs"]["scheduler"], "karras");
        assert_eq!(wire["3"]["inputs"]["steps"], 25);
    }

    #[test]
    fn reference_default_denoise_is_milder_than_sd15() {
        let wire = builder()
            .build(&referenced_input("a castle", "ref.png"))
            .unwrap()
            .to_wire();
        assert_eq!(wire["3"]["inputs"]["denoise"], 0.55);
    }

    #[test]
    fn env_overridden_checkpoint_flows_through() {
        let mut defaults = FamilyDefaults::for_family(ModelFamily::Sdxl);
        defaults.checkpoint = Some("juggernaut_xl.safetensors".into());
        let wire = SdxlBuilder::new(defaults)
            .build(&plain_input("a castle"))
            .unwrap()
            .to_wire();
        assert_eq!(wire["4"]["inputs"]["ckpt_name"], "juggernaut_xl.safetensors");
    }
}
