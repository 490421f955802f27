//! Flux graph builder: split unet/dual-clip/vae loaders, a dedicated
//! guidance node on the positive conditioning, and an SD3-style
//! starting latent. Classifier-free guidance is pinned to 1.0 at the
//! sampler; strength goes through FluxGuidance instead.

use fableworks_core::config::{FamilyDefaults, ModelFamily};
use fableworks_core::job::ImageInput;

use super::{
    add_reference_latent, add_sampler_and_save, ids, resolve_image, GraphBuilder, SamplerSpec,
};
use crate::error::ProviderError;
use crate::graph::{Node, WorkflowGraph};

pub struct FluxBuilder {
    defaults: FamilyDefaults,
}

impl FluxBuilder {
    pub fn new(defaults: FamilyDefaults) -> Self {
        Self { defaults }
    }

    fn asset(&self, value: &Option<String>, what: &str) -> Result<String, ProviderError> {
        value
            .clone()
            .ok_or_else(|| ProviderError::InvalidInput(format!("flux requires a {what} name")))
    }
}

impl GraphBuilder for FluxBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Flux
    }

    fn build(&self, input: &ImageInput) -> Result<WorkflowGraph, ProviderError> {
        let resolved = resolve_image(input, &self.defaults)?;
        let unet = self.asset(&self.defaults.unet, "unet")?;
        let clip_primary = self.asset(&self.defaults.clip, "clip")?;
        let clip_secondary = self.asset(&self.defaults.clip_secondary, "secondary clip")?;
        let vae_name = self.asset(&self.defaults.vae, "vae")?;

        let mut graph = WorkflowGraph::new(ids::SAVE);
        let model = graph.insert(
            ids::LOADER,
            Node::UnetLoader {
                unet_name: unet,
                weight_dtype: "default",
            },
        );
        let clip = graph.insert(
            ids::CLIP_LOADER,
            Node::DualClipLoader {
                clip_name1: clip_primary,
                clip_name2: clip_secondary,
                clip_type: "flux",
            },
        );
        let vae = graph.insert(ids::VAE_LOADER, Node::VaeLoader { vae_name });

        let encoded = graph.insert(
            ids::POSITIVE,
            Node::ClipTextEncode {
                text: resolved.prompt.clone(),
                clip,
            },
        );
        let positive = graph.insert(
            ids::GUIDANCE,
            Node::FluxGuidance {
                conditioning: encoded,
                guidance: resolved.guidance,
            },
        );
        let negative = graph.insert(
            ids::NEGATIVE,
            Node::ClipTextEncode {
                text: resolved.negative_prompt.clone(),
                clip,
            },
        );

        let latent = match &resolved.reference {
            Some(filename) => add_reference_latent(&mut graph, vae, filename),
            None => graph.insert(
                ids::LATENT,
                Node::EmptySd3LatentImage {
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
                cfg: 1.0,
                sampler_name: self.defaults.sampler,
                scheduler: self.defaults.scheduler,
                denoise: resolved.denoise,
            },
        );
        Ok(graph)
    }
}
