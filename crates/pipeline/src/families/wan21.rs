//! Wan 2.1 still-image graph builder. The heaviest family: split
//! loaders like flux, plus a hard pixel budget so render times stay
//! bounded on the shared engine. Requested dimensions are scaled to
//! the budget before the latent is sized.

use fableworks_core::config::{FamilyDefaults, ModelFamily};
use fableworks_core::job::ImageInput;
use fableworks_core::resolution::{fit_pixel_budget, PIXEL_BUDGET};

use super::{
    add_prompts, add_reference_latent, add_sampler_and_save, ids, resolve_image, GraphBuilder,
    SamplerSpec,
};
use crate::error::ProviderError;
use crate::graph::{Node, WorkflowGraph};

pub struct Wan21Builder {
    defaults: FamilyDefaults,
}

impl Wan21Builder {
    pub fn new(defaults: FamilyDefaults) -> Self {
        Self { defaults }
    }

    fn asset(&self, value: &Option<String>, what: &str) -> Result<String, ProviderError> {
        value
            .clone()
            .ok_or_else(|| ProviderError::InvalidInput(format!("wan21 requires a {what} name")))
    }
}

impl GraphBuilder for Wan21Builder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Wan21
    }

    fn build(&self, input: &ImageInput) -> Result<WorkflowGraph, ProviderError> {
        let resolved = resolve_image(input, &self.defaults)?;
        let unet = self.asset(&self.defaults.unet, "unet")?;
        let clip_name = self.asset(&self.defaults.clip, "clip")?;
        let vae_name = self.asset(&self.defaults.vae, "vae")?;

        let (width, height) = fit_pixel_budget(resolved.width, resolved.height, PIXEL_BUDGET);

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
            Node::ClipLoader {
                clip_name,
                clip_type: "wan",
            },
        );
        let vae = graph.insert(ids::VAE_LOADER, Node::VaeLoader { vae_name });

        let (positive, negative) =
            add_prompts(&mut graph, clip, &resolved.prompt, &resolved.negative_prompt);

        let latent = match &resolved.reference {
            Some(filename) => add_reference_latent(&mut graph, vae, filename),
            None => graph.insert(
                ids::LATENT,
                Node::EmptyLatentImage {
                    width,
                    height,
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

    fn builder() -> Wan21Builder {
        Wan21Builder::new(FamilyDefaults::for_family(ModelFamily::Wan21))
    }

    #[test]
    fn split_loaders_with_wan_clip_type() {
        let wire = builder().build(&plain_input("a harbor")).unwrap().to_wire();
        assert_eq!(wire["4"]["class_type"], "UNETLoader");
        assert_eq!(wire["11"]["class_type"], "CLIPLoader");
        assert_eq!(wire["11"]["inputs"]["type"], "wan");
        assert_eq!(wire["12"]["class_type"], "VAELoader");
        assert_eq!(wire["3"]["inputs"]["sampler_name"], "uni_pc");
    }

    #[test]
    fn default_dimensions_fit_within_budget_unchanged() {
        let wire = builder().build(&plain_input("a harbor")).unwrap().to_wire();
        // 576 * 576 = 331,776 < 350,000 and already a multiple of 8
        assert_eq!(wire["5"]["inputs"]["width"], 576);
        assert_eq!(wire["5"]["inputs"]["height"], 576);
    }

    #[test]
    fn oversized_request_is_scaled_to_budget() {
        let input = ImageInput {
            width: Some(1920),
            height: Some(1080),
            ..plain_input("a harbor")
        };
        let wire = builder().build(&input).unwrap().to_wire();
        let width = wire["5"]["inputs"]["width"].as_u64().unwrap() as u32;
        let height = wire["5"]["inputs"]["height"].as_u64().unwrap() as u32;
        assert!(u64::from(width) * u64::from(height) <= PIXEL_BUDGET);
        assert_eq!(width % 8, 0);
        assert_eq!(height % 8, 0);
        assert!(width < 1920 && height < 1080);
        // aspect stays close to 16:9
        let aspect = width as f64 / height as f64;
        assert!((aspect - 16.0 / 9.0).abs() < 0.1, "aspect {aspect}");
    }
}
