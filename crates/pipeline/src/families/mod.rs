//! Per-family graph builder strategies.
//!
//! One [`GraphBuilder`] implementation per image model family,
//! selected once at adapter construction from process configuration.
//! A reference image in the request always selects the
//! reference-conditioned (img2img) variant of whichever family is
//! configured; the families never mix each other's defaults.

use fableworks_core::config::{FamilyDefaults, ModelFamily};
use fableworks_core::job::ImageInput;
use fableworks_core::resolution::validate_dimensions;

use crate::error::ProviderError;
use crate::graph::{Link, Node, WorkflowGraph};

pub mod flux;
pub mod sd15;
pub mod sdxl;
pub mod wan21;

pub use flux::FluxBuilder;
pub use sd15::Sd15Builder;
pub use sdxl::SdxlBuilder;
pub use wan21::Wan21Builder;

/// Filename prefix stamped on every saved output.
pub(crate) const OUTPUT_PREFIX: &str = "fableworks";

/// Node id conventions shared by the family builders. The save node
/// always sits at a terminal id the engine client recognizes.
pub(crate) mod ids {
    use crate::graph::NodeId;

    pub const SAMPLER: NodeId = NodeId(3);
    pub const LOADER: NodeId = NodeId(4);
    pub const LATENT: NodeId = NodeId(5);
    pub const POSITIVE: NodeId = NodeId(6);
    pub const NEGATIVE: NodeId = NodeId(7);
    pub const DECODE: NodeId = NodeId(8);
    pub const SAVE: NodeId = NodeId(9);
    pub const REFERENCE: NodeId = NodeId(10);
    pub const CLIP_LOADER: NodeId = NodeId(11);
    pub const VAE_LOADER: NodeId = NodeId(12);
    pub const REFERENCE_ENCODE: NodeId = NodeId(13);
    pub const GUIDANCE: NodeId = NodeId(14);
}

/// Pure mapping from an image request to a workflow graph.
pub trait GraphBuilder: Send + Sync {
    fn family(&self) -> ModelFamily;
    fn build(&self, input: &ImageInput) -> Result<WorkflowGraph, ProviderError>;
}

/// Construct the builder for the configured family.
pub fn builder_for(family: ModelFamily, defaults: FamilyDefaults) -> Box<dyn GraphBuilder> {
    match family {
        ModelFamily::Sd15 => Box::new(Sd15Builder::new(defaults)),
        ModelFamily::Sdxl => Box::new(SdxlBuilder::new(defaults)),
        ModelFamily::Flux => Box::new(FluxBuilder::new(defaults)),
        ModelFamily::Wan21 => Box::new(Wan21Builder::new(defaults)),
    }
}

// ---------------------------------------------------------------------------
// Request resolution
// ---------------------------------------------------------------------------

/// An image request after caller overrides have been applied on top
/// of the family defaults. Overrides always win; defaults only fill
/// gaps.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedImage {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance: f32,
    pub seed: u64,
    /// Engine-local filename of the uploaded reference, when present.
    pub reference: Option<String>,
    /// 1.0 without a reference; caller-tunable in (0,1) with one.
    pub denoise: f32,
}

pub(crate) fn resolve_image(
    input: &ImageInput,
    defaults: &FamilyDefaults,
) -> Result<ResolvedImage, ProviderError> {
    if input.prompt.trim().is_empty() {
        return Err(ProviderError::InvalidInput(
            "Prompt must not be empty".into(),
        ));
    }

    let width = input.width.unwrap_or(defaults.width);
    let height = input.height.unwrap_or(defaults.height);
    validate_dimensions(width, height)
        .map_err(|e| ProviderError::InvalidInput(e.to_string()))?;

    let denoise = match &input.reference_image {
        Some(_) => {
            let denoise = input.denoise.unwrap_or(defaults.reference_denoise);
            if !(denoise > 0.0 && denoise < 1.0) {
                return Err(ProviderError::InvalidInput(format!(
                    "Denoise must be in (0, 1) for reference-conditioned generation (got {denoise})"
                )));
            }
            denoise
        }
        // Full generation from noise; a stray denoise override is
        // meaningless without a reference and is ignored.
        None => 1.0,
    };

    Ok(ResolvedImage {
        prompt: input.prompt.clone(),
        negative_prompt: input
            .negative_prompt
            .clone()
            .unwrap_or_else(|| defaults.negative_prompt.to_string()),
        width,
        height,
        steps: input.steps.unwrap_or(defaults.steps),
        guidance: input.guidance.unwrap_or(defaults.guidance),
        seed: input.seed.unwrap_or_else(rand::random),
        reference: input.reference_image.clone(),
        denoise,
    })
}

// ---------------------------------------------------------------------------
// Shared chain construction
// ---------------------------------------------------------------------------

/// Add positive and negative prompt encodings against `clip`.
pub(crate) fn add_prompts(
    graph: &mut WorkflowGraph,
    clip: Link,
    positive_text: &str,
    negative_text: &str,
) -> (Link, Link) {
    let positive = graph.insert(
        ids::POSITIVE,
        Node::ClipTextEncode {
            text: positive_text.to_string(),
            clip,
        },
    );
    let negative = graph.insert(
        ids::NEGATIVE,
        Node::ClipTextEncode {
            text: negative_text.to_string(),
            clip,
        },
    );
    (positive, negative)
}

/// Load the uploaded reference and encode it to latent space.
pub(crate) fn add_reference_latent(
    graph: &mut WorkflowGraph,
    vae: Link,
    filename: &str,
) -> Link {
    let pixels = graph.insert(
        ids::REFERENCE,
        Node::LoadImage {
            image: filename.to_string(),
        },
    );
    graph.insert(ids::REFERENCE_ENCODE, Node::VaeEncode { pixels, vae })
}

/// Everything the sampler tail needs.
pub(crate) struct SamplerSpec {
    pub model: Link,
    pub positive: Link,
    pub negative: Link,
    pub latent: Link,
    pub vae: Link,
    pub seed: u64,
    pub steps: u32,
    pub cfg: f32,
    pub sampler_name: &'static str,
    pub scheduler: &'static str,
    pub denoise: f32,
}

/// Add the sampler, decoder, and terminal save node.
pub(crate) fn add_sampler_and_save(graph: &mut WorkflowGraph, spec: SamplerSpec) {
    let sampled = graph.insert(
        ids::SAMPLER,
        Node::KSampler {
            model: spec.model,
            seed: spec.seed,
            steps: spec.steps,
            cfg: spec.cfg,
            sampler_name: spec.sampler_name,
            scheduler: spec.scheduler,
            positive: spec.positive,
            negative: spec.negative,
            latent_image: spec.latent,
            denoise: spec.denoise,
        },
    );
    let decoded = graph.insert(
        ids::DECODE,
        Node::VaeDecode {
            samples: sampled,
            vae: spec.vae,
        },
    );
    graph.insert(
        ids::SAVE,
        Node::SaveImage {
            images: decoded,
            filename_prefix: OUTPUT_PREFIX.to_string(),
        },
    );
}

// ---------------------------------------------------------------------------
// Tests — cross-family invariants
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn plain_input(prompt: &str) -> ImageInput {
        ImageInput {
            prompt: prompt.into(),
            negative_prompt: None,
            width: None,
            height: None,
            steps: None,
            guidance: None,
            seed: Some(7),
            reference_image: None,
            denoise: None,
        }
    }

    pub fn referenced_input(prompt: &str, filename: &str) -> ImageInput {
        ImageInput {
            reference_image: Some(filename.into()),
            ..plain_input(prompt)
        }
    }

    /// Denoise on the graph's single sampler node.
    pub fn sampler_denoise(graph: &WorkflowGraph) -> f32 {
        match graph.get(ids::SAMPLER) {
            Some(Node::KSampler { denoise, .. }) => *denoise,
            other => panic!("expected a KSampler at node 3, got {other:?}"),
        }
    }

    pub fn reference_load_count(graph: &WorkflowGraph) -> usize {
        graph.count_matching(|n| matches!(n, Node::LoadImage { .. }))
    }
}

#[cfg(test)]
mod tests {
    use fableworks_comfyui::TERMINAL_NODE_IDS;

    use super::test_support::*;
    use super::*;

    fn all_builders() -> Vec<Box<dyn GraphBuilder>> {
        [
            ModelFamily::Sd15,
            ModelFamily::Sdxl,
            ModelFamily::Flux,
            ModelFamily::Wan21,
        ]
        .into_iter()
        .map(|f| builder_for(f, FamilyDefaults::for_family(f)))
        .collect()
    }

    #[test]
    fn every_family_saves_at_a_recognized_terminal_id() {
        for builder in all_builders() {
            let graph = builder.build(&plain_input("a lighthouse")).unwrap();
            assert!(
                TERMINAL_NODE_IDS.contains(&graph.output().key().as_str()),
                "{} saves at unrecognized node {}",
                builder.family(),
                graph.output()
            );
            assert!(graph.get(graph.output()).unwrap().is_terminal());
        }
    }

    #[test]
    fn exactly_one_terminal_node_per_graph() {
        for builder in all_builders() {
            for input in [
                plain_input("a lighthouse"),
                referenced_input("a lighthouse", "ref.png"),
            ] {
                let graph = builder.build(&input).unwrap();
                assert_eq!(
                    graph.count_matching(Node::is_terminal),
                    1,
                    "family {}",
                    builder.family()
                );
            }
        }
    }

    #[test]
    fn reference_selects_img2img_in_every_family() {
        for builder in all_builders() {
            let graph = builder
                .build(&referenced_input("a lighthouse", "ref.png"))
                .unwrap();
            assert_eq!(reference_load_count(&graph), 1, "family {}", builder.family());
            let denoise = sampler_denoise(&graph);
            assert!(
                denoise < 1.0 && denoise > 0.0,
                "family {} denoise {denoise}",
                builder.family()
            );
        }
    }

    #[test]
    fn no_reference_means_full_denoise_and_no_load_node() {
        for builder in all_builders() {
            let graph = builder.build(&plain_input("a lighthouse")).unwrap();
            assert_eq!(reference_load_count(&graph), 0, "family {}", builder.family());
            assert_eq!(sampler_denoise(&graph), 1.0, "family {}", builder.family());
        }
    }

    #[test]
    fn caller_denoise_override_wins_over_family_default() {
        for builder in all_builders() {
            let input = ImageInput {
                denoise: Some(0.33),
                ..referenced_input("a lighthouse", "ref.png")
            };
            let graph = builder.build(&input).unwrap();
            assert_eq!(sampler_denoise(&graph), 0.33);
        }
    }

    #[test]
    fn out_of_range_denoise_rejected() {
        for builder in all_builders() {
            for bad in [0.0, 1.0, 1.5, -0.1] {
                let input = ImageInput {
                    denoise: Some(bad),
                    ..referenced_input("a lighthouse", "ref.png")
                };
                assert!(builder.build(&input).is_err(), "denoise {bad} accepted");
            }
        }
    }

    #[test]
    fn empty_prompt_rejected() {
        for builder in all_builders() {
            assert!(builder.build(&plain_input("  ")).is_err());
        }
    }

    #[test]
    fn explicit_seed_is_deterministic() {
        for builder in all_builders() {
            let a = builder.build(&plain_input("a lighthouse")).unwrap();
            let b = builder.build(&plain_input("a lighthouse")).unwrap();
            assert_eq!(a.to_wire(), b.to_wire(), "family {}", builder.family());
        }
    }
}
