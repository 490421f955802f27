//! Wan 2.1 video graph construction.
//!
//! Topology mirrors the wan21 still-image chain up to the loaders and
//! prompts, then swaps the empty latent for a WanImageToVideo node
//! that emits re-derived conditioning (slots 0/1) and the video
//! latent (slot 2). An optional already-uploaded start frame turns
//! text-to-video into image-to-video.

use fableworks_core::config::FamilyDefaults;
use fableworks_core::job::VideoInput;
use fableworks_core::resolution::{fit_pixel_budget, validate_dimensions, PIXEL_BUDGET};

use crate::error::ProviderError;
use crate::families::{add_prompts, ids, OUTPUT_PREFIX};
use crate::graph::{Link, Node, WorkflowGraph};

/// Frame counts above this are refused rather than silently clamped.
pub const MAX_FRAMES: u32 = 241;

pub fn build_video_graph(
    input: &VideoInput,
    defaults: &FamilyDefaults,
) -> Result<WorkflowGraph, ProviderError> {
    if input.prompt.trim().is_empty() {
        return Err(ProviderError::InvalidInput(
            "Prompt must not be empty".into(),
        ));
    }
    if input.frames == 0 || input.frames > MAX_FRAMES {
        return Err(ProviderError::InvalidInput(format!(
            "Frame count must be in 1..={MAX_FRAMES} (got {})",
            input.frames
        )));
    }
    if input.fps == 0 {
        return Err(ProviderError::InvalidInput("fps must be positive".into()));
    }
    validate_dimensions(input.width, input.height)
        .map_err(|e| ProviderError::InvalidInput(e.to_string()))?;

    let unet = asset(&defaults.unet, "unet")?;
    let clip_name = asset(&defaults.clip, "clip")?;
    let vae_name = asset(&defaults.vae, "vae")?;

    let (width, height) = fit_pixel_budget(input.width, input.height, PIXEL_BUDGET);
    let seed = input.seed.unwrap_or_else(rand::random);
    let negative_prompt = input
        .negative_prompt
        .clone()
        .unwrap_or_else(|| defaults.negative_prompt.to_string());

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

    let (positive, negative) = add_prompts(&mut graph, clip, &input.prompt, &negative_prompt);

    let start_image = input.start_image.as_ref().map(|filename| {
        graph.insert(
            ids::REFERENCE,
            Node::LoadImage {
                image: filename.clone(),
            },
        )
    });

    let conditioner = graph.insert(
        ids::LATENT,
        Node::WanImageToVideo {
            positive,
            negative,
            vae,
            width,
            height,
            length: input.frames,
            batch_size: 1,
            start_image,
        },
    );

    let sampled = graph.insert(
        ids::SAMPLER,
        Node::KSampler {
            model,
            seed,
            steps: defaults.steps,
            cfg: defaults.guidance,
            sampler_name: defaults.sampler,
            scheduler: defaults.scheduler,
            positive: conditioner,
            negative: Link::new(ids::LATENT, 1),
            latent_image: Link::new(ids::LATENT, 2),
            denoise: 1.0,
        },
    );
    let decoded = graph.insert(ids::DECODE, Node::VaeDecode { samples: sampled, vae });
    graph.insert(
        ids::SAVE,
        Node::SaveAnimatedWebp {
            images: decoded,
            filename_prefix: OUTPUT_PREFIX.to_string(),
            fps: input.fps,
        },
    );
    Ok(graph)
}

fn asset(value: &Option<String>, what: &str) -> Result<String, ProviderError> {
    value
        .clone()
        .ok_or_else(|| ProviderError::InvalidInput(format!("wan21 requires a {what} name")))
}
