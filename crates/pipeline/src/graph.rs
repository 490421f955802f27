//! The typed workflow graph submitted to the render engine.
//!
//! On the wire the engine wants a map from node id to
//! `{class_type, inputs}`, where inputs referencing another node are
//! encoded as `["<id>", slot]`. Here the graph is a closed [`Node`]
//! enum plus an explicit terminal [`WorkflowGraph::output`] field, so
//! "which node is the output" is part of the type, not a magic key
//! lookup. Graphs are built fresh per generation call and never
//! mutated after submission.

use std::collections::BTreeMap;

use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Ids and links
// ---------------------------------------------------------------------------

/// Identifier of one node within a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u16);

impl NodeId {
    /// Wire key for this node (`"9"` for node 9).
    pub fn key(&self) -> String {
        self.0.to_string()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to an output slot of another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub node: NodeId,
    pub slot: u8,
}

impl Link {
    pub const fn new(node: NodeId, slot: u8) -> Self {
        Self { node, slot }
    }

    fn wire(&self) -> Value {
        json!([self.node.key(), self.slot])
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// The closed set of node kinds the builders emit.
///
/// Each variant corresponds to one engine `class_type`; the fields
/// are that node's inputs. Slot conventions (model = 0, clip = 1,
/// vae = 2 on checkpoint loaders, and so on) follow the engine's
/// node definitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Single-file checkpoint loader (sd15, sdxl). Outputs
    /// MODEL/CLIP/VAE at slots 0/1/2.
    CheckpointLoader { ckpt_name: String },
    /// Standalone diffusion-model loader (flux, wan21). MODEL at 0.
    UnetLoader { unet_name: String, weight_dtype: &'static str },
    /// Single text-encoder loader. CLIP at 0.
    ClipLoader { clip_name: String, clip_type: &'static str },
    /// Dual text-encoder loader (flux). CLIP at 0.
    DualClipLoader {
        clip_name1: String,
        clip_name2: String,
        clip_type: &'static str,
    },
    /// Standalone VAE loader. VAE at 0.
    VaeLoader { vae_name: String },
    /// Prompt encoding. CONDITIONING at 0.
    ClipTextEncode { text: String, clip: Link },
    /// Guidance injection for flux conditioning. CONDITIONING at 0.
    FluxGuidance { conditioning: Link, guidance: f32 },
    /// Blank starting latent. LATENT at 0.
    EmptyLatentImage { width: u32, height: u32, batch_size: u32 },
    /// Blank starting latent for flux-style models. LATENT at 0.
    EmptySd3LatentImage { width: u32, height: u32, batch_size: u32 },
    /// Load a file from the engine's input area. IMAGE at 0.
    LoadImage { image: String },
    /// Encode pixels to latent space. LATENT at 0.
    VaeEncode { pixels: Link, vae: Link },
    /// The sampler chain. LATENT at 0.
    KSampler {
        model: Link,
        seed: u64,
        steps: u32,
        cfg: f32,
        sampler_name: &'static str,
        scheduler: &'static str,
        positive: Link,
        negative: Link,
        latent_image: Link,
        /// 1.0 = full generation from noise; (0,1) = reference
        /// conditioning, lower preserves the reference more.
        denoise: f32,
    },
    /// Decode latents back to pixels. IMAGE at 0.
    VaeDecode { samples: Link, vae: Link },
    /// Image-to-video conditioning (wan21). Emits positive/negative
    /// conditioning at 0/1 and the video latent at 2.
    WanImageToVideo {
        positive: Link,
        negative: Link,
        vae: Link,
        width: u32,
        height: u32,
        length: u32,
        batch_size: u32,
        start_image: Option<Link>,
    },
    /// Text-to-speech synthesis. AUDIO at 0.
    TtsGenerate { text: String, voice: String, speed: f32 },
    /// Text-conditioned music synthesis. AUDIO at 0.
    MusicGenerate {
        prompt: String,
        style: String,
        seconds: u32,
        seed: u64,
    },
    /// Terminal image save.
    SaveImage { images: Link, filename_prefix: String },
    /// Terminal animation save.
    SaveAnimatedWebp {
        images: Link,
        filename_prefix: String,
        fps: u32,
    },
    /// Terminal audio save.
    SaveAudio { audio: Link, filename_prefix: String },
}

impl Node {
    /// The engine `class_type` for this node.
    pub fn class_type(&self) -> &'static str {
        match self {
            Node::CheckpointLoader { .. } => "CheckpointLoaderSimple",
            Node::UnetLoader { .. } => "UNETLoader",
            Node::ClipLoader { .. } => "CLIPLoader",
            Node::DualClipLoader { .. } => "DualCLIPLoader",
            Node::VaeLoader { .. } => "VAELoader",
            Node::ClipTextEncode { .. } => "CLIPTextEncode",
            Node::FluxGuidance { .. } => "FluxGuidance",
            Node::EmptyLatentImage { .. } => "EmptyLatentImage",
            Node::EmptySd3LatentImage { .. } => "EmptySD3LatentImage",
            Node::LoadImage { .. } => "LoadImage",
            Node::VaeEncode { .. } => "VAEEncode",
            Node::KSampler { .. } => "KSampler",
            Node::VaeDecode { .. } => "VAEDecode",
            Node::WanImageToVideo { .. } => "WanImageToVideo",
            Node::TtsGenerate { .. } => "TTSGenerate",
            Node::MusicGenerate { .. } => "MusicGenerate",
            Node::SaveImage { .. } => "SaveImage",
            Node::SaveAnimatedWebp { .. } => "SaveAnimatedWEBP",
            Node::SaveAudio { .. } => "SaveAudio",
        }
    }

    /// Whether this node terminates a graph (produces saved output).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Node::SaveImage { .. } | Node::SaveAnimatedWebp { .. } | Node::SaveAudio { .. }
        )
    }

    /// Wire encoding of this node's inputs.
    fn inputs(&self) -> Value {
        match self {
            Node::CheckpointLoader { ckpt_name } => json!({ "ckpt_name": ckpt_name }),
            Node::UnetLoader {
                unet_name,
                weight_dtype,
            } => json!({ "unet_name": unet_name, "weight_dtype": weight_dtype }),
            Node::ClipLoader {
                clip_name,
                clip_type,
            } => json!({ "clip_name": clip_name, "type": clip_type }),
            Node::DualClipLoader {
                clip_name1,
                clip_name2,
                clip_type,
            } => json!({
                "clip_name1": clip_name1,
                "clip_name2": clip_name2,
                "type": clip_type,
            }),
            Node::VaeLoader { vae_name } => json!({ "vae_name": vae_name }),
            Node::ClipTextEncode { text, clip } => {
                json!({ "text": text, "clip": clip.wire() })
            }
            Node::FluxGuidance {
                conditioning,
                guidance,
            } => json!({ "conditioning": conditioning.wire(), "guidance": guidance }),
            Node::EmptyLatentImage {
                width,
                height,
                batch_size,
            }
            | Node::EmptySd3LatentImage {
                width,
                height,
                batch_size,
            } => json!({ "width": width, "height": height, "batch_size": batch_size }),
            Node::LoadImage { image } => json!({ "image": image }),
            Node::VaeEncode { pixels, vae } => {
                json!({ "pixels": pixels.wire(), "vae": vae.wire() })
            }
            Node::KSampler {
                model,
                seed,
                steps,
                cfg,
                sampler_name,
                scheduler,
                positive,
                negative,
                latent_image,
                denoise,
            } => json!({
                "model": model.wire(),
                "seed": seed,
                "steps": steps,
                "cfg": cfg,
                "sampler_name": sampler_name,
                "scheduler": scheduler,
                "positive": positive.wire(),
                "negative": negative.wire(),
                "latent_image": latent_image.wire(),
                "denoise": denoise,
            }),
            Node::VaeDecode { samples, vae } => {
                json!({ "samples": samples.wire(), "vae": vae.wire() })
            }
            Node::WanImageToVideo {
                positive,
                negative,
                vae,
                width,
                height,
                length,
                batch_size,
                start_image,
            } => {
                let mut inputs = json!({
                    "positive": positive.wire(),
                    "negative": negative.wire(),
                    "vae": vae.wire(),
                    "width": width,
                    "height": height,
                    "length": length,
                    "batch_size": batch_size,
                });
                if let Some(start) = start_image {
                    inputs["start_image"] = start.wire();
                }
                inputs
            }
            Node::TtsGenerate { text, voice, speed } => {
                json!({ "text": text, "voice": voice, "speed": speed })
            }
            Node::MusicGenerate {
                prompt,
                style,
                seconds,
                seed,
            } => json!({ "prompt": prompt, "style": style, "seconds": seconds, "seed": seed }),
            Node::SaveImage {
                images,
                filename_prefix,
            } => json!({ "images": images.wire(), "filename_prefix": filename_prefix }),
            Node::SaveAnimatedWebp {
                images,
                filename_prefix,
                fps,
            } => json!({
                "images": images.wire(),
                "filename_prefix": filename_prefix,
                "fps": fps,
                "lossless": false,
                "method": "default",
            }),
            Node::SaveAudio {
                audio,
                filename_prefix,
            } => json!({ "audio": audio.wire(), "filename_prefix": filename_prefix }),
        }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A complete workflow: nodes plus the explicit terminal output node.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    nodes: BTreeMap<NodeId, Node>,
    output: NodeId,
}

impl WorkflowGraph {
    /// Create an empty graph that will save its output at `output`.
    /// The builder must insert a terminal node there before
    /// submission; [`Self::to_wire`] debug-asserts it.
    pub fn new(output: NodeId) -> Self {
        Self {
            nodes: BTreeMap::new(),
            output,
        }
    }

    /// Insert a node and return a link to its primary (slot 0) output.
    pub fn insert(&mut self, id: NodeId, node: Node) -> Link {
        self.nodes.insert(id, node);
        Link::new(id, 0)
    }

    /// The terminal save node's id.
    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Iterate nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    /// Count nodes matching a predicate. Used by invariant checks.
    pub fn count_matching(&self, predicate: impl Fn(&Node) -> bool) -> usize {
        self.nodes.values().filter(|n| predicate(n)).count()
    }

    /// Serialize to the engine's `{"<id>": {class_type, inputs}}`
    /// wire format.
    pub fn to_wire(&self) -> Value {
        debug_assert!(
            self.get(self.output).is_some_and(Node::is_terminal),
            "graph output must point at a terminal save node"
        );

        let mut wire = serde_json::Map::new();
        for (id, node) in &self.nodes {
            wire.insert(
                id.key(),
                json!({
                    "class_type": node.class_type(),
                    "inputs": node.inputs(),
                }),
            );
        }
        Value::Object(wire)
    }
}
