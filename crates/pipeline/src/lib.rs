//! Workflow graph construction and provider adapters.
//!
//! [`graph`] defines the typed node graph submitted to the render
//! engine. [`families`] holds one graph-builder strategy per image
//! model family; [`video`] and [`audio`] build the video, voice, and
//! music graphs. [`providers`] wraps builders and the engine client
//! behind the uniform adapter contract the worker dispatcher routes
//! to.

pub mod audio;
pub mod error;
pub mod families;
pub mod graph;
pub mod providers;
pub mod video;

pub use error::ProviderError;
pub use providers::{
    default_providers, upload_reference, MediaProvider, NoProgress, ProgressSink, ProviderOutput,
};
