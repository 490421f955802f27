//! Shared domain types for the generation pipeline.
//!
//! Everything here is pure data and pure functions: the job model,
//! per-kind execution policy, model-family configuration, the
//! pixel-budget scaler, and the injectable clock. No I/O. Other
//! crates (queue, worker, pipeline, comfyui) depend on this one and
//! never on each other's internals.

pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod policy;
pub mod resolution;
pub mod types;
