//! ComfyUI-compatible render-engine client.
//!
//! Wraps the engine's HTTP API (workflow submission, history
//! retrieval, reference uploads, liveness probe) behind the
//! [`api::EngineApi`] trait, parses execution history into typed
//! output references, and drives the submit/poll execution state
//! machine in [`poller`].

pub mod api;
pub mod error;
pub mod history;
pub mod poller;

pub use api::{ComfyUiApi, EngineApi};
pub use error::EngineError;
pub use history::{ExecutionPoll, OutputRef, TERMINAL_NODE_IDS};
pub use poller::wait_for_output;
