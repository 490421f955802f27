use fableworks_comfyui::EngineError;
use fableworks_core::job::JobKind;

/// Errors from the provider adapters.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The engine layer failed (unreachable, rejected, execution
    /// error, timeout).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A payload of the wrong kind reached this provider. Dispatcher
    /// routing should make this unreachable.
    #[error("Payload of kind '{got}' routed to the {expected} provider")]
    WrongKind { expected: JobKind, got: JobKind },

    /// The payload is structurally valid but its values are not.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
