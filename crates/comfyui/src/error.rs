use std::time::Duration;

/// Errors from the render-engine layer.
///
/// `Unreachable` covers network-level failures and is the only
/// variant the queue's retry policy is expected to recover from;
/// `Rejected`, `Execution`, and `Timeout` describe what the engine
/// itself did with the work.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine could not be reached (probe failed, connection
    /// refused, DNS, TLS, ...).
    #[error("Engine unreachable: {0}")]
    Unreachable(String),

    /// The engine returned a non-2xx response to a submission. The
    /// body is captured verbatim for diagnosis.
    #[error("Engine rejected submission ({status}): {body}")]
    Rejected {
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The engine's own history reports a failed run, e.g. a missing
    /// checkpoint file. Surfaced verbatim.
    #[error("Engine execution error: {0}")]
    Execution(String),

    /// No output appeared within the kind-specific deadline. Distinct
    /// from `Execution` so operators can tell "slow/stuck" from
    /// "rejected the work".
    #[error("Timed out after {}s waiting for engine output", waited.as_secs())]
    Timeout { waited: Duration },
}
