//! The submit/poll execution state machine.
//!
//! After submission the engine is polled at a fixed, kind-specific
//! cadence until output appears under a terminal node id, the engine
//! reports an execution error, or the deadline passes. Individual
//! poll failures (non-2xx, parse errors) are "not ready yet", never
//! fatal — only the deadline ends a wait early.

use fableworks_core::clock::Clock;
use fableworks_core::policy::PollPolicy;

use crate::api::EngineApi;
use crate::error::EngineError;
use crate::history::{inspect_history, ExecutionPoll, OutputRef};

/// Poll the engine until `prompt_id` completes, fails, or times out.
///
/// The sleep between polls yields cooperatively so concurrent job
/// slots are not starved. All wait state (deadline, elapsed) lives in
/// this call frame; the API client itself is stateless.
pub async fn wait_for_output(
    api: &dyn EngineApi,
    prompt_id: &str,
    policy: PollPolicy,
    clock: &dyn Clock,
) -> Result<OutputRef, EngineError> {
    let started = clock.now();

    loop {
        match api.history(prompt_id).await {
            Ok(raw) => match inspect_history(&raw, prompt_id) {
                ExecutionPoll::Completed(output) => {
                    tracing::debug!(
                        prompt_id,
                        filename = %output.filename,
                        "Engine output ready",
                    );
                    return Ok(output);
                }
                ExecutionPoll::Failed(message) => {
                    tracing::warn!(prompt_id, error = %message, "Engine execution error");
                    return Err(EngineError::Execution(message));
                }
                ExecutionPoll::Pending => {}
            },
            Err(e) => {
                // Transient poll failure; the deadline still applies.
                tracing::debug!(prompt_id, error = %e, "History poll failed, retrying");
            }
        }

        let waited = clock.now().saturating_sub(started);
        if waited >= policy.timeout {
            tracing::warn!(
                prompt_id,
                waited_secs = waited.as_secs(),
                "Gave up waiting for engine output",
            );
            return Err(EngineError::Timeout { waited });
        }

        clock.sleep(policy.interval).await;
    }
}
