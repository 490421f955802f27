//! Queue error taxonomy.

use fableworks_core::error::CoreError;
use fableworks_core::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    /// The requested transition is not legal from the job's current
    /// state (e.g. completing a job that was never claimed).
    #[error("Job {id}: {message}")]
    IllegalTransition { id: JobId, message: String },

    #[error("Invalid job: {0}")]
    Validation(String),

    /// The backing store failed. Carries the store's own message.
    #[error("Store error: {0}")]
    Store(String),
}

impl From<CoreError> for QueueError {
    fn from(e: CoreError) -> Self {
        QueueError::Validation(e.to_string())
    }
}
