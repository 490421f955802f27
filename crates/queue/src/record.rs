//! Persisted job record and its read-side views.

use fableworks_core::job::{Job, JobKind, JobPayload, JobResult, JobState};
use fableworks_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

/// A job plus everything the queue tracks about it. The [`Job`]
/// itself is immutable after enqueue; only the bookkeeping fields
/// change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job: Job,
    pub state: JobState,
    /// Coarse progress percentage (0-100), written during execution.
    pub progress: u8,
    /// Attempts started so far (first claim makes it 1).
    pub attempts: u32,
    /// For delayed jobs: when the next attempt becomes claimable.
    pub next_attempt_at: Option<Timestamp>,
    /// When the job was first claimed by a worker.
    pub processed_at: Option<Timestamp>,
    /// When the job reached a terminal state.
    pub finished_at: Option<Timestamp>,
    pub result: Option<JobResult>,
    /// Last error message, preserved across retries for diagnosis.
    pub failed_reason: Option<String>,
}

impl JobRecord {
    /// Fresh record for a newly enqueued job.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            state: JobState::Waiting,
            progress: 0,
            attempts: 0,
            next_attempt_at: None,
            processed_at: None,
            finished_at: None,
            result: None,
            failed_reason: None,
        }
    }

    /// Whether this record can still be claimed at `now`.
    pub fn claimable(&self, now: Timestamp) -> bool {
        match self.state {
            JobState::Waiting => true,
            JobState::Delayed => self.next_attempt_at.map_or(true, |at| at <= now),
            _ => false,
        }
    }

    /// The caller-facing status view.
    pub fn status(&self) -> JobStatus {
        JobStatus {
            id: self.job.id,
            kind: self.job.kind,
            state: self.state,
            progress: self.progress,
            attempts: self.attempts,
            payload: self.job.payload.clone(),
            result: self.result.clone(),
            failed_reason: self.failed_reason.clone(),
            created_at: self.job.created_at,
            processed_at: self.processed_at,
            finished_at: self.finished_at,
        }
    }
}

/// What a status poller sees. Serialized as-is by the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub progress: u8,
    pub attempts: u32,
    /// The payload exactly as enqueued.
    pub payload: JobPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

/// Per-state record counts, for introspection and log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.waiting + self.active + self.completed + self.failed + self.delayed
    }
}
