//! The job lifecycle over an abstract store.
//!
//! State machine: `waiting → active → {completed | failed | delayed}`,
//! with `delayed → active` on retry. The queue owns every transition;
//! workers and HTTP handlers only call methods here.

use std::sync::Arc;

use chrono::{Duration, Utc};
use fableworks_core::job::{validate_priority, Job, JobPayload, JobResult, JobState, DEFAULT_PRIORITY};
use fableworks_core::types::{JobId, Timestamp};
use uuid::Uuid;

use crate::error::QueueError;
use crate::record::{JobRecord, JobStatus, QueueCounts};
use crate::store::{JobStore, RetentionPolicy};

/// Attempts per job before it fails for good.
pub const MAX_ATTEMPTS: u32 = 3;

/// Fixed retry policy: bounded attempts, exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::seconds(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt after `failed_attempts` failures:
    /// 1s, 2s, 4s, ...
    pub fn backoff_after(&self, failed_attempts: u32) -> Duration {
        let factor = 2_i32.saturating_pow(failed_attempts.saturating_sub(1));
        self.base_delay * factor
    }
}

/// What a caller submits. The queue assigns the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub project_id: String,
    pub user_id: String,
    pub payload: JobPayload,
    /// 1 (most urgent) to 5; defaults to mid-priority.
    pub priority: Option<u8>,
    pub idempotency_key: Option<String>,
}

pub struct JobQueue {
    store: Arc<dyn JobStore>,
    retry: RetryPolicy,
    retention: RetentionPolicy,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_policies(
        store: Arc<dyn JobStore>,
        retry: RetryPolicy,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            retry,
            retention,
        }
    }

    // ---- submission ----

    /// Enqueue a job, or reuse an existing non-failed job submitted
    /// under the same idempotency key by the same user.
    pub async fn enqueue(&self, new_job: NewJob) -> Result<JobId, QueueError> {
        let priority = match new_job.priority {
            Some(p) => {
                validate_priority(p)?;
                p
            }
            None => DEFAULT_PRIORITY,
        };

        if let Some(key) = &new_job.idempotency_key {
            if let Some(existing) = self
                .store
                .find_by_idempotency_key(&new_job.user_id, key)
                .await?
            {
                tracing::debug!(
                    job_id = %existing.job.id,
                    idempotency_key = %key,
                    "Reusing existing job for idempotency key",
                );
                return Ok(existing.job.id);
            }
        }

        let job = Job {
            // v7 ids are time-ordered, which keeps FIFO tie-breaks
            // stable even at equal timestamps
            id: Uuid::now_v7(),
            kind: new_job.payload.kind(),
            project_id: new_job.project_id,
            user_id: new_job.user_id,
            payload: new_job.payload,
            priority,
            created_at: Utc::now(),
            idempotency_key: new_job.idempotency_key,
        };
        let id = job.id;
        tracing::info!(job_id = %id, kind = %job.kind, priority, "Job enqueued");
        self.store.insert(JobRecord::new(job)).await?;
        Ok(id)
    }

    // ---- read side ----

    pub async fn get_status(&self, id: JobId) -> Result<JobStatus, QueueError> {
        let record = self.require(id).await?;
        Ok(record.status())
    }

    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        self.store.counts().await
    }

    // ---- dispatch ----

    /// Claim the next claimable job, marking it active.
    pub async fn claim(&self) -> Result<Option<JobRecord>, QueueError> {
        self.claim_at(Utc::now()).await
    }

    /// [`Self::claim`] at an explicit instant.
    pub async fn claim_at(&self, now: Timestamp) -> Result<Option<JobRecord>, QueueError> {
        self.store.claim_next(now).await
    }

    /// Record coarse execution progress on an active job.
    pub async fn set_progress(&self, id: JobId, percent: u8) -> Result<(), QueueError> {
        let mut record = self.require(id).await?;
        if record.state != JobState::Active {
            return Ok(()); // job already settled, late report is harmless
        }
        record.progress = percent.min(100);
        self.store.update(record).await
    }

    // ---- settlement ----

    /// Mark an active job completed with its result.
    pub async fn complete(&self, id: JobId, result: JobResult) -> Result<(), QueueError> {
        let mut record = self.require(id).await?;
        if record.state != JobState::Active {
            return Err(QueueError::IllegalTransition {
                id,
                message: format!("cannot complete from state '{}'", record.state),
            });
        }
        record.state = JobState::Completed;
        record.progress = 100;
        record.finished_at = Some(Utc::now());
        record.result = Some(result);
        tracing::info!(job_id = %id, "Job completed");
        self.store.update(record).await
    }

    /// Record a failed attempt. Retries with backoff while the
    /// attempt budget lasts, otherwise settles as failed. Returns the
    /// resulting state.
    pub async fn fail(&self, id: JobId, error: &str) -> Result<JobState, QueueError> {
        let mut record = self.require(id).await?;
        if record.state != JobState::Active {
            return Err(QueueError::IllegalTransition {
                id,
                message: format!("cannot fail from state '{}'", record.state),
            });
        }
        record.failed_reason = Some(error.to_string());

        let state = if record.attempts < self.retry.max_attempts {
            let delay = self.retry.backoff_after(record.attempts);
            record.state = JobState::Delayed;
            record.next_attempt_at = Some(Utc::now() + delay);
            record.progress = 0;
            tracing::warn!(
                job_id = %id,
                attempt = record.attempts,
                retry_in_ms = delay.num_milliseconds(),
                error,
                "Job attempt failed, retrying",
            );
            JobState::Delayed
        } else {
            self.settle_failed(&mut record, error);
            JobState::Failed
        };

        self.store.update(record).await?;
        Ok(state)
    }

    /// Fail without consuming the remaining attempt budget. For
    /// errors retrying cannot fix (unsupported kind, bad payload).
    pub async fn fail_permanent(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        let mut record = self.require(id).await?;
        if record.state.is_terminal() {
            return Ok(());
        }
        record.failed_reason = Some(error.to_string());
        self.settle_failed(&mut record, error);
        self.store.update(record).await
    }

    fn settle_failed(&self, record: &mut JobRecord, error: &str) {
        record.state = JobState::Failed;
        record.finished_at = Some(Utc::now());
        record.result = Some(JobResult::err(error));
        tracing::error!(
            job_id = %record.job.id,
            attempts = record.attempts,
            error,
            "Job failed",
        );
    }

    // ---- lifecycle maintenance ----

    /// Cancel a job that has not been dispatched yet. Returns whether
    /// anything was cancelled; active and settled jobs are left
    /// untouched. The check and the removal are one store operation,
    /// so a claim racing this call either wins or loses outright.
    pub async fn cancel(&self, id: JobId) -> Result<bool, QueueError> {
        let cancelled = self.store.remove_if_pending(id).await?;
        if cancelled {
            tracing::info!(job_id = %id, "Job cancelled");
        }
        Ok(cancelled)
    }

    /// Apply the retention policy. Returns how many records were
    /// pruned.
    pub async fn prune(&self) -> Result<usize, QueueError> {
        let pruned = self.store.prune(&self.retention, Utc::now()).await?;
        if pruned > 0 {
            tracing::debug!(pruned, "Retention pruned terminal jobs");
        }
        Ok(pruned)
    }

    async fn require(&self, id: JobId) -> Result<JobRecord, QueueError> {
        self.store.get(id).await?.ok_or(QueueError::NotFound(id))
    }
}
