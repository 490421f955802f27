//! Persistence seam for job records.
//!
//! [`JobStore`] is the contract the queue drives; [`MemoryStore`] is
//! the in-process reference implementation. All time-dependent
//! operations take `now` explicitly so behavior is a pure function of
//! the clock, which keeps retry and retention tests deterministic.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Duration;
use fableworks_core::job::JobState;
use fableworks_core::types::{JobId, Timestamp};

use crate::error::QueueError;
use crate::record::{JobRecord, QueueCounts};

/// Bounds on how long terminal records are kept.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Completed records beyond this count are pruned oldest-first.
    pub completed_max: usize,
    pub completed_max_age: Duration,
    /// Failed records are kept longer for diagnosis.
    pub failed_max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_max: 1000,
            completed_max_age: Duration::hours(24),
            failed_max_age: Duration::days(7),
        }
    }
}

/// Storage operations the queue needs. Implementations must make
/// [`Self::claim_next`] atomic: no record may be claimed twice.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, record: JobRecord) -> Result<(), QueueError>;

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, QueueError>;

    /// Replace an existing record wholesale.
    async fn update(&self, record: JobRecord) -> Result<(), QueueError>;

    /// Remove a record only if it has not been dispatched (`waiting`
    /// or `delayed`). The state check and the removal must share one
    /// critical section with [`Self::claim_next`], so a claim landing
    /// concurrently either wins (this returns `false`) or loses (the
    /// record is gone before the claim scans). Errors when the record
    /// is absent.
    async fn remove_if_pending(&self, id: JobId) -> Result<bool, QueueError>;

    /// Atomically claim the best claimable record: lowest priority
    /// number first (1 is most urgent), oldest first within a
    /// priority. The record is returned already marked `Active`.
    async fn claim_next(&self, now: Timestamp) -> Result<Option<JobRecord>, QueueError>;

    /// Find a non-failed record enqueued by `user_id` under this
    /// idempotency key.
    async fn find_by_idempotency_key(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<JobRecord>, QueueError>;

    /// Drop terminal records outside the retention policy. Returns
    /// how many were removed.
    async fn prune(&self, policy: &RetentionPolicy, now: Timestamp) -> Result<usize, QueueError>;

    async fn counts(&self) -> Result<QueueCounts, QueueError>;
}

/// In-memory [`JobStore`] behind a single mutex. The critical
/// sections are all short map scans; contention is bounded by the
/// worker's concurrency, not by job volume.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<JobId, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, record: JobRecord) -> Result<(), QueueError> {
        let mut records = self.records.lock().expect("job store poisoned");
        records.insert(record.job.id, record);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, QueueError> {
        let records = self.records.lock().expect("job store poisoned");
        Ok(records.get(&id).cloned())
    }

    async fn update(&self, record: JobRecord) -> Result<(), QueueError> {
        let mut records = self.records.lock().expect("job store poisoned");
        let id = record.job.id;
        if !records.contains_key(&id) {
            return Err(QueueError::NotFound(id));
        }
        records.insert(id, record);
        Ok(())
    }

    async fn remove_if_pending(&self, id: JobId) -> Result<bool, QueueError> {
        let mut records = self.records.lock().expect("job store poisoned");
        let Some(record) = records.get(&id) else {
            return Err(QueueError::NotFound(id));
        };
        match record.state {
            JobState::Waiting | JobState::Delayed => {
                records.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_next(&self, now: Timestamp) -> Result<Option<JobRecord>, QueueError> {
        let mut records = self.records.lock().expect("job store poisoned");

        let best = records
            .values()
            .filter(|r| r.claimable(now))
            .min_by(|a, b| {
                a.job
                    .priority
                    .cmp(&b.job.priority)
                    .then(a.job.created_at.cmp(&b.job.created_at))
                    .then(a.job.id.cmp(&b.job.id))
            })
            .map(|r| r.job.id);

        let Some(id) = best else { return Ok(None) };
        let record = records.get_mut(&id).expect("claimed id just scanned");
        record.state = JobState::Active;
        record.attempts += 1;
        record.next_attempt_at = None;
        record.processed_at.get_or_insert(now);
        Ok(Some(record.clone()))
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<JobRecord>, QueueError> {
        let records = self.records.lock().expect("job store poisoned");
        Ok(records
            .values()
            .find(|r| {
                r.state != JobState::Failed
                    && r.job.user_id == user_id
                    && r.job.idempotency_key.as_deref() == Some(key)
            })
            .cloned())
    }

    async fn prune(&self, policy: &RetentionPolicy, now: Timestamp) -> Result<usize, QueueError> {
        let mut records = self.records.lock().expect("job store poisoned");
        let before = records.len();

        records.retain(|_, r| match r.state {
            JobState::Completed => r
                .finished_at
                .map_or(true, |at| now - at <= policy.completed_max_age),
            JobState::Failed => r
                .finished_at
                .map_or(true, |at| now - at <= policy.failed_max_age),
            _ => true,
        });

        // Count bound on completed records, oldest out first.
        let mut completed: Vec<(JobId, Option<Timestamp>)> = records
            .values()
            .filter(|r| r.state == JobState::Completed)
            .map(|r| (r.job.id, r.finished_at))
            .collect();
        if completed.len() > policy.completed_max {
            completed.sort_by_key(|(_, finished)| *finished);
            let excess = completed.len() - policy.completed_max;
            for (id, _) in completed.into_iter().take(excess) {
                records.remove(&id);
            }
        }

        Ok(before - records.len())
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let records = self.records.lock().expect("job store poisoned");
        let mut counts = QueueCounts::default();
        for record in records.values() {
            match record.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Active => counts.active += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Delayed => counts.delayed += 1,
            }
        }
        Ok(counts)
    }
}
