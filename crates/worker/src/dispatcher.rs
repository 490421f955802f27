//! The worker's dispatch loop.
//!
//! One [`JobDispatcher`] per process. It polls the queue, routes each
//! claimed job to the provider for its kind, and settles the outcome
//! back into the queue. Provider failures of any shape — errors,
//! panics, unavailability — become failed job results; the loop
//! itself never dies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use fableworks_core::clock::Clock;
use fableworks_core::config::WorkerSettings;
use fableworks_core::job::{JobKind, JobResult};
use fableworks_core::types::JobId;
use fableworks_pipeline::{MediaProvider, ProgressSink};
use fableworks_queue::{JobQueue, JobRecord};

use crate::rate_limit::RateLimiter;

/// Progress checkpoints the dispatcher itself emits. Providers add
/// their own between these.
const PROGRESS_CLAIMED: u8 = 5;
const PROGRESS_AVAILABLE: u8 = 10;

pub struct JobDispatcher {
    queue: Arc<JobQueue>,
    providers: HashMap<JobKind, Arc<dyn MediaProvider>>,
    settings: WorkerSettings,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter,
    /// Concurrent job slots. Each in-flight job holds one permit.
    slots: Arc<Semaphore>,
    /// The running loop and the token that stops it. Each start gets
    /// a fresh token so a stopped dispatcher can start again.
    run: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

impl JobDispatcher {
    pub fn new(
        queue: Arc<JobQueue>,
        providers: Vec<Arc<dyn MediaProvider>>,
        settings: WorkerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let providers: HashMap<JobKind, Arc<dyn MediaProvider>> = providers
            .into_iter()
            .map(|p| (p.kind(), p))
            .collect();
        let limiter = RateLimiter::new(settings.rate_limit_starts, settings.rate_limit_window);
        let slots = Arc::new(Semaphore::new(settings.concurrency));
        Self {
            queue,
            providers,
            settings,
            clock,
            limiter,
            slots,
            run: Mutex::new(None),
        }
    }

    /// Start the dispatch loop. Idempotent: a second call while the
    /// loop is running is a no-op, and a stopped dispatcher starts
    /// back up. Returns whether a loop was started.
    pub fn start(self: Arc<Self>) -> bool {
        let mut run = self.run.lock().expect("dispatcher handle poisoned");
        if run.as_ref().is_some_and(|(handle, _)| !handle.is_finished()) {
            tracing::debug!("Dispatcher already running, start ignored");
            return false;
        }
        tracing::info!(
            concurrency = self.settings.concurrency,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Worker dispatcher started",
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self).run_loop(cancel.clone()));
        *run = Some((handle, cancel));
        true
    }

    /// Stop polling and wait for in-flight jobs to drain, up to the
    /// configured drain timeout.
    pub async fn stop(&self) {
        let run = self
            .run
            .lock()
            .expect("dispatcher handle poisoned")
            .take();
        if let Some((handle, cancel)) = run {
            cancel.cancel();
            let _ = handle.await;
        }

        let all_slots = self.settings.concurrency as u32;
        match tokio::time::timeout(self.settings.drain_timeout, self.slots.acquire_many(all_slots))
            .await
        {
            Ok(Ok(_permits)) => tracing::info!("Worker dispatcher stopped, all jobs drained"),
            Ok(Err(_)) | Err(_) => tracing::warn!(
                drain_timeout_secs = self.settings.drain_timeout.as_secs(),
                "Worker dispatcher stopped with jobs still in flight",
            ),
        }
    }

    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => Self::dispatch_available(&self).await,
            }
        }
    }

    /// One poll cycle: claim and launch jobs while slots and rate
    /// budget last.
    async fn dispatch_available(this: &Arc<Self>) {
        loop {
            let Ok(permit) = Arc::clone(&this.slots).try_acquire_owned() else {
                return; // every slot busy
            };
            if !this.limiter.would_allow(this.clock.now()) {
                tracing::debug!("Job start rate limit reached, backing off");
                return;
            }

            match this.queue.claim().await {
                Ok(Some(record)) => {
                    this.limiter.record(this.clock.now());
                    tracing::info!(
                        job_id = %record.job.id,
                        kind = %record.job.kind,
                        attempt = record.attempts,
                        "Job claimed",
                    );
                    tokio::spawn(Arc::clone(this).execute(record, permit));
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, "Claim cycle failed");
                    return;
                }
            }
        }
    }

    /// Run one claimed job to settlement. Never propagates: every
    /// exit path writes an outcome into the queue.
    async fn execute(
        self: Arc<Self>,
        record: JobRecord,
        _permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let id = record.job.id;
        let kind = record.job.kind;
        self.report_progress(id, PROGRESS_CLAIMED).await;

        let Some(provider) = self.providers.get(&kind) else {
            tracing::error!(job_id = %id, kind = %kind, "No provider for job kind");
            if let Err(e) = self
                .queue
                .fail_permanent(id, &format!("Unsupported job type: {kind}"))
                .await
            {
                tracing::error!(job_id = %id, error = %e, "Failed to settle unroutable job");
            }
            return;
        };

        if !provider.is_available().await {
            self.settle_failure(id, "Render engine unreachable").await;
            return;
        }
        self.report_progress(id, PROGRESS_AVAILABLE).await;

        let progress = QueueProgress {
            queue: Arc::clone(&self.queue),
            id,
        };
        let outcome = std::panic::AssertUnwindSafe(provider.generate(&record.job.payload, &progress))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(output)) => {
                let result = JobResult::ok(output.output_url, Some(output.metadata));
                if let Err(e) = self.queue.complete(id, result).await {
                    tracing::error!(job_id = %id, error = %e, "Failed to record completion");
                }
            }
            Ok(Err(e)) => {
                self.settle_failure(id, &e.to_string()).await;
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(job_id = %id, panic = %message, "Provider panicked");
                self.settle_failure(id, &format!("Internal error: {message}"))
                    .await;
            }
        }
    }

    async fn settle_failure(&self, id: JobId, error: &str) {
        match self.queue.fail(id, error).await {
            Ok(state) => {
                tracing::warn!(job_id = %id, error, resulting_state = %state, "Job attempt failed")
            }
            Err(e) => tracing::error!(job_id = %id, error = %e, "Failed to record job failure"),
        }
    }

    async fn report_progress(&self, id: JobId, percent: u8) {
        if let Err(e) = self.queue.set_progress(id, percent).await {
            tracing::debug!(job_id = %id, error = %e, "Progress write failed");
        }
    }
}

/// Progress sink that writes through to the job record.
struct QueueProgress {
    queue: Arc<JobQueue>,
    id: JobId,
}

#[async_trait]
impl ProgressSink for QueueProgress {
    async fn report(&self, percent: u8) {
        if let Err(e) = self.queue.set_progress(self.id, percent).await {
            tracing::debug!(job_id = %self.id, error = %e, "Progress write failed");
        }
    }
}
