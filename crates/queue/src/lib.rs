//! Durable, priority-ordered, retry-capable job queue.
//!
//! [`store`] defines the persistence seam ([`store::JobStore`]) and
//! the in-memory reference implementation; [`queue`] layers the job
//! lifecycle on top: enqueue with idempotency reuse, claim for
//! dispatch, completion and failure with bounded retries, pre-dispatch
//! cancellation, and retention pruning.

pub mod error;
pub mod queue;
pub mod record;
pub mod store;

pub use error::QueueError;
pub use queue::{JobQueue, NewJob, RetryPolicy, MAX_ATTEMPTS};
pub use record::{JobRecord, JobStatus, QueueCounts};
pub use store::{JobStore, MemoryStore, RetentionPolicy};
