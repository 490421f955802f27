//! Worker process: claims jobs from the queue and drives the
//! provider adapters.
//!
//! [`dispatcher::JobDispatcher`] is the process-wide service object;
//! [`rate_limit`] bounds how fast it starts engine work.

pub mod dispatcher;
pub mod rate_limit;

pub use dispatcher::JobDispatcher;
pub use rate_limit::RateLimiter;
