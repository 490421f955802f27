//! Injectable clock so time-driven logic (poll deadlines, rate
//! windows) is deterministic under test.
//!
//! Production code uses [`SystemClock`]; tests use [`ManualClock`],
//! whose `sleep` advances fake time instantly instead of touching the
//! wall clock.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Monotonic time source with a cooperative sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic elapsed time since this clock was created.
    fn now(&self) -> Duration;

    /// Yield for `duration`. Must suspend cooperatively (never spin)
    /// so concurrent tasks are not starved.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by `tokio::time`.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Test clock: `sleep` advances fake time immediately.
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Duration::ZERO),
        }
    }

    /// Advance fake time without sleeping.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Still yield so other tasks interleave as they would in
        // production.
        tokio::task::yield_now().await;
    }
}
