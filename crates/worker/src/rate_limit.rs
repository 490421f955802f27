//! Sliding-window rate limiter for job starts.
//!
//! Bounds how many generations begin per window so a burst of
//! enqueues cannot swamp the render engine. Time comes in from the
//! caller's clock, so the window is testable without sleeping.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub struct RateLimiter {
    max_starts: u32,
    window: Duration,
    starts: Mutex<VecDeque<Duration>>,
}

impl RateLimiter {
    pub fn new(max_starts: u32, window: Duration) -> Self {
        Self {
            max_starts,
            window,
            starts: Mutex::new(VecDeque::new()),
        }
    }

    /// Whether a start at `now` would stay within the window budget.
    /// Does not consume budget; pair with [`Self::record`] once the
    /// start actually happens.
    pub fn would_allow(&self, now: Duration) -> bool {
        let mut starts = self.starts.lock().expect("rate limiter poisoned");
        Self::expire(&mut starts, now, self.window);
        (starts.len() as u32) < self.max_starts
    }

    /// Consume budget for a start at `now`.
    pub fn record(&self, now: Duration) {
        let mut starts = self.starts.lock().expect("rate limiter poisoned");
        Self::expire(&mut starts, now, self.window);
        starts.push_back(now);
    }

    fn expire(starts: &mut VecDeque<Duration>, now: Duration, window: Duration) {
        while let Some(oldest) = starts.front() {
            if now.saturating_sub(*oldest) >= window {
                starts.pop_front();
            } else {
                break;
            }
        }
    }
}
