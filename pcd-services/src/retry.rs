use std::{
    fmt::Display,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

/// The last error of a retried operation.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: E,
    /// `false` when the operation stopped on a non-transient error.
    pub exhausted: bool,
    /// The caller cancelled while waiting to retry.
    pub cancelled: bool,
}

// Backoff sleeps are split so cancellation is noticed promptly.
const CANCEL_POLL: Duration = Duration::from_millis(50);

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, the
    /// attempt budget is spent, or `is_cancelled` turns true between attempts.
    pub fn run<T, E: Display>(
        &self,
        mut op: impl FnMut() -> Result<T, E>,
        is_transient: impl Fn(&E) -> bool,
        is_cancelled: impl Fn() -> bool,
    ) -> Result<T, RetryFailure<E>> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match op() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            let failure = |error: E, exhausted: bool, cancelled: bool| RetryFailure {
                attempts: attempt,
                error,
                exhausted,
                cancelled,
            };
            if !is_transient(&error) {
                return Err(failure(error, false, false));
            }
            if attempt >= max_attempts {
                return Err(failure(error, true, false));
            }
            let delay = self.delay(attempt);
            log::warn!("Attempt {attempt}/{max_attempts} failed: {error}; retrying in {delay:?}");
            if !sleep_unless_cancelled(delay, &is_cancelled) {
                log::warn!("Retry cancelled after attempt {attempt}");
                return Err(failure(error, false, true));
            }
            attempt += 1;
        }
    }
}

/// Sleeps for `delay`; returns `false` as soon as `is_cancelled` is true.
fn sleep_unless_cancelled(delay: Duration, is_cancelled: &impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(CANCEL_POLL.min(deadline - now));
    }
}
