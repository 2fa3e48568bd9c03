//! Exponential backoff for admission-control rejections.
//!
//! One policy is shared by every network retry in the engine: page
//! scans, batch resubmissions, single puts. Delay for the n-th
//! consecutive retry is `base_delay * 2^n`. By default there is no retry
//! ceiling and no delay cap; both can be configured.

use std::time::Duration;

use crate::error::{DynoError, Result};
use crate::progress::ProgressSink;

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry (default: 1s).
    pub base_delay: Duration,
    /// Consecutive retries allowed before giving up (default: unlimited).
    pub max_retries: Option<u32>,
    /// Upper bound for a single delay (default: uncapped).
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_retries: None,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Blocking wait between attempts. Swappable so tests can observe delays.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Consecutive-retry state for one driver.
///
/// `reset` after every success; `wait` before every retry.
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    sleeper: &'a dyn Sleeper,
    consecutive: u32,
    total: u64,
}

impl<'a> Backoff<'a> {
    pub fn new(policy: &'a RetryPolicy, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            policy,
            sleeper,
            consecutive: 0,
            total: 0,
        }
    }

    /// Sleep before the next retry, or fail once the ceiling is reached.
    pub fn wait(&mut self, operation: &str) -> Result<Duration> {
        let delay = self.policy.delay_for(self.consecutive);
        if let Some(max) = self.policy.max_retries {
            if self.consecutive >= max {
                return Err(DynoError::RetryLimitExceeded {
                    operation: operation.to_string(),
                    attempts: self.consecutive,
                    last_delay: self.policy.delay_for(self.consecutive.saturating_sub(1)),
                });
            }
        }
        self.sleeper.sleep(delay);
        self.consecutive += 1;
        self.total += 1;
        Ok(delay)
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Retries performed over the lifetime of this backoff.
    pub fn total_retries(&self) -> u64 {
        self.total
    }
}

/// Run `attempt` until it succeeds or fails with a non-retryable error.
///
/// Throttling errors are absorbed with backoff; anything else propagates
/// immediately.
pub fn with_retry<T>(
    backoff: &mut Backoff<'_>,
    operation: &str,
    progress: &dyn ProgressSink,
    mut attempt: impl FnMut() -> Result<T>,
) -> Result<T> {
    loop {
        match attempt() {
            Ok(value) => {
                backoff.reset();
                return Ok(value);
            }
            Err(err) if err.is_retryable() => {
                let retry = backoff.consecutive();
                tracing::warn!(operation, retry, error = %err, "throttled, backing off");
                let delay = backoff.wait(operation)?;
                progress.on_retry(retry + 1, delay);
            }
            Err(err) => return Err(err),
        }
    }
}
