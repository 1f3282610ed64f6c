use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Blocking delay, injectable so backoff and rate limiting can be tested
/// without wall-clock waits.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Bounded retry with linear backoff: the wait after attempt `n` is `backoff * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Delay to wait after the 1-based `attempt` failed, or `None` when no
    /// attempts remain.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(self.backoff * attempt)
    }
}

/// Enforces a minimum spacing between dispatched requests.
///
/// Clones share the same slot, so every worker holding a clone draws from
/// one global budget.
#[derive(Clone)]
pub struct RateLimiter {
    interval: Duration,
    last: Arc<Mutex<Option<Instant>>>,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self::with_sleeper(interval, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(interval: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            interval,
            last: Arc::new(Mutex::new(None)),
            sleeper,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Blocks until the caller may dispatch its request.
    ///
    /// The lock is held while waiting so concurrent callers queue up behind
    /// each other instead of all waking at once.
    pub fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                self.sleeper.sleep(self.interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}
