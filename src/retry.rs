//! Bounded retry with exponential back-off.

use std::thread;
use std::time::{Duration, Instant};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Upper bound for a single delay.
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,

    /// Total time after which no further attempt is started.
    pub max_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_wait: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self {
            max_wait,
            ..Self::default()
        }
    }

    /// Delay after the given attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis(base.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Why retrying stopped without success.
#[derive(Debug)]
pub struct RetryTimeout<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Runs `operation` until it succeeds or `config.max_wait` has elapsed.
///
/// The operation runs at least once. Sleeps never extend past the deadline.
pub fn retry_with_backoff<T, E, F>(config: &RetryConfig, mut operation: F) -> Result<T, RetryTimeout<E>>
where
    F: FnMut() -> Result<T, E>,
{
    let deadline = Instant::now() + config.max_wait;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(RetryTimeout {
                attempts: attempt,
                last_error: error,
            });
        }

        let delay = config.delay_for_attempt(attempt).min(deadline - now);
        thread::sleep(delay);
    }
}
