//! Retry strategies for transient server failures
//!
//! When a watcher's `Next` call fails with a retriable error (an upgrade in
//! progress, contention on the controller), the strategy decides how long to
//! wait before asking again, or whether to give up.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: doubling delays up to a cap, optional jitter
//! - **FixedDelay**: the same delay every time
//! - **NoRetry**: give up immediately (the watcher default)
//!
//! # Examples
//!
//! ```rust
//! use modelwire_client::{ExponentialBackoff, RetryStrategy};
//! use std::time::Duration;
//!
//! let mut strategy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(5))
//!     .with_max_attempts(3);
//!
//! assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(100)));
//! assert_eq!(strategy.next_delay(1), Some(Duration::from_millis(200)));
//! assert_eq!(strategy.next_delay(3), None);
//! ```

use std::time::Duration;

/// Decides the delay before retry number `attempt` (counting from zero)
pub trait RetryStrategy: Send + Sync {
    /// Delay before the next attempt, or `None` to give up
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Called after a successful attempt
    fn reset(&mut self);
}

fn exhausted(max_attempts: Option<u32>, attempt: u32) -> bool {
    matches!(max_attempts, Some(max) if attempt >= max)
}

/// Exponentially growing delays: `min_delay * 2^attempt`, capped at `max_delay`
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% random extra delay to spread out simultaneous retries
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(30))
            .with_max_attempts(8)
            .with_jitter()
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if exhausted(self.max_attempts, attempt) {
            return None;
        }

        let min_ms = self.min_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = min_ms.saturating_mul(factor).min(max_ms);

        let jitter = if self.jitter && delay >= 4 {
            use rand::Rng;
            rand::thread_rng().gen_range(0..=delay / 4)
        } else {
            0
        };

        Some(Duration::from_millis(delay + jitter))
    }

    fn reset(&mut self) {}
}

/// The same delay before every attempt
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if exhausted(self.max_attempts, attempt) {
            None
        } else {
            Some(self.delay)
        }
    }

    fn reset(&mut self) {}
}

/// Never retry
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}
