//! Retry policy for establishing the upstream leg.
//!
//! Plain exponential backoff: `base_delay * 2^attempt`, a fixed attempt
//! budget, no jitter. Computing a delay has no side effects; sleeping is the
//! dialer's job.

use std::time::Duration;

/// Default number of dial attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between dial attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Retry budget and backoff schedule for one dial sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of dial attempts.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with an explicit budget and base delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to wait after the zero-based `attempt` fails.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}
