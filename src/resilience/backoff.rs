//! Retry budgets with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry budget for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay before the first retry (milliseconds).
    pub base_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay (milliseconds).
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::primary()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_jitter_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_jitter_ms,
        }
    }

    /// Structured lookup budget: 3 attempts, 1s base.
    pub fn primary() -> Self {
        Self::new(3, 1000, 1000)
    }

    /// Free-text search budget: 2 attempts, 0.5s base.
    pub fn fallback() -> Self {
        Self::new(2, 500, 500)
    }

    /// Delay before retry number `retry` (0-based), without jitter.
    ///
    /// `base * 2^retry`, with the exponent capped at 10.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u64.pow(retry.min(10));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Delay before retry number `retry` (0-based), with jitter.
    pub fn delay(&self, retry: u32) -> Duration {
        let jitter = if self.max_jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..self.max_jitter_ms)
        };
        self.base_delay(retry) + Duration::from_millis(jitter)
    }

    pub fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}
