//! Delays between buckets and between windows.
//!
//! Two signals, kept independent: a delay that grows with the bucket index,
//! and a per-window delay that doubles while the current bucket is unhealthy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::JobOutcome;

/// Pacing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Delay before the second bucket, before stepping (milliseconds).
    pub bucket_delay_base_ms: u64,
    /// Added per bucket index (milliseconds).
    pub bucket_delay_step_ms: u64,
    /// Ceiling for the inter-bucket delay (milliseconds).
    pub bucket_delay_max_ms: u64,
    /// Delay between windows of a healthy bucket (milliseconds).
    pub window_delay_ms: u64,
    /// Delay between windows once the error rate is too high (milliseconds).
    pub unhealthy_window_delay_ms: u64,
    /// Error rate above which a bucket counts as unhealthy.
    pub unhealthy_error_rate: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            bucket_delay_base_ms: 500,
            bucket_delay_step_ms: 100,
            bucket_delay_max_ms: 2000,
            window_delay_ms: 100,
            unhealthy_window_delay_ms: 200,
            unhealthy_error_rate: 0.5,
        }
    }
}

/// Running outcome counts for the bucket being processed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketStats {
    pub successes: usize,
    pub no_matches: usize,
    pub errors: usize,
}

impl BucketStats {
    pub fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::AutoAccepted { .. } | JobOutcome::MatchesAvailable { .. } => self.successes += 1,
            JobOutcome::NoMatches => self.no_matches += 1,
            JobOutcome::Error { .. } => self.errors += 1,
            JobOutcome::Settled { .. } => {}
        }
    }

    pub fn total(&self) -> usize {
        self.successes + self.no_matches + self.errors
    }

    /// errors / (errors + successes + no-matches); zero before any outcome
    pub fn error_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.errors as f64 / total as f64,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PacingPolicy {
    config: PacingConfig,
}

impl PacingPolicy {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Delay before bucket `index`; the first bucket starts immediately
    pub fn bucket_delay(&self, index: usize) -> Duration {
        if index == 0 {
            return Duration::ZERO;
        }
        let ms = self
            .config
            .bucket_delay_base_ms
            .saturating_add(self.config.bucket_delay_step_ms.saturating_mul(index as u64))
            .min(self.config.bucket_delay_max_ms);
        Duration::from_millis(ms)
    }

    pub fn is_unhealthy(&self, stats: &BucketStats) -> bool {
        stats.error_rate() > self.config.unhealthy_error_rate
    }

    /// Delay before the next window of the current bucket
    pub fn window_delay(&self, stats: &BucketStats) -> Duration {
        if self.is_unhealthy(stats) {
            Duration::from_millis(self.config.unhealthy_window_delay_ms)
        } else {
            Duration::from_millis(self.config.window_delay_ms)
        }
    }
}
