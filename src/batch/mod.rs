//! Batch reconciliation.
//!
//! This module provides:
//! - **partition**: temporal jobs vs. per-property lookup buckets
//! - **pacing**: inter-bucket and inter-window delays
//! - **classify**: retryability of caller-side context errors
//! - **context**: the provider of constraints and lookup hints per job
//! - **BatchCoordinator**: windowed fan-out, classification and store updates,
//!   plus the interactive single-value path

pub mod classify;
pub mod context;
pub mod coordinator;
pub mod pacing;
pub mod partition;
pub mod report;

use serde::{Deserialize, Serialize};

pub use classify::{ErrorClassifier, RETRYABLE_VOCABULARY, VocabularyClassifier, message_is_retryable};
pub use context::{ContextError, JobContextProvider, LookupHints, PropertyProfile, StaticContextProvider};
pub use coordinator::BatchCoordinator;
pub use pacing::{BucketStats, PacingConfig, PacingPolicy};
pub use partition::{Partition, PropertyBucket, TemporalJob, partition};
pub use report::{BatchEvent, BatchReport, BatchSummary, JobResult};

/// How a batch was started; decides the window size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchMode {
    /// Whole dataset, auto-accepting confident matches
    AutoAccept,
    /// One column reconciled on request
    Column,
}

impl BatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchMode::AutoAccept => "auto-accept",
            BatchMode::Column => "column",
        }
    }
}

/// Batch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Concurrent lookups per window in auto-accept mode.
    pub auto_accept_window: usize,
    /// Concurrent lookups per window in column mode.
    pub column_window: usize,
    #[serde(flatten)]
    pub pacing: PacingConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            auto_accept_window: 3,
            column_window: 5,
            pacing: PacingConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn window_size(&self, mode: BatchMode) -> usize {
        match mode {
            BatchMode::AutoAccept => self.auto_accept_window,
            BatchMode::Column => self.column_window,
        }
    }
}
