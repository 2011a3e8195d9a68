//! Batch progress events and the final per-batch report.

use serde::Serialize;

use crate::domain::{JobKey, JobOutcome};

use super::BatchMode;

/// One job's classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub key: JobKey,
    pub outcome: JobOutcome,
}

/// Outcome counts for a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub auto_accepted: usize,
    pub matches_available: usize,
    pub no_matches: usize,
    pub errors: usize,
    /// Jobs whose cell was already settled before this batch
    pub settled: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.auto_accepted + self.matches_available + self.no_matches + self.errors + self.settled
    }
}

/// Everything a finished batch produced, in completion order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub mode: BatchMode,
    pub results: Vec<JobResult>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn new(batch_id: impl Into<String>, mode: BatchMode) -> Self {
        Self {
            batch_id: batch_id.into(),
            mode,
            results: Vec::new(),
            summary: BatchSummary::default(),
        }
    }

    pub fn record(&mut self, key: JobKey, outcome: JobOutcome) {
        match &outcome {
            JobOutcome::AutoAccepted { .. } => self.summary.auto_accepted += 1,
            JobOutcome::MatchesAvailable { .. } => self.summary.matches_available += 1,
            JobOutcome::NoMatches => self.summary.no_matches += 1,
            JobOutcome::Error { .. } => self.summary.errors += 1,
            JobOutcome::Settled { .. } => self.summary.settled += 1,
        }
        self.results.push(JobResult { key, outcome });
    }

    pub fn outcome(&self, key: &JobKey) -> Option<&JobOutcome> {
        self.results.iter().find(|r| &r.key == key).map(|r| &r.outcome)
    }
}

/// Progress notifications for a presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    BucketStarted {
        batch_id: String,
        property_id: String,
        index: usize,
        jobs: usize,
    },
    JobCompleted {
        batch_id: String,
        key: JobKey,
        outcome: JobOutcome,
    },
    BatchFinished {
        batch_id: String,
        summary: BatchSummary,
    },
}
