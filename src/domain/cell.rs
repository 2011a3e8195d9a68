//! Per-cell reconciliation state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::candidate::Candidate;
use super::job::JobKey;
use super::temporal::TemporalValue;
use crate::id::now_ms;

/// Status of a cell's reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CellStatus {
    /// Registered, not yet reconciled (or awaiting review when matches exist)
    Pending,
    /// Accepted into a batch
    Queued,
    /// Lookup in flight
    Processing,
    /// A match has been selected
    Reconciled,
    /// Lookup completed and found nothing
    NoMatch,
    /// Reconciliation failed; see `ErrorInfo::retryable`
    Error,
    /// Reviewer chose not to reconcile this value
    Skipped,
}

impl CellStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellStatus::Pending => "pending",
            CellStatus::Queued => "queued",
            CellStatus::Processing => "processing",
            CellStatus::Reconciled => "reconciled",
            CellStatus::NoMatch => "no-match",
            CellStatus::Error => "error",
            CellStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a cell ended in `error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retryable: bool,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
            retryable,
        }
    }
}

/// How a selection came about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptQualifier {
    pub auto_accepted: bool,
    pub reason: String,
}

impl AcceptQualifier {
    pub fn automatic(reason: impl Into<String>) -> Self {
        Self {
            auto_accepted: true,
            reason: reason.into(),
        }
    }

    pub fn manual() -> Self {
        Self {
            auto_accepted: false,
            reason: "selected by reviewer".to_string(),
        }
    }
}

/// The value a reconciled cell resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Selection {
    Entity(Candidate),
    Date(TemporalValue),
}

impl Selection {
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Selection::Entity(c) => Some(&c.id),
            Selection::Date(_) => None,
        }
    }
}

/// Persisted outcome for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    pub key: JobKey,
    pub status: CellStatus,
    #[serde(default)]
    pub matches: Vec<Candidate>,
    #[serde(default)]
    pub selected_match: Option<Selection>,
    #[serde(default)]
    pub qualifier: Option<AcceptQualifier>,
    #[serde(default)]
    pub error_info: Option<ErrorInfo>,
    pub updated_at: u64,
}

impl CellState {
    pub fn pending(key: JobKey) -> Self {
        Self {
            key,
            status: CellStatus::Pending,
            matches: Vec::new(),
            selected_match: None,
            qualifier: None,
            error_info: None,
            updated_at: now_ms(),
        }
    }

    /// Returns true once the cell can no longer change through batch work
    pub fn is_terminal(&self) -> bool {
        match self.status {
            CellStatus::Reconciled | CellStatus::NoMatch | CellStatus::Skipped => true,
            CellStatus::Error => !self.is_retryable_error(),
            _ => false,
        }
    }

    pub fn is_retryable_error(&self) -> bool {
        self.status == CellStatus::Error && self.error_info.as_ref().is_some_and(|e| e.retryable)
    }

    /// Pending with candidates: a reviewer has to pick one
    pub fn awaiting_review(&self) -> bool {
        self.status == CellStatus::Pending && !self.matches.is_empty()
    }

    pub fn is_auto_accepted(&self) -> bool {
        self.status == CellStatus::Reconciled && self.qualifier.as_ref().is_some_and(|q| q.auto_accepted)
    }

    /// Best candidate score, shown as a hint while awaiting review
    pub fn top_score(&self) -> Option<f64> {
        self.matches.first().map(|c| c.score)
    }
}
