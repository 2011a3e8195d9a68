//! Job completion outcome types.
//!
//! Every job fed through the engine ends with exactly one of these.

use serde::{Deserialize, Serialize};

use super::candidate::Candidate;
use super::cell::{CellState, CellStatus, Selection};

/// Reason attached to entity auto-acceptance
pub const FULL_CONFIDENCE_REASON: &str = "100% confidence match";

/// Reason attached to deterministic temporal resolution
pub const TEMPORAL_REASON: &str = "temporal value resolved without lookup";

/// Outcome of reconciling one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum JobOutcome {
    /// Confidence was high enough to select a match without review
    AutoAccepted { selection: Selection, reason: String },
    /// Candidates exist but a reviewer must choose
    MatchesAvailable { candidates: Vec<Candidate>, best: Candidate },
    /// Lookup completed cleanly with nothing found
    NoMatches,
    /// Reconciliation could not be attempted
    Error { message: String, retryable: bool },
    /// Cell was already settled by an earlier run or a reviewer
    Settled { status: CellStatus },
}

impl JobOutcome {
    pub fn is_auto_accepted(&self) -> bool {
        matches!(self, JobOutcome::AutoAccepted { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::AutoAccepted { .. } => "auto-accepted",
            JobOutcome::MatchesAvailable { .. } => "matches-available",
            JobOutcome::NoMatches => "no-matches",
            JobOutcome::Error { .. } => "error",
            JobOutcome::Settled { .. } => "settled",
        }
    }

    /// Rebuild the outcome of a terminal cell, for jobs that need no new work
    pub fn from_terminal_cell(cell: &CellState) -> Option<Self> {
        if !cell.is_terminal() {
            return None;
        }
        let outcome = match cell.status {
            CellStatus::Reconciled if cell.is_auto_accepted() => match (&cell.selected_match, &cell.qualifier) {
                (Some(selection), Some(q)) => JobOutcome::AutoAccepted {
                    selection: selection.clone(),
                    reason: q.reason.clone(),
                },
                _ => JobOutcome::Settled { status: cell.status },
            },
            CellStatus::NoMatch => JobOutcome::NoMatches,
            CellStatus::Error => match &cell.error_info {
                Some(info) => JobOutcome::Error {
                    message: info.message.clone(),
                    retryable: info.retryable,
                },
                None => JobOutcome::Settled { status: cell.status },
            },
            status => JobOutcome::Settled { status },
        };
        Some(outcome)
    }
}
