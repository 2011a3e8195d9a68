//! Cell state transitions and the rules that guard them.

use crate::domain::{AcceptQualifier, Candidate, CellState, CellStatus, ErrorInfo, Selection};
use crate::error::{ReconError, Result};
use crate::id::now_ms;

/// A requested change to one cell
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Accepted into a batch
    Queue,
    /// Lookup dispatched
    Begin,
    /// A match was selected, automatically or by a reviewer
    Accept {
        selection: Selection,
        matches: Vec<Candidate>,
        qualifier: AcceptQualifier,
    },
    /// Candidates found; a reviewer has to choose
    Review { matches: Vec<Candidate> },
    /// Lookup completed with nothing found
    NoMatch,
    Fail(ErrorInfo),
    /// Reviewer declined to reconcile the value
    Skip,
}

impl Transition {
    /// Status the cell ends in after this transition
    pub fn target(&self) -> CellStatus {
        match self {
            Transition::Queue => CellStatus::Queued,
            Transition::Begin => CellStatus::Processing,
            Transition::Accept { .. } => CellStatus::Reconciled,
            Transition::Review { .. } => CellStatus::Pending,
            Transition::NoMatch => CellStatus::NoMatch,
            Transition::Fail(_) => CellStatus::Error,
            Transition::Skip => CellStatus::Skipped,
        }
    }

    /// True when applying this to an already terminal cell changes nothing
    fn repeats(&self, cell: &CellState) -> bool {
        match (self, cell.status) {
            (Transition::Accept { selection, .. }, CellStatus::Reconciled) => {
                cell.selected_match.as_ref() == Some(selection)
                    || (selection.entity_id().is_some()
                        && cell.selected_match.as_ref().and_then(|s| s.entity_id()) == selection.entity_id())
            }
            (Transition::NoMatch, CellStatus::NoMatch) => true,
            (Transition::Skip, CellStatus::Skipped) => true,
            (Transition::Fail(info), CellStatus::Error) => !info.retryable,
            _ => false,
        }
    }
}

fn invalid(cell: &CellState, transition: &Transition, why: &str) -> ReconError {
    ReconError::InvalidTransition(format!(
        "{}: {} -> {} ({})",
        cell.key,
        cell.status,
        transition.target(),
        why
    ))
}

/// Apply a transition in place.
///
/// Returns `Ok(false)` when the transition re-applies the state the cell is
/// already in. The cell is left untouched on error.
pub(crate) fn apply(cell: &mut CellState, transition: Transition) -> Result<bool> {
    if cell.is_terminal() {
        if transition.repeats(cell) {
            return Ok(false);
        }
        return Err(invalid(cell, &transition, "cell is already settled"));
    }

    match transition {
        Transition::Queue => match cell.status {
            CellStatus::Queued => return Ok(false),
            CellStatus::Pending | CellStatus::Error => {
                cell.status = CellStatus::Queued;
            }
            _ => return Err(invalid(cell, &transition, "only idle cells can be queued")),
        },
        Transition::Begin => match cell.status {
            CellStatus::Processing => return Ok(false),
            CellStatus::Queued => {
                cell.status = CellStatus::Processing;
            }
            _ => return Err(invalid(cell, &transition, "cell was not queued")),
        },
        Transition::Accept {
            selection,
            matches,
            qualifier,
        } => {
            if qualifier.auto_accepted {
                if let Some(id) = selection.entity_id() {
                    if matches.first().map(|c| c.id.as_str()) != Some(id) {
                        return Err(ReconError::InvalidTransition(format!(
                            "{}: auto-accepted match {} is not the top candidate",
                            cell.key, id
                        )));
                    }
                }
            }
            cell.status = CellStatus::Reconciled;
            cell.matches = matches;
            cell.selected_match = Some(selection);
            cell.qualifier = Some(qualifier);
            cell.error_info = None;
        }
        Transition::Review { matches } => {
            if matches.is_empty() {
                return Err(ReconError::InvalidTransition(format!(
                    "{}: review requires at least one candidate",
                    cell.key
                )));
            }
            cell.status = CellStatus::Pending;
            cell.matches = matches;
            cell.selected_match = None;
            cell.qualifier = None;
            cell.error_info = None;
        }
        Transition::NoMatch => {
            cell.status = CellStatus::NoMatch;
            cell.matches.clear();
            cell.selected_match = None;
            cell.qualifier = None;
            cell.error_info = None;
        }
        Transition::Fail(info) => {
            cell.status = CellStatus::Error;
            cell.matches.clear();
            cell.selected_match = None;
            cell.qualifier = None;
            cell.error_info = Some(info);
        }
        Transition::Skip => {
            cell.status = CellStatus::Skipped;
            cell.selected_match = None;
            cell.qualifier = None;
            cell.error_info = None;
        }
    }

    cell.updated_at = now_ms();
    Ok(true)
}
