//! Reconciliation store: the single owner of per-cell state.
//!
//! Cells are created `pending` on registration and only move through
//! [`Transition`]s. Each key has a single writer (the job that owns it), so one
//! `RwLock` around the map is all the coordination concurrent windows need.

mod jsonl;
mod transition;

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use crate::domain::{CellState, CellStatus, JobKey};
use crate::error::{ReconError, Result};

pub use transition::Transition;

/// Per-status cell counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub pending: usize,
    /// Pending cells that carry candidates for a reviewer
    pub awaiting_review: usize,
    pub queued: usize,
    pub processing: usize,
    pub reconciled: usize,
    pub auto_accepted: usize,
    pub no_match: usize,
    pub error: usize,
    pub retryable_error: usize,
    pub skipped: usize,
}

impl StoreSummary {
    pub fn total(&self) -> usize {
        self.pending + self.queued + self.processing + self.reconciled + self.no_match + self.error + self.skipped
    }
}

impl fmt::Display for StoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cells: {} reconciled ({} auto), {} awaiting review, {} no-match, {} error ({} retryable), {} skipped, {} pending",
            self.total(),
            self.reconciled,
            self.auto_accepted,
            self.awaiting_review,
            self.no_match,
            self.error,
            self.retryable_error,
            self.skipped,
            self.pending - self.awaiting_review
        )
    }
}

/// In-memory cell store with JSONL snapshots
#[derive(Debug, Default)]
pub struct ReconciliationStore {
    cells: RwLock<HashMap<JobKey, CellState>>,
}

impl ReconciliationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted cells
    pub fn from_cells(cells: impl IntoIterator<Item = CellState>) -> Self {
        let cells = cells.into_iter().map(|c| (c.key.clone(), c)).collect();
        Self {
            cells: RwLock::new(cells),
        }
    }

    /// Register a cell, creating it `pending` if it does not exist yet.
    ///
    /// Returns the cell's current state either way.
    pub fn register(&self, key: &JobKey) -> Result<CellState> {
        let mut cells = self.cells.write().map_err(|e| ReconError::Store(e.to_string()))?;
        let cell = cells
            .entry(key.clone())
            .or_insert_with(|| CellState::pending(key.clone()));
        Ok(cell.clone())
    }

    pub fn get(&self, key: &JobKey) -> Result<CellState> {
        self.find(key)?.ok_or_else(|| ReconError::CellNotFound(key.to_string()))
    }

    pub fn find(&self, key: &JobKey) -> Result<Option<CellState>> {
        let cells = self.cells.read().map_err(|e| ReconError::Store(e.to_string()))?;
        Ok(cells.get(key).cloned())
    }

    /// Apply a transition and return the resulting state.
    ///
    /// Re-applying a terminal state is a no-op, so a restarted batch can
    /// deliver the same outcome twice.
    pub fn transition(&self, key: &JobKey, transition: Transition) -> Result<CellState> {
        let mut cells = self.cells.write().map_err(|e| ReconError::Store(e.to_string()))?;
        let cell = cells
            .get_mut(key)
            .ok_or_else(|| ReconError::CellNotFound(key.to_string()))?;

        let target = transition.target();
        if transition::apply(cell, transition)? {
            log::debug!("{} -> {}", key, target);
        } else {
            log::debug!("{} already {}, transition ignored", key, cell.status);
        }
        Ok(cell.clone())
    }

    /// All cells ordered by key
    pub fn cells(&self) -> Result<Vec<CellState>> {
        let cells = self.cells.read().map_err(|e| ReconError::Store(e.to_string()))?;
        let mut all: Vec<CellState> = cells.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(all)
    }

    pub fn len(&self) -> usize {
        self.cells.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> Result<StoreSummary> {
        let cells = self.cells.read().map_err(|e| ReconError::Store(e.to_string()))?;
        let mut summary = StoreSummary::default();
        for cell in cells.values() {
            match cell.status {
                CellStatus::Pending => {
                    summary.pending += 1;
                    if cell.awaiting_review() {
                        summary.awaiting_review += 1;
                    }
                }
                CellStatus::Queued => summary.queued += 1,
                CellStatus::Processing => summary.processing += 1,
                CellStatus::Reconciled => {
                    summary.reconciled += 1;
                    if cell.is_auto_accepted() {
                        summary.auto_accepted += 1;
                    }
                }
                CellStatus::NoMatch => summary.no_match += 1,
                CellStatus::Error => {
                    summary.error += 1;
                    if cell.is_retryable_error() {
                        summary.retryable_error += 1;
                    }
                }
                CellStatus::Skipped => summary.skipped += 1,
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AcceptQualifier, Candidate, ErrorInfo, Selection, SourceTier};

    fn key(item: &str) -> JobKey {
        JobKey::new(item, "P50", 0)
    }

    #[test]
    fn test_register_creates_pending() {
        let store = ReconciliationStore::new();
        let cell = store.register(&key("r1")).unwrap();
        assert_eq!(cell.status, CellStatus::Pending);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_register_keeps_existing_state() {
        let store = ReconciliationStore::new();
        store.register(&key("r1")).unwrap();
        store.transition(&key("r1"), Transition::NoMatch).unwrap();

        let cell = store.register(&key("r1")).unwrap();
        assert_eq!(cell.status, CellStatus::NoMatch);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_unknown_key() {
        let store = ReconciliationStore::new();
        let err = store.get(&key("missing")).unwrap_err();
        assert!(matches!(err, ReconError::CellNotFound(_)));
        assert!(store.find(&key("missing")).unwrap().is_none());
    }

    #[test]
    fn test_transition_unknown_key() {
        let store = ReconciliationStore::new();
        assert!(store.transition(&key("missing"), Transition::Queue).is_err());
    }

    #[test]
    fn test_no_match_distinct_from_pending() {
        let store = ReconciliationStore::new();
        store.register(&key("r1")).unwrap();
        store.register(&key("r2")).unwrap();
        store.transition(&key("r1"), Transition::NoMatch).unwrap();

        let done = store.get(&key("r1")).unwrap();
        let untouched = store.get(&key("r2")).unwrap();
        assert!(done.matches.is_empty());
        assert!(untouched.matches.is_empty());
        assert_ne!(done.status, untouched.status);
    }

    #[test]
    fn test_idempotent_terminal_transition() {
        let store = ReconciliationStore::new();
        store.register(&key("r1")).unwrap();
        let c = Candidate::new("E1", "Jane", 100.0, SourceTier::PrimaryLookup);
        let accept = Transition::Accept {
            selection: Selection::Entity(c.clone()),
            matches: vec![c],
            qualifier: AcceptQualifier::automatic("100% confidence match"),
        };
        store.transition(&key("r1"), accept.clone()).unwrap();
        let again = store.transition(&key("r1"), accept).unwrap();
        assert_eq!(again.status, CellStatus::Reconciled);
    }

    #[test]
    fn test_cells_sorted_by_key() {
        let store = ReconciliationStore::new();
        store.register(&key("b")).unwrap();
        store.register(&key("a")).unwrap();
        let items: Vec<String> = store.cells().unwrap().into_iter().map(|c| c.key.item_id).collect();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[test]
    fn test_summary_counts() {
        let store = ReconciliationStore::new();
        for item in ["a", "b", "c", "d", "e"] {
            store.register(&key(item)).unwrap();
        }
        store.transition(&key("a"), Transition::NoMatch).unwrap();
        store
            .transition(&key("b"), Transition::Fail(ErrorInfo::new("timeout", true)))
            .unwrap();
        store
            .transition(&key("c"), Transition::Review {
                matches: vec![Candidate::new("E1", "Jane", 60.0, SourceTier::PrimaryLookup)],
            })
            .unwrap();
        store.transition(&key("d"), Transition::Skip).unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.no_match, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.retryable_error, 1);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.awaiting_review, 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.to_string().starts_with("5 cells"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReconciliationStore>();
    }
}
