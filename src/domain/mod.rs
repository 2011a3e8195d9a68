//! Domain types for reconcilr
//!
//! This module contains the core data model:
//! - ReconciliationJob / JobKey: one value awaiting reconciliation and its cell
//! - Candidate: a proposed match, with pre- and post-constraint scores
//! - PropertyConstraints: type, format and datatype expectations for a property
//! - CellState: the persisted outcome for one job
//! - JobOutcome: the classification produced for every completed job
//! - temporal: deterministic date parsing with precision detection

pub mod candidate;
pub mod cell;
pub mod constraints;
pub mod job;
pub mod outcome;
pub mod temporal;

pub use candidate::{Candidate, EntityType, SourceTier, rank};
pub use cell::{AcceptQualifier, CellState, CellStatus, ErrorInfo, Selection};
pub use constraints::{Datatype, FormatPattern, PropertyConstraints};
pub use job::{JobKey, ReconciliationJob};
pub use outcome::{FULL_CONFIDENCE_REASON, JobOutcome, TEMPORAL_REASON};
pub use temporal::{Precision, TemporalValue};
