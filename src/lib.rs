//! Reconcilr - match raw field values against a knowledge base
//!
//! Reconcilr resolves textual values to ranked, confidence-scored entity
//! candidates. Lookups go through a retrying scheduler with circuit breaking
//! and a free-text fallback, candidates are re-scored against property
//! constraints, and batches fan out in paced, fixed-size windows with every
//! outcome recorded per cell.

pub mod batch;
pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod lookup;
pub mod resilience;
pub mod scoring;
pub mod store;

pub use error::{ReconError, Result};
