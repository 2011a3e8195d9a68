//! Error types for reconcilr
//!
//! Centralized error handling using thiserror. Network failures have their own
//! type in `lookup::client`; they never surface here because the scheduler
//! degrades them into empty results.

use thiserror::Error;

/// All error types that can occur in reconcilr
#[derive(Debug, Error)]
pub enum ReconError {
    /// No cell registered under the given key
    #[error("Cell not found: {0}")]
    CellNotFound(String),

    /// State transition rejected by the store
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Store/persistence error
    #[error("Store error: {0}")]
    Store(String),

    /// Lookup client construction or transport setup error
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// Interactive reconciliation was cancelled before completion
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for reconcilr operations
pub type Result<T> = std::result::Result<T, ReconError>;
