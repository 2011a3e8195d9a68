//! Resilience layer around lookup endpoints.
//!
//! This module provides:
//! - **CircuitGuard**: per-endpoint consecutive-failure tracking with a global,
//!   time-based reset after the cool-down
//! - **RetryPolicy**: attempt budgets with exponential backoff and jitter
//! - **RetryingScheduler**: primary lookup, then fallback search, then an
//!   explicit degraded result

pub mod backoff;
pub mod circuit;
pub mod scheduler;

pub use backoff::RetryPolicy;
pub use circuit::{CircuitConfig, CircuitGuard, CircuitState, Clock, ManualClock, SystemClock};
pub use scheduler::{Resolution, RetryingScheduler, SchedulerConfig};
