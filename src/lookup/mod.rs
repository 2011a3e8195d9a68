//! Lookup Client Layer - calls to external knowledge-base endpoints
//!
//! This module provides:
//! - LookupClient trait for endpoint abstraction
//! - Query, hit and error types with explicit failure categories
//! - HTTP clients for the structured reconciliation service and free-text search
//! - A scripted client for tests

pub mod client;
pub mod http;
pub mod mock;

pub use client::{ContextHint, LookupClient, LookupError, LookupErrorKind, LookupHit, LookupQuery};
pub use http::{DEFAULT_RECON_URL, DEFAULT_SEARCH_URL, EntitySearchClient, HttpLookupConfig, ReconServiceClient};
pub use mock::{Reply, ScriptedLookupClient};
