//! Core lookup client types and trait definitions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::EntityType;
use crate::id::generate_query_key;

/// One lookup against a single endpoint. Each call is independent.
#[async_trait]
pub trait LookupClient: Send + Sync {
    /// Stable identifier used for circuit breaking and logging
    fn endpoint(&self) -> &str;

    /// Run one query and return ranked hits
    async fn lookup(&self, query: &LookupQuery) -> Result<Vec<LookupHit>, LookupError>;
}

/// An auxiliary property/value pair that disambiguates a lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHint {
    pub property_id: String,
    pub value: String,
}

impl ContextHint {
    pub fn new(property_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property_id: property_id.into(),
            value: value.into(),
        }
    }
}

/// A structured query: text plus type and property filters
#[derive(Debug, Clone, PartialEq)]
pub struct LookupQuery {
    /// Opaque key the query is filed under on the wire
    pub key: String,
    pub text: String,
    pub type_filter: Vec<EntityType>,
    pub property_filter: Vec<ContextHint>,
    pub limit: usize,
}

impl LookupQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            key: generate_query_key(),
            text: text.into(),
            type_filter: Vec::new(),
            property_filter: Vec::new(),
            limit: 10,
        }
    }

    pub fn with_types(mut self, types: Vec<EntityType>) -> Self {
        self.type_filter = types;
        self
    }

    pub fn with_context(mut self, hints: Vec<ContextHint>) -> Self {
        self.property_filter = hints;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// A raw hit as returned by a lookup endpoint, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct LookupHit {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    /// Absent for endpoints that do not score (free-text search)
    pub score: Option<f64>,
    pub types: Vec<String>,
}

impl LookupHit {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            score: None,
            types: Vec::new(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }
}

/// Failure categories for lookup calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LookupErrorKind {
    /// Request timed out
    Timeout,
    /// Connection reset, DNS failure and similar transport faults
    Network,
    /// Explicit throttling signal from the endpoint
    RateLimited,
    /// 5xx-equivalent
    Server,
    /// Malformed query or other non-throttling 4xx
    Permanent,
    /// Body could not be decoded
    InvalidResponse,
    /// Raised locally while the endpoint's circuit is open
    CircuitOpen,
}

impl LookupErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupErrorKind::Timeout => "timeout",
            LookupErrorKind::Network => "network error",
            LookupErrorKind::RateLimited => "rate limited",
            LookupErrorKind::Server => "server error",
            LookupErrorKind::Permanent => "permanent request error",
            LookupErrorKind::InvalidResponse => "invalid response",
            LookupErrorKind::CircuitOpen => "temporarily disabled (circuit open)",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LookupErrorKind::Timeout => true,
            LookupErrorKind::Network => true,
            LookupErrorKind::RateLimited => true,
            LookupErrorKind::Server => true,
            LookupErrorKind::CircuitOpen => true,
            LookupErrorKind::Permanent => false,
            LookupErrorKind::InvalidResponse => false,
        }
    }

    /// Whether this failure says something about the endpoint's health
    pub fn counts_against_circuit(&self) -> bool {
        !matches!(self, LookupErrorKind::Permanent | LookupErrorKind::CircuitOpen)
    }
}

impl fmt::Display for LookupErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during a lookup call
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} from {endpoint}: {message}")]
pub struct LookupError {
    pub kind: LookupErrorKind,
    pub endpoint: String,
    pub message: String,
}

impl LookupError {
    pub fn new(kind: LookupErrorKind, endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn circuit_open(endpoint: impl Into<String>) -> Self {
        Self::new(LookupErrorKind::CircuitOpen, endpoint, "skipped while cooling down")
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind == LookupErrorKind::RateLimited
    }
}
