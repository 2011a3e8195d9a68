//! Candidate matches proposed by lookup services

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which lookup tier produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTier {
    /// Structured reconciliation query against the primary service
    PrimaryLookup,
    /// Free-text search against the secondary service
    FallbackSearch,
}

impl SourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::PrimaryLookup => "primary-lookup",
            SourceTier::FallbackSearch => "fallback-search",
        }
    }
}

/// An entity type used to narrow lookups (e.g. "human")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityType {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityType {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), name: None }
    }

    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

/// One proposed match for a job.
///
/// Produced fresh per job. After scoring a candidate is only ever re-sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Final score, 0-100
    pub score: f64,
    /// Score before constraint adjustment
    pub original_score: f64,
    /// Multiplicative constraint factor applied to `original_score`
    pub constraint_score: f64,
    #[serde(default)]
    pub entity_types: BTreeSet<String>,
    pub source_tier: SourceTier,
}

impl Candidate {
    /// A candidate whose final score equals its lookup score
    pub fn new(id: impl Into<String>, label: impl Into<String>, score: f64, source_tier: SourceTier) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            score,
            original_score: score,
            constraint_score: 1.0,
            entity_types: BTreeSet::new(),
            source_tier,
        }
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
        self.entity_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_primary(&self) -> bool {
        self.source_tier == SourceTier::PrimaryLookup
    }
}

/// Sort candidates by final score, best first. Ties keep lookup order.
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}
