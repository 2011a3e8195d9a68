//! Constraint-based re-scoring of lookup candidates.
//!
//! Candidates are never invented or dropped here; only their confidence moves.
//! Adjustments are multiplicative on the lookup score and the result is capped
//! at 100, so a violated constraint can depress a strong lexical match but not
//! invert it, and bonuses cannot lift a weak match past the cap.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{Candidate, Datatype, PropertyConstraints, SourceTier, rank};
use crate::error::{ReconError, Result};
use crate::lookup::LookupHit;

/// Penalty when a candidate's declared types miss every expected type
pub const TYPE_MISMATCH_FACTOR: f64 = 0.7;
/// Penalty when the raw value fails a format pattern
pub const FORMAT_FAIL_FACTOR: f64 = 0.8;
/// Bonus when the raw value passes every format pattern
pub const FORMAT_PASS_FACTOR: f64 = 1.1;
/// Bonus for external identifiers found by the structured lookup
pub const EXTERNAL_ID_FACTOR: f64 = 1.2;
/// Bonus for entity references whose id has the expected shape
pub const ENTITY_ID_FACTOR: f64 = 1.1;

/// Scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Final score at or above which a top candidate is auto-accepted.
    pub auto_accept_threshold: f64,
    /// Flat score given to unscored fallback-search hits.
    pub fallback_score: f64,
    /// Shape of a well-formed entity identifier.
    pub entity_id_pattern: String,
    /// Ceiling on the combined adjustment factor.
    pub max_boost: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            auto_accept_threshold: 100.0,
            fallback_score: 80.0,
            entity_id_pattern: r"^Q[1-9][0-9]*$".to_string(),
            max_boost: 1.2,
        }
    }
}

/// Outcome of checking a raw value against a property's format patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCheck {
    /// No applicable pattern
    Unconstrained,
    AllPassed,
    Failed,
}

/// Score fallback for hits without an explicit score: `max(100 - 10*rank, 10)`
pub fn positional_score(rank: usize) -> f64 {
    (100.0 - 10.0 * rank as f64).max(10.0)
}

/// Turn raw hits into candidates with an original score.
///
/// Fallback-search hits get the flat `fallback_score`; unscored primary hits
/// get a positional score.
pub fn normalize(hits: Vec<LookupHit>, tier: SourceTier, fallback_score: f64) -> Vec<Candidate> {
    hits.into_iter()
        .enumerate()
        .map(|(position, hit)| {
            let score = match tier {
                SourceTier::FallbackSearch => fallback_score,
                SourceTier::PrimaryLookup => hit.score.unwrap_or_else(|| positional_score(position)),
            };
            let mut candidate = Candidate::new(hit.id, hit.label, score, tier).with_types(hit.types);
            candidate.description = hit.description;
            candidate
        })
        .collect()
}

/// Re-ranks candidates using property-level constraints
pub struct ConstraintScorer {
    config: ScoringConfig,
    entity_id: Regex,
    patterns: Mutex<HashMap<String, Option<Regex>>>,
}

impl ConstraintScorer {
    pub fn new(config: ScoringConfig) -> Result<Self> {
        let entity_id = Regex::new(&config.entity_id_pattern)
            .map_err(|e| ReconError::Config(format!("invalid entity_id_pattern: {}", e)))?;
        Ok(Self {
            config,
            entity_id,
            patterns: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Check the raw value against every active pattern, anchored to the whole value
    pub fn check_format(&self, constraints: &PropertyConstraints, original_value: &str) -> FormatCheck {
        let value = original_value.trim();
        let Ok(mut cache) = self.patterns.lock() else {
            return FormatCheck::Unconstrained;
        };

        let mut checked = 0;
        for pattern in constraints.active_patterns() {
            let compiled = cache.entry(pattern.pattern.clone()).or_insert_with(|| {
                Regex::new(&format!("^(?:{})$", pattern.pattern))
                    .map_err(|e| log::warn!("Skipping invalid format pattern {:?}: {}", pattern.pattern, e))
                    .ok()
            });
            let Some(regex) = compiled else {
                continue;
            };
            checked += 1;
            if !regex.is_match(value) {
                return FormatCheck::Failed;
            }
        }

        if checked == 0 {
            FormatCheck::Unconstrained
        } else {
            FormatCheck::AllPassed
        }
    }

    /// Combined multiplicative factor for one candidate, capped at `max_boost`
    pub fn factor(&self, candidate: &Candidate, constraints: &PropertyConstraints, original_value: &str) -> f64 {
        let mut factor = 1.0;

        let expected = &constraints.expected_entity_types;
        if !expected.is_empty()
            && !candidate.entity_types.is_empty()
            && candidate.entity_types.is_disjoint(expected)
        {
            factor *= TYPE_MISMATCH_FACTOR;
        }

        match self.check_format(constraints, original_value) {
            FormatCheck::Failed => factor *= FORMAT_FAIL_FACTOR,
            FormatCheck::AllPassed => factor *= FORMAT_PASS_FACTOR,
            FormatCheck::Unconstrained => {}
        }

        match &constraints.datatype {
            Some(Datatype::ExternalId) if candidate.source_tier == SourceTier::PrimaryLookup => {
                factor *= EXTERNAL_ID_FACTOR;
            }
            Some(Datatype::EntityReference) if self.entity_id.is_match(&candidate.id) => {
                factor *= ENTITY_ID_FACTOR;
            }
            _ => {}
        }

        factor.min(self.config.max_boost)
    }

    /// Return an adjusted copy of the candidate. Scores are left unrounded.
    pub fn score(&self, candidate: &Candidate, constraints: &PropertyConstraints, original_value: &str) -> Candidate {
        let factor = self.factor(candidate, constraints, original_value);
        let mut scored = candidate.clone();
        scored.constraint_score = factor;
        scored.score = (candidate.original_score * factor).clamp(0.0, 100.0);
        scored
    }

    /// Score every candidate and sort best first
    pub fn score_all(
        &self,
        candidates: &[Candidate],
        constraints: &PropertyConstraints,
        original_value: &str,
    ) -> Vec<Candidate> {
        let mut scored: Vec<Candidate> = candidates
            .iter()
            .map(|c| self.score(c, constraints, original_value))
            .collect();
        rank(&mut scored);
        scored
    }

    /// Whether a final score clears the auto-accept threshold
    pub fn is_auto_acceptable(&self, candidate: &Candidate) -> bool {
        candidate.score >= self.config.auto_accept_threshold
    }
}

impl std::fmt::Debug for ConstraintScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstraintScorer").field("config", &self.config).finish()
    }
}
