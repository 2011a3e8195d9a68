//! Per-job context supplied by the caller: property constraints and lookup hints.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{EntityType, PropertyConstraints, ReconciliationJob};
use crate::error::Result;
use crate::lookup::{ContextHint, LookupErrorKind};

/// Hints that narrow a lookup for one job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupHints {
    pub type_hints: Vec<EntityType>,
    pub context_hints: Vec<ContextHint>,
}

/// Raised while building a job's context.
///
/// A transport-backed provider can set `kind` directly; otherwise the
/// message is classified against the retryable vocabulary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ContextError {
    pub message: String,
    pub kind: Option<LookupErrorKind>,
}

impl ContextError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: LookupErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Source of constraints and hints for jobs
#[async_trait]
pub trait JobContextProvider: Send + Sync {
    /// Constraints for a property; unconstrained when unknown
    fn constraints(&self, property_id: &str) -> PropertyConstraints;

    /// Type and context hints for one job
    async fn hints(&self, job: &ReconciliationJob) -> std::result::Result<LookupHints, ContextError>;
}

/// Everything known about one property
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyProfile {
    pub constraints: PropertyConstraints,
    #[serde(flatten)]
    pub hints: LookupHints,
}

/// Context provider backed by a fixed map of property profiles.
///
/// Profiles load from a JSON object keyed by property id:
///
/// ```json
/// { "P50": { "constraints": { "expected_entity_types": ["Q5"] },
///            "type_hints": [{ "id": "Q5" }] } }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    profiles: HashMap<String, PropertyProfile>,
    strict: bool,
}

impl StaticContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let profiles: HashMap<String, PropertyProfile> = serde_json::from_str(json)?;
        Ok(Self {
            profiles,
            strict: false,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let provider = Self::from_json(&content)?;
        log::info!(
            "Loaded {} property profiles from {}",
            provider.profiles.len(),
            path.as_ref().display()
        );
        Ok(provider)
    }

    pub fn with_profile(mut self, property_id: impl Into<String>, profile: PropertyProfile) -> Self {
        self.profiles.insert(property_id.into(), profile);
        self
    }

    /// Fail jobs whose property has no profile instead of looking them up bare
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn profile(&self, property_id: &str) -> Option<&PropertyProfile> {
        self.profiles.get(property_id)
    }
}

#[async_trait]
impl JobContextProvider for StaticContextProvider {
    fn constraints(&self, property_id: &str) -> PropertyConstraints {
        self.profiles
            .get(property_id)
            .map(|p| p.constraints.clone())
            .unwrap_or_default()
    }

    async fn hints(&self, job: &ReconciliationJob) -> std::result::Result<LookupHints, ContextError> {
        match self.profiles.get(&job.property_id) {
            Some(profile) => Ok(profile.hints.clone()),
            None if self.strict => Err(ContextError::new(format!(
                "no profile for property {}",
                job.property_id
            ))),
            None => Ok(LookupHints::default()),
        }
    }
}
