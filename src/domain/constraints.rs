//! Property-level constraints supplied by the property metadata collaborator

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Declared datatype of a property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Datatype {
    ExternalId,
    EntityReference,
    Time,
    String,
    Url,
    Quantity,
    MonolingualText,
    Other(String),
}

impl Datatype {
    pub fn as_str(&self) -> &str {
        match self {
            Datatype::ExternalId => "external-id",
            Datatype::EntityReference => "entity-reference",
            Datatype::Time => "time",
            Datatype::String => "string",
            Datatype::Url => "url",
            Datatype::Quantity => "quantity",
            Datatype::MonolingualText => "monolingual-text",
            Datatype::Other(s) => s,
        }
    }
}

impl From<String> for Datatype {
    fn from(s: String) -> Self {
        match s.as_str() {
            "external-id" => Datatype::ExternalId,
            "entity-reference" | "wikibase-item" => Datatype::EntityReference,
            "time" => Datatype::Time,
            "string" => Datatype::String,
            "url" => Datatype::Url,
            "quantity" => Datatype::Quantity,
            "monolingual-text" | "monolingualtext" => Datatype::MonolingualText,
            _ => Datatype::Other(s),
        }
    }
}

impl From<Datatype> for String {
    fn from(d: Datatype) -> Self {
        d.as_str().to_string()
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A format constraint: a regex the raw value must match in full
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatPattern {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl FormatPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            description: None,
            deprecated: false,
        }
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }
}

/// Optional metadata attached to a job's property. Read-only to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyConstraints {
    pub expected_entity_types: BTreeSet<String>,
    pub format_patterns: Vec<FormatPattern>,
    pub datatype: Option<Datatype>,
}

impl PropertyConstraints {
    pub fn with_datatype(datatype: Datatype) -> Self {
        Self {
            datatype: Some(datatype),
            ..Default::default()
        }
    }

    /// Patterns that still apply
    pub fn active_patterns(&self) -> impl Iterator<Item = &FormatPattern> {
        self.format_patterns.iter().filter(|p| !p.deprecated)
    }

    pub fn is_temporal(&self) -> bool {
        self.datatype == Some(Datatype::Time)
    }
}
