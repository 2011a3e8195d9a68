//! Reconciliation jobs and the keys that identify their cells

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one cell: a single value of one property on one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub item_id: String,
    /// Stable mapping identifier, not the display label
    pub property_id: String,
    /// Position within a multi-valued field
    pub value_index: usize,
}

impl JobKey {
    pub fn new(item_id: impl Into<String>, property_id: impl Into<String>, value_index: usize) -> Self {
        Self {
            item_id: item_id.into(),
            property_id: property_id.into(),
            value_index,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.item_id, self.property_id, self.value_index)
    }
}

/// One unit of reconciliation work. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationJob {
    pub item_id: String,
    pub property_id: String,
    #[serde(default)]
    pub value_index: usize,
    pub raw_value: String,
}

impl ReconciliationJob {
    pub fn new(
        item_id: impl Into<String>,
        property_id: impl Into<String>,
        value_index: usize,
        raw_value: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            property_id: property_id.into(),
            value_index,
            raw_value: raw_value.into(),
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.item_id, &self.property_id, self.value_index)
    }

    /// The value as sent to lookup services
    pub fn query_text(&self) -> &str {
        self.raw_value.trim()
    }
}
