//! Splits a batch into temporal jobs and per-property lookup buckets.

use crate::domain::temporal::{self, TemporalValue};
use crate::domain::{PropertyConstraints, ReconciliationJob};

use super::context::JobContextProvider;

/// A job resolved locally as a date
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalJob {
    pub job: ReconciliationJob,
    /// None when a date-typed property holds an unparseable value
    pub value: Option<TemporalValue>,
}

/// Jobs for one property, looked up together
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBucket {
    pub property_id: String,
    pub constraints: PropertyConstraints,
    pub jobs: Vec<ReconciliationJob>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub temporal: Vec<TemporalJob>,
    /// In order of each property's first appearance
    pub buckets: Vec<PropertyBucket>,
}

impl Partition {
    pub fn entity_jobs(&self) -> usize {
        self.buckets.iter().map(|b| b.jobs.len()).sum()
    }
}

/// Resolve a value as a date if its property calls for one.
///
/// Date-typed properties always resolve here. Untyped properties resolve here
/// only when the value is unambiguously a date.
pub fn classify_temporal(job: &ReconciliationJob, constraints: &PropertyConstraints) -> Option<TemporalJob> {
    if constraints.is_temporal() {
        return Some(TemporalJob {
            job: job.clone(),
            value: temporal::parse(&job.raw_value),
        });
    }
    if constraints.datatype.is_none() {
        if let Some(value) = temporal::parse_untyped(&job.raw_value) {
            return Some(TemporalJob {
                job: job.clone(),
                value: Some(value),
            });
        }
    }
    None
}

pub fn partition(jobs: Vec<ReconciliationJob>, context: &dyn JobContextProvider) -> Partition {
    let mut result = Partition::default();

    for job in jobs {
        if let Some(index) = result.buckets.iter().position(|b| b.property_id == job.property_id) {
            // Known entity property; only the date check needs redoing for untyped ones
            let bucket = &mut result.buckets[index];
            match classify_temporal(&job, &bucket.constraints) {
                Some(t) => result.temporal.push(t),
                None => bucket.jobs.push(job),
            }
            continue;
        }

        let constraints = context.constraints(&job.property_id);
        match classify_temporal(&job, &constraints) {
            Some(t) => result.temporal.push(t),
            None => result.buckets.push(PropertyBucket {
                property_id: job.property_id.clone(),
                constraints,
                jobs: vec![job],
            }),
        }
    }

    log::debug!(
        "Partitioned batch: {} temporal, {} entity jobs in {} buckets",
        result.temporal.len(),
        result.entity_jobs(),
        result.buckets.len()
    );
    result
}
