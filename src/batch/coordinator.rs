//! Batch coordinator: fans jobs out to the scheduler and records every outcome.
//!
//! A batch runs in four steps:
//! 1. Register every job; cells settled by an earlier run are reported as-is
//! 2. Resolve temporal jobs locally, without a network call
//! 3. Walk property buckets in order, pausing between buckets
//! 4. Within a bucket, dispatch fixed-size windows concurrently, waiting for
//!    the whole window before the next one starts
//!
//! No job failure aborts a batch. Each job yields exactly one outcome.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;

use crate::domain::{
    AcceptQualifier, Candidate, CellState, ErrorInfo, FULL_CONFIDENCE_REASON, JobKey, JobOutcome, PropertyConstraints,
    ReconciliationJob, Selection, TEMPORAL_REASON,
};
use crate::error::{ReconError, Result};
use crate::id::generate_batch_id;
use crate::resilience::RetryingScheduler;
use crate::scoring::ConstraintScorer;
use crate::store::{ReconciliationStore, Transition};

use super::classify::{ErrorClassifier, VocabularyClassifier};
use super::context::JobContextProvider;
use super::pacing::{BucketStats, PacingPolicy};
use super::partition::{TemporalJob, classify_temporal, partition};
use super::report::{BatchEvent, BatchReport};
use super::{BatchConfig, BatchMode};

/// A classification plus the candidates the cell keeps
struct Resolved {
    outcome: JobOutcome,
    matches: Vec<Candidate>,
}

impl Resolved {
    fn bare(outcome: JobOutcome) -> Self {
        Self {
            outcome,
            matches: Vec::new(),
        }
    }
}

fn resolve_temporal(temporal: &TemporalJob) -> Resolved {
    let outcome = match &temporal.value {
        Some(value) => JobOutcome::AutoAccepted {
            selection: Selection::Date(value.clone()),
            reason: TEMPORAL_REASON.to_string(),
        },
        None => JobOutcome::Error {
            message: format!("'{}' is not a recognisable date", temporal.job.raw_value.trim()),
            retryable: false,
        },
    };
    Resolved::bare(outcome)
}

/// Outcome reported when the store refuses a job's result
fn store_failure(key: &JobKey, err: &ReconError) -> JobOutcome {
    log::error!("Failed to record outcome for {}: {}", key, err);
    JobOutcome::Error {
        message: err.to_string(),
        retryable: false,
    }
}

pub struct BatchCoordinator {
    scheduler: Arc<RetryingScheduler>,
    scorer: Arc<ConstraintScorer>,
    store: Arc<ReconciliationStore>,
    context: Arc<dyn JobContextProvider>,
    classifier: Arc<dyn ErrorClassifier>,
    config: BatchConfig,
    pacing: PacingPolicy,
    events: Option<mpsc::Sender<BatchEvent>>,
}

impl BatchCoordinator {
    pub fn new(
        scheduler: Arc<RetryingScheduler>,
        scorer: Arc<ConstraintScorer>,
        store: Arc<ReconciliationStore>,
        context: Arc<dyn JobContextProvider>,
    ) -> Self {
        let config = BatchConfig::default();
        Self {
            scheduler,
            scorer,
            store,
            context,
            classifier: Arc::new(VocabularyClassifier),
            pacing: PacingPolicy::new(config.pacing.clone()),
            config,
            events: None,
        }
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.pacing = PacingPolicy::new(config.pacing.clone());
        self.config = config;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Send progress events to `tx`. The receiver must keep draining while a
    /// batch runs.
    pub fn with_events(mut self, tx: mpsc::Sender<BatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn store(&self) -> Arc<ReconciliationStore> {
        self.store.clone()
    }

    /// Reconcile a set of jobs to completion.
    ///
    /// Jobs repeating a key already seen in this batch are dropped. Only a
    /// failure to register jobs up front is returned as an error.
    pub async fn run_batch(&self, jobs: Vec<ReconciliationJob>, mode: BatchMode) -> Result<BatchReport> {
        let batch_id = generate_batch_id();
        let window = self.config.window_size(mode).max(1);
        log::info!(
            "Starting {} batch {} with {} jobs (window {})",
            mode.as_str(),
            batch_id,
            jobs.len(),
            window
        );
        let mut report = BatchReport::new(&batch_id, mode);

        let mut seen = HashSet::new();
        let mut work = Vec::with_capacity(jobs.len());
        for job in jobs {
            let key = job.key();
            if !seen.insert(key.clone()) {
                log::warn!("Duplicate job {} in batch {}, ignoring", key, batch_id);
                continue;
            }
            let cell = self.store.register(&key)?;
            match JobOutcome::from_terminal_cell(&cell) {
                Some(outcome) => {
                    log::debug!("{} already {}, not reprocessing", key, cell.status);
                    self.complete(&mut report, key, outcome).await;
                }
                None => work.push(job),
            }
        }

        let partition = partition(work, self.context.as_ref());

        for temporal in &partition.temporal {
            let key = temporal.job.key();
            let outcome = self
                .commit(&key, resolve_temporal(temporal))
                .unwrap_or_else(|err| store_failure(&key, &err));
            self.complete(&mut report, key, outcome).await;
        }

        let mut queued = Vec::with_capacity(partition.buckets.len());
        for bucket in &partition.buckets {
            let mut accepted = Vec::with_capacity(bucket.jobs.len());
            for job in &bucket.jobs {
                match self.store.transition(&job.key(), Transition::Queue) {
                    Ok(_) => accepted.push(job),
                    Err(err) => {
                        let outcome = store_failure(&job.key(), &err);
                        self.complete(&mut report, job.key(), outcome).await;
                    }
                }
            }
            queued.push(accepted);
        }

        for (index, (bucket, jobs)) in partition.buckets.iter().zip(queued).enumerate() {
            let delay = self.pacing.bucket_delay(index);
            if !delay.is_zero() {
                log::debug!("Pausing {:?} before bucket {}", delay, index);
                tokio::time::sleep(delay).await;
            }

            log::info!("Bucket {} ({}): {} jobs", index, bucket.property_id, jobs.len());
            self.emit(BatchEvent::BucketStarted {
                batch_id: batch_id.clone(),
                property_id: bucket.property_id.clone(),
                index,
                jobs: jobs.len(),
            })
            .await;

            let mut stats = BucketStats::default();
            for (w, chunk) in jobs.chunks(window).enumerate() {
                if w > 0 {
                    let delay = self.pacing.window_delay(&stats);
                    log::debug!(
                        "{} window {}: error rate {:.2}, waiting {:?}",
                        bucket.property_id,
                        w,
                        stats.error_rate(),
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }

                let outcomes = join_all(chunk.iter().map(|job| self.process(job, &bucket.constraints))).await;
                for (job, outcome) in chunk.iter().zip(outcomes) {
                    stats.record(&outcome);
                    self.complete(&mut report, job.key(), outcome).await;
                }
            }
        }

        let summary = report.summary;
        log::info!(
            "Batch {} finished: {} auto-accepted, {} for review, {} no match, {} errors, {} already settled",
            batch_id,
            summary.auto_accepted,
            summary.matches_available,
            summary.no_matches,
            summary.errors,
            summary.settled
        );
        self.emit(BatchEvent::BatchFinished { batch_id, summary }).await;

        Ok(report)
    }

    /// Reconcile a single value outside any batch.
    ///
    /// The store is written only once the outcome is known. A settled cell is
    /// reported without a new lookup.
    pub async fn reconcile_one(&self, job: &ReconciliationJob) -> Result<JobOutcome> {
        let key = job.key();
        if let Some(cell) = self.store.find(&key)? {
            if let Some(outcome) = JobOutcome::from_terminal_cell(&cell) {
                return Ok(outcome);
            }
        }

        let constraints = self.context.constraints(&job.property_id);
        let resolved = match classify_temporal(job, &constraints) {
            Some(temporal) => resolve_temporal(&temporal),
            None => self.resolve_entity(job, &constraints).await,
        };
        self.commit(&key, resolved)
    }

    /// [`reconcile_one`](Self::reconcile_one), abandoned when `cancel` resolves first.
    ///
    /// Cancelling drops the in-flight lookup and leaves the store untouched.
    pub async fn reconcile_one_until<F>(&self, job: &ReconciliationJob, cancel: F) -> Result<JobOutcome>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                log::info!("Reconciliation of {} cancelled", job.key());
                Err(ReconError::Cancelled(job.key().to_string()))
            }
            result = self.reconcile_one(job) => result,
        }
    }

    /// Record a reviewer's choice among a cell's candidates
    pub fn select_candidate(&self, key: &JobKey, candidate_id: &str) -> Result<CellState> {
        let cell = self.store.get(key)?;
        let candidate = cell
            .matches
            .iter()
            .find(|c| c.id == candidate_id)
            .cloned()
            .ok_or_else(|| ReconError::InvalidTransition(format!("{}: no candidate {}", key, candidate_id)))?;

        log::info!("{}: reviewer selected {}", key, candidate.id);
        self.store.transition(
            key,
            Transition::Accept {
                selection: Selection::Entity(candidate),
                matches: cell.matches,
                qualifier: AcceptQualifier::manual(),
            },
        )
    }

    /// Mark a value as deliberately left unreconciled
    pub fn skip(&self, key: &JobKey) -> Result<CellState> {
        self.store.register(key)?;
        self.store.transition(key, Transition::Skip)
    }

    async fn process(&self, job: &ReconciliationJob, constraints: &PropertyConstraints) -> JobOutcome {
        let key = job.key();
        if let Err(err) = self.store.transition(&key, Transition::Begin) {
            return store_failure(&key, &err);
        }
        let resolved = self.resolve_entity(job, constraints).await;
        self.commit(&key, resolved)
            .unwrap_or_else(|err| store_failure(&key, &err))
    }

    async fn resolve_entity(&self, job: &ReconciliationJob, constraints: &PropertyConstraints) -> Resolved {
        let text = job.query_text();
        if text.is_empty() {
            return Resolved::bare(JobOutcome::NoMatches);
        }

        let hints = match self.context.hints(job).await {
            Ok(hints) => hints,
            Err(err) => {
                let retryable = self.classifier.is_retryable(&err);
                log::warn!("Context for {} failed (retryable: {}): {}", job.key(), retryable, err);
                return Resolved::bare(JobOutcome::Error {
                    message: err.to_string(),
                    retryable,
                });
            }
        };

        let resolution = self
            .scheduler
            .resolve(text, &hints.type_hints, &hints.context_hints)
            .await;
        if resolution.is_degraded() {
            log::info!("{}: lookups unavailable, recording no match", job.key());
        }

        let scored = self.scorer.score_all(resolution.candidates(), constraints, &job.raw_value);
        self.classify(scored)
    }

    fn classify(&self, candidates: Vec<Candidate>) -> Resolved {
        let outcome = match candidates.first() {
            None => JobOutcome::NoMatches,
            Some(top) if self.scorer.is_auto_acceptable(top) => JobOutcome::AutoAccepted {
                selection: Selection::Entity(top.clone()),
                reason: FULL_CONFIDENCE_REASON.to_string(),
            },
            Some(top) => JobOutcome::MatchesAvailable {
                candidates: candidates.clone(),
                best: top.clone(),
            },
        };
        Resolved {
            outcome,
            matches: candidates,
        }
    }

    /// Write an outcome to the job's cell
    fn commit(&self, key: &JobKey, resolved: Resolved) -> Result<JobOutcome> {
        let Resolved { outcome, matches } = resolved;
        let transition = match &outcome {
            JobOutcome::AutoAccepted { selection, reason } => Transition::Accept {
                selection: selection.clone(),
                matches,
                qualifier: AcceptQualifier::automatic(reason.clone()),
            },
            JobOutcome::MatchesAvailable { .. } => Transition::Review { matches },
            JobOutcome::NoMatches => Transition::NoMatch,
            JobOutcome::Error { message, retryable } => Transition::Fail(ErrorInfo::new(message.clone(), *retryable)),
            JobOutcome::Settled { .. } => return Ok(outcome),
        };

        self.store.register(key)?;
        self.store.transition(key, transition)?;
        log::debug!("{}: {}", key, outcome.label());
        Ok(outcome)
    }

    async fn complete(&self, report: &mut BatchReport, key: JobKey, outcome: JobOutcome) {
        self.emit(BatchEvent::JobCompleted {
            batch_id: report.batch_id.clone(),
            key: key.clone(),
            outcome: outcome.clone(),
        })
        .await;
        report.record(key, outcome);
    }

    async fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).await.is_err() {
                log::debug!("Batch event receiver dropped");
            }
        }
    }
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .finish()
    }
}
