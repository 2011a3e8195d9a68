//! Retrying scheduler: one resolve call across primary and fallback endpoints.
//!
//! Resolution order:
//! 1. Structured query against the primary endpoint, through the circuit guard,
//!    retried with exponential backoff on retryable failures
//! 2. Free-text search against the fallback endpoint with its own budget
//! 3. If both fail, an explicit degraded result with no candidates
//!
//! Network failures never escape as errors. A batch of N jobs therefore always
//! yields N classified outcomes.

use std::sync::Arc;

use crate::domain::{Candidate, EntityType, SourceTier};
use crate::lookup::{ContextHint, LookupClient, LookupError, LookupErrorKind, LookupHit, LookupQuery};
use crate::resilience::backoff::RetryPolicy;
use crate::resilience::circuit::CircuitGuard;
use crate::scoring::normalize;

/// Configuration for the RetryingScheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub primary: RetryPolicy,
    pub fallback: RetryPolicy,
    /// Candidates requested per query
    pub limit: usize,
    /// Flat score for unscored fallback hits
    pub fallback_score: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            primary: RetryPolicy::primary(),
            fallback: RetryPolicy::fallback(),
            limit: 10,
            fallback_score: 80.0,
        }
    }
}

/// Result of resolving one value
#[derive(Debug, Clone)]
pub enum Resolution {
    /// An endpoint answered; the list may be empty
    Found {
        candidates: Vec<Candidate>,
        tier: SourceTier,
    },
    /// Every endpoint failed; treated as "no evidence found"
    Degraded { failures: Vec<LookupError> },
}

impl Resolution {
    pub fn candidates(&self) -> &[Candidate] {
        match self {
            Resolution::Found { candidates, .. } => candidates,
            Resolution::Degraded { .. } => &[],
        }
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        match self {
            Resolution::Found { candidates, .. } => candidates,
            Resolution::Degraded { .. } => Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Resolution::Degraded { .. })
    }
}

/// Wraps lookup clients with retries, circuit breaking and fallback
pub struct RetryingScheduler {
    primary: Arc<dyn LookupClient>,
    fallback: Option<Arc<dyn LookupClient>>,
    circuit: Arc<CircuitGuard>,
    config: SchedulerConfig,
}

impl RetryingScheduler {
    pub fn new(primary: Arc<dyn LookupClient>, circuit: Arc<CircuitGuard>) -> Self {
        Self {
            primary,
            fallback: None,
            circuit,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn LookupClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn circuit(&self) -> Arc<CircuitGuard> {
        self.circuit.clone()
    }

    /// Resolve a raw value into unscored, ranked candidates.
    pub async fn resolve(&self, value: &str, type_hints: &[EntityType], context_hints: &[ContextHint]) -> Resolution {
        let mut failures = Vec::new();

        let query = LookupQuery::new(value)
            .with_types(type_hints.to_vec())
            .with_context(context_hints.to_vec())
            .with_limit(self.config.limit);

        match self.call_with_retries(self.primary.as_ref(), &query, &self.config.primary).await {
            Ok(hits) => return self.found(hits, SourceTier::PrimaryLookup),
            Err(err) => {
                log::info!("Primary lookup for {:?} failed ({}), trying fallback", value, err);
                failures.push(err);
            }
        }

        if let Some(fallback) = &self.fallback {
            let search = LookupQuery::new(value).with_limit(self.config.limit);
            match self.call_with_retries(fallback.as_ref(), &search, &self.config.fallback).await {
                Ok(hits) => return self.found(hits, SourceTier::FallbackSearch),
                Err(err) => failures.push(err),
            }
        }

        log::warn!(
            "All lookups for {:?} failed, degrading to empty result: {}",
            value,
            failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ")
        );
        Resolution::Degraded { failures }
    }

    fn found(&self, hits: Vec<LookupHit>, tier: SourceTier) -> Resolution {
        Resolution::Found {
            candidates: normalize(hits, tier, self.config.fallback_score),
            tier,
        }
    }

    /// Call one endpoint within its retry budget.
    ///
    /// A failure is recorded against the circuit once per exhausted call, and
    /// only for categories that reflect endpoint health.
    async fn call_with_retries(
        &self,
        client: &dyn LookupClient,
        query: &LookupQuery,
        policy: &RetryPolicy,
    ) -> Result<Vec<LookupHit>, LookupError> {
        let endpoint = client.endpoint();
        let mut attempt = 0;

        loop {
            if self.circuit.should_skip(endpoint) {
                log::debug!("Circuit open for {}, skipping", endpoint);
                return Err(LookupError::circuit_open(endpoint));
            }

            match client.lookup(query).await {
                Ok(hits) => {
                    self.circuit.record_success(endpoint);
                    return Ok(hits);
                }
                Err(err) if err.is_retryable() && policy.has_attempt_after(attempt) => {
                    let delay = policy.delay(attempt);
                    log::warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        endpoint,
                        attempt + 1,
                        policy.max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.kind.counts_against_circuit() {
                        self.circuit.record_failure(endpoint);
                    }
                    if err.kind == LookupErrorKind::Permanent {
                        log::warn!("{} rejected query {:?}: {}", endpoint, query.text, err.message);
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingScheduler")
            .field("primary", &self.primary.endpoint())
            .field("fallback", &self.fallback.as_ref().map(|f| f.endpoint().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{Reply, ScriptedLookupClient};
    use crate::resilience::circuit::CircuitConfig;

    fn scheduler(primary: Arc<ScriptedLookupClient>, fallback: Arc<ScriptedLookupClient>) -> RetryingScheduler {
        RetryingScheduler::new(primary, Arc::new(CircuitGuard::default())).with_fallback(fallback)
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_success_is_primary_tier() {
        let primary = Arc::new(ScriptedLookupClient::new("primary").with_script(
            "Jane Doe",
            vec![Reply::Hits(vec![LookupHit::new("E1", "Jane Doe").with_score(100.0)])],
        ));
        let fallback = Arc::new(ScriptedLookupClient::new("fallback"));
        let s = scheduler(primary.clone(), fallback.clone());

        let resolution = s.resolve("Jane Doe", &[], &[]).await;

        assert!(!resolution.is_degraded());
        assert_eq!(resolution.candidates().len(), 1);
        assert_eq!(resolution.candidates()[0].source_tier, SourceTier::PrimaryLookup);
        assert_eq!(resolution.candidates()[0].score, 100.0);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_carries_hints() {
        let primary = Arc::new(ScriptedLookupClient::new("primary"));
        let s = RetryingScheduler::new(primary.clone(), Arc::new(CircuitGuard::default()));

        s.resolve("Jane Doe", &[EntityType::new("Q5")], &[ContextHint::new("P31", "Q5")])
            .await;

        let queries = primary.queries();
        assert_eq!(queries[0].type_filter[0].id, "Q5");
        assert_eq!(queries[0].property_filter[0].value, "Q5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let primary = Arc::new(ScriptedLookupClient::new("primary").with_script(
            "x",
            vec![
                Reply::Fail(LookupErrorKind::RateLimited),
                Reply::Fail(LookupErrorKind::Server),
                Reply::Hits(vec![LookupHit::new("E1", "X").with_score(70.0)]),
            ],
        ));
        let fallback = Arc::new(ScriptedLookupClient::new("fallback"));
        let s = scheduler(primary.clone(), fallback.clone());

        let resolution = s.resolve("x", &[], &[]).await;

        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(resolution.candidates()[0].id, "E1");
        assert_eq!(s.circuit().failures("primary"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_fall_back_to_search() {
        let primary = Arc::new(ScriptedLookupClient::failing("primary", LookupErrorKind::Timeout));
        let fallback = Arc::new(
            ScriptedLookupClient::new("fallback")
                .with_default(Reply::Hits(vec![LookupHit::new("Q42", "Jane Doe")])),
        );
        let s = scheduler(primary.clone(), fallback.clone());

        let resolution = s.resolve("Jane Doe", &[], &[]).await;

        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 1);
        let candidates = resolution.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].score, 80.0);
        assert_eq!(candidates[0].source_tier, SourceTier::FallbackSearch);
        assert_eq!(s.circuit().failures("primary"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_query_is_free_text() {
        let primary = Arc::new(ScriptedLookupClient::failing("primary", LookupErrorKind::Server));
        let fallback = Arc::new(ScriptedLookupClient::new("fallback"));
        let s = scheduler(primary, fallback.clone());

        s.resolve("Jane Doe", &[EntityType::new("Q5")], &[ContextHint::new("P31", "Q5")])
            .await;

        let queries = fallback.queries();
        assert_eq!(queries[0].text, "Jane Doe");
        assert!(queries[0].type_filter.is_empty());
        assert!(queries[0].property_filter.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_fail_degrades_without_error() {
        let primary = Arc::new(ScriptedLookupClient::failing("primary", LookupErrorKind::Network));
        let fallback = Arc::new(ScriptedLookupClient::failing("fallback", LookupErrorKind::Server));
        let s = scheduler(primary.clone(), fallback.clone());

        let resolution = s.resolve("x", &[], &[]).await;

        assert!(resolution.is_degraded());
        assert!(resolution.candidates().is_empty());
        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 2);
        assert_eq!(s.circuit().failures("primary"), 1);
        assert_eq!(s.circuit().failures("fallback"), 1);
        if let Resolution::Degraded { failures } = resolution {
            assert_eq!(failures.len(), 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried_or_counted() {
        let primary = Arc::new(ScriptedLookupClient::failing("primary", LookupErrorKind::Permanent));
        let fallback = Arc::new(ScriptedLookupClient::new("fallback"));
        let s = scheduler(primary.clone(), fallback.clone());

        let resolution = s.resolve("x", &[], &[]).await;

        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert!(!resolution.is_degraded());
        assert_eq!(s.circuit().failures("primary"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_primary() {
        let primary = Arc::new(ScriptedLookupClient::new("primary"));
        let fallback = Arc::new(
            ScriptedLookupClient::new("fallback").with_default(Reply::Hits(vec![LookupHit::new("Q1", "One")])),
        );
        let circuit = Arc::new(CircuitGuard::new(CircuitConfig::new(1, 60)));
        circuit.record_failure("primary");
        let s = RetryingScheduler::new(primary.clone(), circuit).with_fallback(fallback.clone());

        let resolution = s.resolve("x", &[], &[]).await;

        assert_eq!(primary.calls(), 0);
        assert_eq!(resolution.candidates()[0].source_tier, SourceTier::FallbackSearch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fallback_configured() {
        let primary = Arc::new(ScriptedLookupClient::failing("primary", LookupErrorKind::Timeout));
        let s = RetryingScheduler::new(primary.clone(), Arc::new(CircuitGuard::default()));

        let resolution = s.resolve("x", &[], &[]).await;

        assert!(resolution.is_degraded());
        assert_eq!(primary.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_grow() {
        let primary = Arc::new(ScriptedLookupClient::failing("primary", LookupErrorKind::Timeout));
        let config = SchedulerConfig {
            primary: RetryPolicy::new(3, 1000, 0),
            ..Default::default()
        };
        let s = RetryingScheduler::new(primary, Arc::new(CircuitGuard::default())).with_config(config);

        let start = tokio::time::Instant::now();
        s.resolve("x", &[], &[]).await;

        // 1s + 2s between the three attempts
        assert_eq!(start.elapsed(), std::time::Duration::from_secs(3));
    }
}
