//! Circuit breaking for lookup endpoints.
//!
//! After enough consecutive failures an endpoint is skipped until a cool-down
//! has passed since its last failure. When the cool-down elapses the failure
//! counters of every endpoint are cleared, not just the one that tripped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Source of the current time, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.base + offset
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds after the last failure before calls resume.
    pub cooldown_secs: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

impl CircuitConfig {
    pub fn new(failure_threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            failure_threshold,
            cooldown_secs,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Failure bookkeeping for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub last_failure: Option<Instant>,
}

/// Shared per-endpoint circuit breaker.
///
/// Safe to share across concurrent windows; all bookkeeping happens under one
/// mutex.
pub struct CircuitGuard {
    config: CircuitConfig,
    clock: Arc<dyn Clock>,
    states: Mutex<HashMap<String, CircuitState>>,
}

impl CircuitGuard {
    pub fn new(config: CircuitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    fn cooled_down(&self, state: &CircuitState, now: Instant) -> bool {
        state
            .last_failure
            .is_some_and(|at| now.saturating_duration_since(at) > self.config.cooldown())
    }

    /// True while the endpoint's circuit is open.
    pub fn should_skip(&self, endpoint: &str) -> bool {
        let now = self.clock.now();
        let Ok(mut states) = self.states.lock() else {
            return false;
        };

        let Some(state) = states.get(endpoint).copied() else {
            return false;
        };

        if self.cooled_down(&state, now) {
            if state.consecutive_failures >= self.config.failure_threshold {
                tracing::info!(endpoint = endpoint, "Circuit cool-down elapsed, resetting all endpoints");
            }
            states.clear();
            return false;
        }

        state.consecutive_failures >= self.config.failure_threshold
    }

    /// Record a failed call against the endpoint.
    pub fn record_failure(&self, endpoint: &str) {
        let now = self.clock.now();
        let Ok(mut states) = self.states.lock() else {
            return;
        };

        let stale = states.get(endpoint).is_some_and(|s| self.cooled_down(s, now));
        if stale {
            states.clear();
        }

        let state = states.entry(endpoint.to_string()).or_default();
        state.consecutive_failures += 1;
        state.last_failure = Some(now);

        if state.consecutive_failures == self.config.failure_threshold {
            tracing::warn!(
                endpoint = endpoint,
                consecutive_failures = state.consecutive_failures,
                cooldown_secs = self.config.cooldown_secs,
                "Circuit opened"
            );
        } else {
            log::debug!("{} failure #{}", endpoint, state.consecutive_failures);
        }
    }

    /// Record a successful call; clears only this endpoint's counter.
    pub fn record_success(&self, endpoint: &str) {
        if let Ok(mut states) = self.states.lock() {
            if let Some(state) = states.get_mut(endpoint) {
                state.consecutive_failures = 0;
            }
        }
    }

    /// Current consecutive failure count for an endpoint.
    pub fn failures(&self, endpoint: &str) -> u32 {
        self.state(endpoint).consecutive_failures
    }

    pub fn state(&self, endpoint: &str) -> CircuitState {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(endpoint).copied())
            .unwrap_or_default()
    }
}

impl Default for CircuitGuard {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}

impl std::fmt::Debug for CircuitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitGuard").field("config", &self.config).finish()
    }
}
