//! Scripted lookup client for tests and dry runs
//!
//! Replies are scripted per query text; unscripted queries get the default
//! reply. The client counts calls and tracks how many lookups were in flight at
//! once, which is what the batching tests assert on.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::lookup::client::{LookupClient, LookupError, LookupErrorKind, LookupHit, LookupQuery};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Hits(Vec<LookupHit>),
    Fail(LookupErrorKind),
}

/// Lookup client that answers from a script
pub struct ScriptedLookupClient {
    endpoint: String,
    default_reply: Reply,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    queries: Mutex<Vec<LookupQuery>>,
}

impl ScriptedLookupClient {
    /// A client that returns no hits unless scripted otherwise
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            default_reply: Reply::Hits(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// A client whose every call fails with `kind`
    pub fn failing(endpoint: impl Into<String>, kind: LookupErrorKind) -> Self {
        Self::new(endpoint).with_default(Reply::Fail(kind))
    }

    pub fn with_default(mut self, reply: Reply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Queue replies for a query text, consumed in order
    pub fn with_script(self, text: impl Into<String>, replies: Vec<Reply>) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(text.into()).or_default().extend(replies);
        }
        self
    }

    /// Simulated network latency per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of lookups observed in flight simultaneously
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every query received, in arrival order
    pub fn queries(&self) -> Vec<LookupQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    fn next_reply(&self, text: &str) -> Reply {
        let scripted = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(text).and_then(|queue| queue.pop_front()));
        scripted.unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl LookupClient for ScriptedLookupClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn lookup(&self, query: &LookupQuery) -> Result<Vec<LookupHit>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.clone());
        }

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = self.next_reply(&query.text);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Reply::Hits(hits) => Ok(hits),
            Reply::Fail(kind) => Err(LookupError::new(kind, &self.endpoint, format!("scripted {}", kind))),
        }
    }
}
