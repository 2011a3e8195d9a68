//! HTTP lookup clients
//!
//! `ReconServiceClient` speaks the reconciliation service protocol (structured
//! queries with type and property filters, scored results).
//! `EntitySearchClient` calls a free-text entity search that returns unscored
//! hits and is used as the fallback tier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{ReconError, Result};
use crate::lookup::client::{LookupClient, LookupError, LookupErrorKind, LookupHit, LookupQuery};

/// Default reconciliation endpoint
pub const DEFAULT_RECON_URL: &str = "https://wikidata.reconci.link/en/api";

/// Default free-text search endpoint
pub const DEFAULT_SEARCH_URL: &str = "https://www.wikidata.org/w/api.php";

const DEFAULT_USER_AGENT: &str = concat!("reconcilr/", env!("CARGO_PKG_VERSION"));

/// Configuration shared by both HTTP clients
#[derive(Debug, Clone)]
pub struct HttpLookupConfig {
    pub url: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub language: String,
}

impl Default for HttpLookupConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RECON_URL.to_string(),
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            language: "en".to_string(),
        }
    }
}

impl HttpLookupConfig {
    /// Create a config pointing at a specific URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

fn build_http_client(config: &HttpLookupConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ReconError::Lookup(format!("Failed to create HTTP client: {}", e)))
}

fn transport_error(endpoint: &str, err: reqwest::Error) -> LookupError {
    let kind = if err.is_timeout() {
        LookupErrorKind::Timeout
    } else if err.is_decode() {
        LookupErrorKind::InvalidResponse
    } else {
        LookupErrorKind::Network
    };
    LookupError::new(kind, endpoint, err.to_string())
}

/// Map a non-success HTTP status onto an error category
pub fn status_error_kind(status: StatusCode) -> LookupErrorKind {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LookupErrorKind::RateLimited
    } else if status.is_server_error() {
        LookupErrorKind::Server
    } else {
        LookupErrorKind::Permanent
    }
}

/// Turn an HTTP response into JSON, classifying failures
async fn read_json(endpoint: &str, response: Response) -> std::result::Result<Value, LookupError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        log::warn!("{} rate limited (retry-after: {:?}s)", endpoint, retry_after);
        return Err(LookupError::new(
            LookupErrorKind::RateLimited,
            endpoint,
            format!("HTTP 429, retry after {:?}s", retry_after),
        ));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        return Err(LookupError::new(
            status_error_kind(status),
            endpoint,
            format!("HTTP {}: {}", status, body),
        ));
    }

    response.json().await.map_err(|e| {
        LookupError::new(
            LookupErrorKind::InvalidResponse,
            endpoint,
            format!("Failed to parse response: {}", e),
        )
    })
}

#[derive(Debug, Deserialize)]
struct ReconResult {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, rename = "type")]
    types: Vec<WireType>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireType {
    Object { id: String },
    Id(String),
}

impl WireType {
    fn into_id(self) -> String {
        match self {
            WireType::Object { id } => id,
            WireType::Id(id) => id,
        }
    }
}

/// Structured reconciliation service client (primary tier)
pub struct ReconServiceClient {
    client: Client,
    config: HttpLookupConfig,
}

impl ReconServiceClient {
    pub fn new(config: HttpLookupConfig) -> Result<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { client, config })
    }

    /// Build the `queries` payload: a single query filed under its key
    fn build_queries(&self, query: &LookupQuery) -> Value {
        let mut body = json!({
            "query": query.text,
            "limit": query.limit,
        });

        if !query.type_filter.is_empty() {
            let types: Vec<&str> = query.type_filter.iter().map(|t| t.id.as_str()).collect();
            body["type"] = json!(types);
        }

        if !query.property_filter.is_empty() {
            let properties: Vec<Value> = query
                .property_filter
                .iter()
                .map(|h| json!({ "pid": h.property_id, "v": h.value }))
                .collect();
            body["properties"] = json!(properties);
        }

        let mut queries = serde_json::Map::new();
        queries.insert(query.key.clone(), body);
        Value::Object(queries)
    }

    /// Parse the batch response, keeping only our query's results
    fn parse_response(&self, key: &str, body: Value) -> std::result::Result<Vec<LookupHit>, LookupError> {
        let results = body
            .get(key)
            .and_then(|q| q.get("result"))
            .cloned()
            .ok_or_else(|| {
                LookupError::new(
                    LookupErrorKind::InvalidResponse,
                    self.endpoint(),
                    format!("response has no result for query {}", key),
                )
            })?;

        let results: Vec<ReconResult> = serde_json::from_value(results).map_err(|e| {
            LookupError::new(LookupErrorKind::InvalidResponse, self.endpoint(), e.to_string())
        })?;

        Ok(results
            .into_iter()
            .map(|r| LookupHit {
                id: r.id,
                label: r.name,
                description: r.description.filter(|d| !d.is_empty()),
                score: r.score,
                types: r.types.into_iter().map(WireType::into_id).collect(),
            })
            .collect())
    }
}

#[async_trait]
impl LookupClient for ReconServiceClient {
    fn endpoint(&self) -> &str {
        &self.config.url
    }

    async fn lookup(&self, query: &LookupQuery) -> std::result::Result<Vec<LookupHit>, LookupError> {
        let queries = self.build_queries(query).to_string();
        let response = self
            .client
            .post(&self.config.url)
            .form(&[("queries", queries)])
            .send()
            .await
            .map_err(|e| transport_error(self.endpoint(), e))?;

        let body = read_json(self.endpoint(), response).await?;
        self.parse_response(&query.key, body)
    }
}

impl std::fmt::Debug for ReconServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconServiceClient")
            .field("url", &self.config.url)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Option<Vec<SearchEntry>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Free-text entity search client (fallback tier)
pub struct EntitySearchClient {
    client: Client,
    config: HttpLookupConfig,
}

impl EntitySearchClient {
    pub fn new(config: HttpLookupConfig) -> Result<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { client, config })
    }

    fn build_params(&self, query: &LookupQuery) -> Vec<(&'static str, String)> {
        vec![
            ("action", "wbsearchentities".to_string()),
            ("search", query.text.clone()),
            ("language", self.config.language.clone()),
            ("type", "item".to_string()),
            ("format", "json".to_string()),
            ("limit", query.limit.to_string()),
        ]
    }

    fn parse_response(&self, body: Value) -> std::result::Result<Vec<LookupHit>, LookupError> {
        let parsed: SearchResponse = serde_json::from_value(body).map_err(|e| {
            LookupError::new(LookupErrorKind::InvalidResponse, self.endpoint(), e.to_string())
        })?;

        if let Some(error) = parsed.error {
            return Err(LookupError::new(LookupErrorKind::Permanent, self.endpoint(), error.to_string()));
        }

        let entries = parsed.search.ok_or_else(|| {
            LookupError::new(LookupErrorKind::InvalidResponse, self.endpoint(), "missing search results")
        })?;

        Ok(entries
            .into_iter()
            .map(|e| LookupHit {
                label: e.label.unwrap_or_else(|| e.id.clone()),
                id: e.id,
                description: e.description.filter(|d| !d.is_empty()),
                score: None,
                types: Vec::new(),
            })
            .collect())
    }
}

#[async_trait]
impl LookupClient for EntitySearchClient {
    fn endpoint(&self) -> &str {
        &self.config.url
    }

    async fn lookup(&self, query: &LookupQuery) -> std::result::Result<Vec<LookupHit>, LookupError> {
        let response = self
            .client
            .get(&self.config.url)
            .query(&self.build_params(query))
            .send()
            .await
            .map_err(|e| transport_error(self.endpoint(), e))?;

        let body = read_json(self.endpoint(), response).await?;
        self.parse_response(body)
    }
}

impl std::fmt::Debug for EntitySearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySearchClient")
            .field("url", &self.config.url)
            .field("language", &self.config.language)
            .finish()
    }
}
