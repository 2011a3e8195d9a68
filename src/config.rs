use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::BatchConfig;
use crate::lookup::{DEFAULT_RECON_URL, DEFAULT_SEARCH_URL, HttpLookupConfig};
use crate::resilience::{CircuitConfig, RetryPolicy, SchedulerConfig};
use crate::scoring::ScoringConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub lookup: LookupConfig,
    pub retry: RetryConfig,
    pub circuit: CircuitConfig,
    pub scoring: ScoringConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub primary_url: String,
    /// Free-text search endpoint; no fallback when unset
    pub fallback_url: Option<String>,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub language: String,
    pub limit: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            primary_url: DEFAULT_RECON_URL.to_string(),
            fallback_url: Some(DEFAULT_SEARCH_URL.to_string()),
            timeout_ms: 10000,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            language: "en".to_string(),
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub primary: RetryPolicy,
    pub fallback: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            primary: RetryPolicy::primary(),
            fallback: RetryPolicy::fallback(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            lookup: LookupConfig::default(),
            retry: RetryConfig::default(),
            circuit: CircuitConfig::default(),
            scoring: ScoringConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch.auto_accept_window == 0 || self.batch.column_window == 0 {
            eyre::bail!("batch window sizes must be at least 1");
        }
        if self.retry.primary.max_attempts == 0 || self.retry.fallback.max_attempts == 0 {
            eyre::bail!("retry budgets must allow at least one attempt");
        }
        if self.circuit.failure_threshold == 0 {
            eyre::bail!("circuit.failure_threshold must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.batch.pacing.unhealthy_error_rate) {
            eyre::bail!(
                "batch.unhealthy_error_rate must be within 0..=1, got {}",
                self.batch.pacing.unhealthy_error_rate
            );
        }
        if !(0.0..=100.0).contains(&self.scoring.fallback_score) {
            eyre::bail!("scoring.fallback_score must be within 0..=100");
        }
        if self.scoring.max_boost < 1.0 {
            eyre::bail!("scoring.max_boost must be at least 1.0");
        }
        if self.lookup.limit == 0 {
            eyre::bail!("lookup.limit must be at least 1");
        }
        Ok(())
    }

    pub fn primary_http(&self) -> HttpLookupConfig {
        self.http_config(&self.lookup.primary_url)
    }

    pub fn fallback_http(&self) -> Option<HttpLookupConfig> {
        self.lookup.fallback_url.as_deref().map(|url| self.http_config(url))
    }

    fn http_config(&self, url: &str) -> HttpLookupConfig {
        HttpLookupConfig {
            url: url.to_string(),
            timeout: Duration::from_millis(self.lookup.timeout_ms),
            user_agent: self.lookup.user_agent.clone(),
            language: self.lookup.language.clone(),
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            primary: self.retry.primary.clone(),
            fallback: self.retry.fallback.clone(),
            limit: self.lookup.limit,
            fallback_score: self.scoring.fallback_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retry.primary.max_attempts, 3);
        assert_eq!(config.retry.fallback.max_attempts, 2);
        assert_eq!(config.retry.fallback.base_delay_ms, 500);
        assert_eq!(config.circuit.failure_threshold, 5);
        assert_eq!(config.scoring.fallback_score, 80.0);
        assert_eq!(config.batch.auto_accept_window, 3);
        assert_eq!(config.batch.column_window, 5);
        assert_eq!(config.lookup.timeout_ms, 10000);
        assert!(config.lookup.fallback_url.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
lookup:
  language: de
retry:
  primary:
    max_attempts: 5
circuit:
  cooldown_secs: 30
batch:
  bucket_delay_max_ms: 1500
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.lookup.language, "de");
        assert_eq!(config.lookup.limit, 10);
        assert_eq!(config.retry.primary.max_attempts, 5);
        assert_eq!(config.retry.fallback.max_attempts, 2);
        assert_eq!(config.circuit.cooldown_secs, 30);
        assert_eq!(config.circuit.failure_threshold, 5);
        assert_eq!(config.batch.pacing.bucket_delay_max_ms, 1500);
        assert_eq!(config.batch.auto_accept_window, 3);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.batch.column_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_rate_and_budget() {
        let mut config = Config::default();
        config.batch.pacing.unhealthy_error_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.fallback.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reconcilr.yml");
        fs::write(&path, "scoring:\n  fallback_score: 70\nlookup:\n  fallback_url: null\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.scoring.fallback_score, 70.0);
        assert!(config.fallback_http().is_none());
        assert_eq!(config.scheduler().fallback_score, 70.0);
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_invalid_values_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reconcilr.yml");
        fs::write(&path, "circuit:\n  failure_threshold: 0\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_http_config() {
        let config = Config::default();
        let primary = config.primary_http();
        assert_eq!(primary.url, DEFAULT_RECON_URL);
        assert_eq!(primary.timeout, Duration::from_secs(10));
        assert_eq!(config.fallback_http().unwrap().url, DEFAULT_SEARCH_URL);
    }
}
