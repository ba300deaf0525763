//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP settings for feed fetches
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Per-source retry schedule
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Tick interval and batching
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Search index endpoint
    #[serde(default)]
    pub index: IndexConfig,

    /// Local feed repository
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply environment overrides on top of the file values.
    ///
    /// - `COURIER_EVERY`: tick interval in seconds
    /// - `COURIER_BATCH_UPSERT`: index batch size
    /// - `MEILI_URL`, `MEILI_API_KEY`: search index endpoint
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("COURIER_EVERY") {
            match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.ingest.interval_secs = secs,
                _ => log::warn!("Ignoring invalid COURIER_EVERY={v:?}"),
            }
        }
        if let Some(v) = lookup("COURIER_BATCH_UPSERT") {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.ingest.batch_size = n,
                _ => {
                    return Err(AppError::config(
                        "COURIER_BATCH_UPSERT must be a positive integer",
                    ));
                }
            }
        }
        if let Some(v) = lookup("MEILI_URL") {
            self.index.url = v;
        }
        if let Some(v) = lookup("MEILI_API_KEY") {
            self.index.api_key = Some(v).filter(|k| !k.is_empty());
        }
        Ok(())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.backoff.floor_secs == 0 {
            return Err(AppError::validation("backoff.floor_secs must be > 0"));
        }
        if self.backoff.ceiling_secs < self.backoff.floor_secs {
            return Err(AppError::validation(
                "backoff.ceiling_secs must be >= backoff.floor_secs",
            ));
        }
        if !self.backoff.factor.is_finite() || self.backoff.factor < 1.0 {
            return Err(AppError::validation("backoff.factor must be >= 1.0"));
        }
        if self.ingest.interval_secs == 0 {
            return Err(AppError::validation("ingest.interval_secs must be > 0"));
        }
        if self.ingest.batch_size == 0 {
            return Err(AppError::validation("ingest.batch_size must be > 0"));
        }
        if url::Url::parse(&self.index.url).is_err() {
            return Err(AppError::validation(format!(
                "index.url is not a valid URL: {}",
                self.index.url
            )));
        }
        if self.index.name.trim().is_empty() {
            return Err(AppError::validation("index.name is empty"));
        }
        Ok(())
    }
}

/// HTTP client settings for feed fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::fetch_timeout(),
        }
    }
}

/// Exponential backoff applied to failing sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "defaults::backoff_floor")]
    pub floor_secs: u64,

    #[serde(default = "defaults::backoff_ceiling")]
    pub ceiling_secs: u64,

    #[serde(default = "defaults::backoff_factor")]
    pub factor: f64,
}

impl BackoffConfig {
    pub fn floor(&self) -> Duration {
        Duration::from_secs(self.floor_secs)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_secs(self.ceiling_secs)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor_secs: defaults::backoff_floor(),
            ceiling_secs: defaults::backoff_ceiling(),
            factor: defaults::backoff_factor(),
        }
    }
}

/// Crawl tick settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Time between ticks; also each tick's deadline
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Documents per bulk index call
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Maximum characters of sanitized entry text
    #[serde(default = "defaults::max_text_len")]
    pub max_text_len: usize,
}

impl IngestConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            batch_size: defaults::batch_size(),
            max_text_len: defaults::max_text_len(),
        }
    }
}

/// Search index endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "defaults::index_url")]
    pub url: String,

    #[serde(default = "defaults::index_name")]
    pub name: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "defaults::index_timeout")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: defaults::index_url(),
            name: defaults::index_name(),
            api_key: None,
            timeout_secs: defaults::index_timeout(),
        }
    }
}

/// Local repository settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding sources and entries
    #[serde(default = "defaults::storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: defaults::storage_path(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; courier/0.1)".into()
    }
    pub fn fetch_timeout() -> u64 {
        20
    }

    // Backoff defaults
    pub fn backoff_floor() -> u64 {
        30
    }
    pub fn backoff_ceiling() -> u64 {
        600
    }
    pub fn backoff_factor() -> f64 {
        2.0
    }

    // Ingest defaults
    pub fn interval() -> u64 {
        120
    }
    pub fn batch_size() -> usize {
        250
    }
    pub fn max_text_len() -> usize {
        2000
    }

    // Index defaults
    pub fn index_url() -> String {
        "http://127.0.0.1:7700".into()
    }
    pub fn index_name() -> String {
        "items".into()
    }
    pub fn index_timeout() -> u64 {
        15
    }

    pub fn storage_path() -> PathBuf {
        PathBuf::from("storage/courier.json")
    }
    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.backoff.floor(), Duration::from_secs(30));
        assert_eq!(config.backoff.ceiling(), Duration::from_secs(600));
        assert_eq!(config.backoff.factor, 2.0);
        assert_eq!(config.ingest.batch_size, 250);
        assert_eq!(config.ingest.interval(), Duration::from_secs(120));
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.fetcher.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.ingest.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_ceiling_below_floor() {
        let mut config = Config::default();
        config.backoff.ceiling_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_backoff_factor() {
        for factor in [0.5, f64::NAN, f64::INFINITY] {
            let mut config = Config::default();
            config.backoff.factor = factor;
            assert!(config.validate().is_err(), "factor {factor} accepted");
        }
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ingest]
            batch_size = 10

            [index]
            url = "http://search:7700"
            "#,
        )
        .unwrap();
        assert_eq!(config.ingest.batch_size, 10);
        assert_eq!(config.ingest.interval_secs, 120);
        assert_eq!(config.index.url, "http://search:7700");
        assert_eq!(config.index.name, "items");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[backoff]\nfloor_secs = 5\nceiling_secs = 60\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.backoff.floor_secs, 5);
        assert_eq!(config.backoff.ceiling_secs, 60);
    }

    #[test]
    fn load_or_default_falls_back() {
        let config = Config::load_or_default("/definitely/missing/config.toml");
        assert_eq!(config.ingest.batch_size, 250);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("COURIER_EVERY", "30"),
                ("COURIER_BATCH_UPSERT", "25"),
                ("MEILI_URL", "http://meili:7700"),
                ("MEILI_API_KEY", "secret"),
            ]))
            .unwrap();
        assert_eq!(config.ingest.interval_secs, 30);
        assert_eq!(config.ingest.batch_size, 25);
        assert_eq!(config.index.url, "http://meili:7700");
        assert_eq!(config.index.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn env_rejects_invalid_batch_size() {
        let mut config = Config::default();
        assert!(
            config
                .apply_overrides(env(&[("COURIER_BATCH_UPSERT", "0")]))
                .is_err()
        );
        assert!(
            config
                .apply_overrides(env(&[("COURIER_BATCH_UPSERT", "many")]))
                .is_err()
        );
    }

    #[test]
    fn env_ignores_invalid_interval() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[("COURIER_EVERY", "soon")]))
            .unwrap();
        assert_eq!(config.ingest.interval_secs, 120);
    }
}
