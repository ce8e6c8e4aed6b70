//! Configuration for the ingestion pipeline

mod logging;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Default user agent for page fetches
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for the listing database and the raw page cache
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".vehicle-ledger"),
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("listings.sled")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("raw_html")
    }
}

/// How pages are retrieved from the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Plain HTTP straight to the marketplace
    Direct,
    /// HTTP through a hosted scraping API that proxies and renders pages
    ScrapingApi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub mode: FetchMode,
    /// Scraping API endpoint, used in `scraping_api` mode
    pub endpoint: String,
    /// Environment variable holding the scraping API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Render detail pages in headless Chrome instead of plain HTTP
    pub use_browser: bool,
    /// Seconds to let a browser tab settle after navigation
    pub browser_settle_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::Direct,
            endpoint: "https://app.scrapingbee.com/api/v1/".to_string(),
            api_key_env: "SCRAPING_API_KEY".to_string(),
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            use_browser: false,
            browser_settle_secs: 5,
        }
    }
}

impl FetchConfig {
    /// Resolve the API key for `scraping_api` mode.
    ///
    /// Returns `None` in direct mode. A missing or blank key is fatal and must
    /// be reported before any network call is attempted.
    pub fn resolve_api_key(&self) -> Result<Option<String>, PipelineError> {
        if self.mode == FetchMode::Direct {
            return Ok(None);
        }
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(Some(key.trim().to_string())),
            Ok(_) => Err(PipelineError::Credentials(format!("{} is empty", self.api_key_env))),
            Err(_) => Err(PipelineError::Credentials(format!("{} is not set", self.api_key_env))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_index_pages: u32,
    pub detail_batch_size: usize,
    pub detail_concurrency: usize,
    /// Delay between network calls (milliseconds)
    pub request_delay_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Consecutive detail failures before the detail phase aborts
    pub max_consecutive_failures: u32,
    /// Index page duplicate rate (percent) at which pagination stops
    pub stop_duplicate_rate: f64,
    /// Upper bound on URLs per existence check
    pub dedup_batch_size: usize,
    /// Informational cost of one network fetch, for cost-avoided estimates
    pub cost_per_fetch: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_index_pages: 10,
            detail_batch_size: 20,
            detail_concurrency: 3,
            request_delay_ms: 1500,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            max_consecutive_failures: 5,
            stop_duplicate_rate: 80.0,
            dedup_batch_size: 100,
            cost_per_fetch: 0.002,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Global price floor (USD)
    pub min_price: i64,
    /// Global price ceiling (USD)
    pub max_price: i64,
    pub max_miles_per_year: i64,
    /// Year used to resolve VIN model-year cycles; defaults to the current year
    pub reference_year: Option<i32>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_price: 1_000,
            max_price: 25_000_000,
            max_miles_per_year: 40_000,
            reference_year: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate all fields, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        let p = &self.pipeline;

        if p.max_index_pages == 0 {
            errors.push("max_index_pages must be positive".to_string());
        }
        if p.detail_batch_size == 0 {
            errors.push("detail_batch_size must be positive".to_string());
        }
        if p.detail_concurrency == 0 {
            errors.push("detail_concurrency must be positive".to_string());
        }
        if p.max_consecutive_failures == 0 {
            errors.push("max_consecutive_failures must be positive".to_string());
        }
        if p.dedup_batch_size == 0 || p.dedup_batch_size > 100 {
            errors.push("dedup_batch_size must be between 1 and 100".to_string());
        }
        if !(0.0..=100.0).contains(&p.stop_duplicate_rate) {
            errors.push("stop_duplicate_rate must be a percentage between 0 and 100".to_string());
        }
        if p.cost_per_fetch < 0.0 {
            errors.push("cost_per_fetch must not be negative".to_string());
        }

        let v = &self.validation;
        if v.min_price <= 0 {
            errors.push("min_price must be positive".to_string());
        }
        if v.max_price <= v.min_price {
            errors.push(format!(
                "max_price ({}) must exceed min_price ({})",
                v.max_price, v.min_price
            ));
        }
        if v.max_miles_per_year <= 0 {
            errors.push("max_miles_per_year must be positive".to_string());
        }

        if self.fetch.timeout_secs == 0 {
            errors.push("fetch timeout_secs must be positive".to_string());
        }
        if self.fetch.mode == FetchMode::ScrapingApi && self.fetch.endpoint.trim().is_empty() {
            errors.push("scraping_api mode requires an endpoint".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration:\n  - {}", errors.join("\n  - "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            max_index_pages = 3

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.max_index_pages, 3);
        assert_eq!(config.pipeline.dedup_batch_size, 100);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.fetch.mode, FetchMode::Direct);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = Config::default();
        config.pipeline.detail_batch_size = 0;
        config.pipeline.dedup_batch_size = 500;
        config.validation.max_price = 10;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("detail_batch_size"));
        assert!(err.contains("dedup_batch_size"));
        assert!(err.contains("max_price"));
    }

    #[test]
    fn test_direct_mode_needs_no_key() {
        let fetch = FetchConfig::default();
        assert!(fetch.resolve_api_key().unwrap().is_none());
    }

    #[test]
    fn test_scraping_api_mode_without_key_is_fatal() {
        let fetch = FetchConfig {
            mode: FetchMode::ScrapingApi,
            api_key_env: "VEHICLE_LEDGER_TEST_UNSET_KEY".to_string(),
            ..FetchConfig::default()
        };
        assert!(matches!(fetch.resolve_api_key(), Err(PipelineError::Credentials(_))));
    }
}
