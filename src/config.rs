use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub normalize: NormalizeConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Initial backoff, doubled after each retry
    pub backoff_ms: u64,
    /// `resultRecordCount` sent to feature services; `None` lets the service decide
    pub page_size: Option<usize>,
    /// Fetch offset pages concurrently when the service reports a total count
    pub parallel_pages: bool,
    /// Layers fetched and normalized at once
    pub concurrency: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            backoff_ms: 500,
            page_size: None,
            parallel_pages: false,
            concurrency: 4,
            user_agent: format!("precinct-lookup/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub max_age_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".precinct-cache"),
            max_age_hours: 24 * 7,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_age_hours)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Lower-case canonical string values
    pub casefold: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self { casefold: true }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}
