use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldqc_core::models::{DEFAULT_VALID_STATUSES, SCHEDULED_STATUS};

/// Largest number of order numbers the completion endpoint accepts per call.
pub const MAX_COMPLETION_BATCH: usize = 500;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    #[serde(default = "default_completion_path")]
    pub completion_path: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    #[serde(default = "default_completion_timeout_secs")]
    pub completion_timeout_secs: u64,
    #[serde(default)]
    pub search_timeout_secs: Option<u64>,
}

fn default_search_path() -> String {
    "orders/search".to_string()
}
fn default_completion_path() -> String {
    "orders/completion".to_string()
}
fn default_api_key_env() -> String {
    "FIELDQC_PROVIDER_API_KEY".to_string()
}
fn default_api_key_header() -> String {
    "X-API-KEY".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    60
}

impl ProviderConfig {
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    pub fn search_timeout(&self) -> Option<Duration> {
        self.search_timeout_secs.map(Duration::from_secs)
    }

    /// Read the provider credential from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| {
                format!(
                    "Provider API key not set. Export {} before fetching.",
                    self.api_key_env
                )
            })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_search_pages")]
    pub max_search_pages: usize,
    #[serde(default = "default_completion_batch_size")]
    pub completion_batch_size: usize,
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    #[serde(default = "default_import_batch_size")]
    pub import_batch_size: usize,
    #[serde(default = "default_valid_statuses")]
    pub valid_statuses: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_search_pages: default_max_search_pages(),
            completion_batch_size: default_completion_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            import_batch_size: default_import_batch_size(),
            valid_statuses: default_valid_statuses(),
        }
    }
}

fn default_max_search_pages() -> usize {
    50
}
fn default_completion_batch_size() -> usize {
    MAX_COMPLETION_BATCH
}
fn default_max_concurrent_batches() -> usize {
    8
}
fn default_import_batch_size() -> usize {
    25
}
fn default_valid_statuses() -> Vec<String> {
    DEFAULT_VALID_STATUSES.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// In-code configuration with every default applied. The database lives
    /// in `./data` and the provider URL points at localhost.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/fieldqc.sqlite"),
            },
            provider: ProviderConfig {
                base_url: "http://127.0.0.1:8080".to_string(),
                search_path: default_search_path(),
                completion_path: default_completion_path(),
                api_key_env: default_api_key_env(),
                api_key_header: default_api_key_header(),
                completion_timeout_secs: default_completion_timeout_secs(),
                search_timeout_secs: None,
            },
            pipeline: PipelineConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate provider
    if config.provider.base_url.trim().is_empty() {
        anyhow::bail!("provider.base_url must not be empty");
    }
    if config.provider.completion_timeout_secs == 0 {
        anyhow::bail!("provider.completion_timeout_secs must be > 0");
    }

    // Validate pipeline
    let pipeline = &config.pipeline;
    if pipeline.max_search_pages == 0 {
        anyhow::bail!("pipeline.max_search_pages must be > 0");
    }
    if !(1..=MAX_COMPLETION_BATCH).contains(&pipeline.completion_batch_size) {
        anyhow::bail!(
            "pipeline.completion_batch_size must be in [1, {}]",
            MAX_COMPLETION_BATCH
        );
    }
    if pipeline.max_concurrent_batches == 0 {
        anyhow::bail!("pipeline.max_concurrent_batches must be >= 1");
    }
    if pipeline.import_batch_size == 0 {
        anyhow::bail!("pipeline.import_batch_size must be >= 1");
    }
    validate_statuses(&pipeline.valid_statuses)?;

    Ok(())
}

/// Reject allow-lists that are empty or name `scheduled`, which can never pass.
pub fn validate_statuses(statuses: &[String]) -> Result<()> {
    if statuses.iter().all(|s| s.trim().is_empty()) {
        anyhow::bail!("pipeline.valid_statuses must name at least one status");
    }
    if statuses
        .iter()
        .any(|s| s.trim().eq_ignore_ascii_case(SCHEDULED_STATUS))
    {
        anyhow::bail!(
            "'{}' is not a terminal status and cannot be in valid_statuses",
            SCHEDULED_STATUS
        );
    }
    Ok(())
}
