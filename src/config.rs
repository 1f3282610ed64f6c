use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::HybridError;
use crate::orchestrator::{
    DEFAULT_CHECKPOINT_EVERY, DEFAULT_GRACE_PERIOD, DEFAULT_WORKERS, OrchestratorConfig,
};
use crate::query::{PlatformBias, SearchFilters};
use crate::retry::{DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use crate::search::{DEFAULT_PAGE_SIZE, DEFAULT_SAFETY_BOUND, DEFAULT_TARGET};

pub const DEFAULT_CONFIG_FILE: &str = "hybrid-finder.json";
pub const DEFAULT_EMAIL: &str = "user@example.com";
pub const DEFAULT_CHECKPOINT_PATH: &str = "hybrid_biosamples.checkpoint.json";
pub const DEFAULT_SEARCH_CHECKPOINT_PATH: &str = "hybrid_search.checkpoint.json";
pub const DEFAULT_OUTPUT_PATH: &str = "hybrid_biosamples.json";
pub const API_KEY_ENV: &str = "NCBI_API_KEY";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub checkpoint_every: Option<usize>,
    #[serde(default)]
    pub grace_period_secs: Option<u64>,
    #[serde(default)]
    pub checkpoint: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub retry: RetryEntry,
    #[serde(default)]
    pub search: SearchEntry,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetryEntry {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SearchEntry {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub pathogens: Vec<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub bias: Option<PlatformBias>,
    #[serde(default)]
    pub target: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub safety_bound: Option<usize>,
    #[serde(default)]
    pub checkpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub email: String,
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub orchestrator: OrchestratorConfig,
    pub retry: RetryPolicy,
    pub filters: SearchFilters,
    pub target: usize,
    pub page_size: usize,
    pub safety_bound: usize,
    pub checkpoint_path: Utf8PathBuf,
    /// Search progress keys on sample ids, so it never shares a file with
    /// the bulk checkpoint.
    pub search_checkpoint_path: Utf8PathBuf,
    pub output_path: Utf8PathBuf,
}

impl ResolvedConfig {
    pub fn validate(&self) -> Result<(), HybridError> {
        let positive = [
            ("batch_size", self.batch_size),
            ("workers", self.orchestrator.workers),
            ("checkpoint_every", self.orchestrator.checkpoint_every),
            ("search.page_size", self.page_size),
            ("retry.max_attempts", self.retry.max_attempts as usize),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(HybridError::InvalidSetting {
                    name: name.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.email.trim().is_empty() {
            return Err(HybridError::InvalidSetting {
                name: "email".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            email: DEFAULT_EMAIL.to_string(),
            api_key: None,
            batch_size: DEFAULT_BATCH_SIZE,
            orchestrator: OrchestratorConfig::default(),
            retry: RetryPolicy::default(),
            filters: SearchFilters::default(),
            target: DEFAULT_TARGET,
            page_size: DEFAULT_PAGE_SIZE,
            safety_bound: DEFAULT_SAFETY_BOUND,
            checkpoint_path: Utf8PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            search_checkpoint_path: Utf8PathBuf::from(DEFAULT_SEARCH_CHECKPOINT_PATH),
            output_path: Utf8PathBuf::from(DEFAULT_OUTPUT_PATH),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `hybrid-finder.json` from the working directory when
    /// present, and applies the `NCBI_API_KEY` environment variable.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HybridError> {
        let config = match path {
            Some(path) => Self::read(PathBuf::from(path))?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::read(default_path)?
                } else {
                    Config::default()
                }
            }
        };

        let mut resolved = Self::resolve_config(config)?;
        if let Ok(api_key) = std::env::var(API_KEY_ENV) {
            if !api_key.trim().is_empty() {
                resolved.api_key = Some(api_key.trim().to_string());
            }
        }
        Ok(resolved)
    }

    fn read(config_path: PathBuf) -> Result<Config, HybridError> {
        let content = fs::read_to_string(&config_path)
            .map_err(|_| HybridError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| HybridError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HybridError> {
        let defaults = ResolvedConfig::default();
        let search = config.search;

        let resolved = ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            email: config.email.unwrap_or(defaults.email),
            api_key: config
                .api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            batch_size: config.batch_size.unwrap_or(defaults.batch_size),
            orchestrator: OrchestratorConfig {
                workers: config.workers.unwrap_or(DEFAULT_WORKERS),
                checkpoint_every: config.checkpoint_every.unwrap_or(DEFAULT_CHECKPOINT_EVERY),
                grace_period: config
                    .grace_period_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_GRACE_PERIOD),
            },
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                backoff: config
                    .retry
                    .backoff_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_BACKOFF),
            },
            filters: SearchFilters {
                environment: search.environment,
                pathogens: search.pathogens,
                host: search.host,
                bias: search.bias.unwrap_or_default(),
            },
            target: search.target.unwrap_or(defaults.target),
            page_size: search.page_size.unwrap_or(defaults.page_size),
            safety_bound: search.safety_bound.unwrap_or(defaults.safety_bound),
            checkpoint_path: config
                .checkpoint
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.checkpoint_path),
            search_checkpoint_path: search
                .checkpoint
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.search_checkpoint_path),
            output_path: config
                .output
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.output_path),
        };
        resolved.validate()?;
        Ok(resolved)
    }
}
