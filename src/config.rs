use crate::constants;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Retry behaviour the runner applies uniformly to every stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: constants::DEFAULT_MAX_RETRIES,
            retry_delay_secs: constants::DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            retry_delay_secs: 0,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Configuration for a pipeline run. Each run keeps its own clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    pub description: String,
    pub data_dir: PathBuf,
    pub raw_file: String,
    pub transformed_file: String,
    pub database_file: String,
    pub table_name: String,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: constants::PIPELINE_NAME.to_string(),
            description: constants::PIPELINE_DESCRIPTION.to_string(),
            data_dir: PathBuf::from(constants::DEFAULT_DATA_DIR),
            raw_file: constants::RAW_DATA_FILE.to_string(),
            transformed_file: constants::TRANSFORMED_DATA_FILE.to_string(),
            database_file: constants::DATABASE_FILE.to_string(),
            table_name: constants::PURCHASES_TABLE.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ETL_DATA_DIR`, `ETL_MAX_RETRIES` and `ETL_RETRY_DELAY_SECS`
    /// when set.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        self.apply_overrides(|k| std::env::var(k).ok())?;
        Ok(self)
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = get("ETL_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("ETL_MAX_RETRIES") {
            self.retry.max_retries = v.trim().parse().map_err(|_| {
                PipelineError::Config(format!("ETL_MAX_RETRIES must be a non-negative integer, got '{v}'"))
            })?;
        }
        if let Some(v) = get("ETL_RETRY_DELAY_SECS") {
            self.retry.retry_delay_secs = v.trim().parse().map_err(|_| {
                PipelineError::Config(format!("ETL_RETRY_DELAY_SECS must be a non-negative integer, got '{v}'"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("raw_file", &self.raw_file),
            ("transformed_file", &self.transformed_file),
            ("database_file", &self.database_file),
            ("table_name", &self.table_name),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::Config(format!("{field} must not be empty")));
            }
        }
        if self.raw_file == self.transformed_file {
            return Err(PipelineError::Config(
                "raw_file and transformed_file must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn raw_path(&self) -> PathBuf {
        self.data_dir.join(&self.raw_file)
    }

    pub fn transformed_path(&self) -> PathBuf {
        self.data_dir.join(&self.transformed_file)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}
