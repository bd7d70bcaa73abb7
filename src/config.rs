use crate::db::connection::RetryPolicy;
use crate::db::schema::validate_schema_name;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub schema_name: String,
    pub max_retries: u32,
    pub retry_interval: Duration,
    pub on_existing: OnExisting,
    pub output: OutputFormat,
}

/// How an already existing schema is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExisting {
    Prompt,
    Retain,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let data_dir = env_map
            .get("DATA_DIR")
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingEnv("DATA_DIR".to_string()))?;

        let schema_name = env_map
            .get("SCHEMA_NAME")
            .cloned()
            .unwrap_or_else(|| "hrv_dataset".to_string());
        validate_schema_name(&schema_name)
            .map_err(|e| ConfigError::InvalidValue("SCHEMA_NAME".to_string(), e.to_string()))?;

        let max_retries = env_map
            .get("CONNECT_MAX_RETRIES")
            .map(|s| s.as_str())
            .unwrap_or("5")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "CONNECT_MAX_RETRIES".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;

        let retry_interval = env_map
            .get("CONNECT_RETRY_INTERVAL_SECS")
            .map(|s| s.as_str())
            .unwrap_or("60")
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "CONNECT_RETRY_INTERVAL_SECS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        let on_existing = match env_map
            .get("ON_EXISTING_SCHEMA")
            .map(|s| s.as_str())
            .unwrap_or("prompt")
        {
            "prompt" => OnExisting::Prompt,
            "retain" => OnExisting::Retain,
            "replace" => OnExisting::Replace,
            other => {
                return Err(ConfigError::InvalidValue(
                    "ON_EXISTING_SCHEMA".to_string(),
                    format!("must be prompt, retain, or replace, got {}", other),
                ))
            }
        };

        let output = match env_map
            .get("PROVISION_OUTPUT")
            .map(|s| s.as_str())
            .unwrap_or("text")
        {
            "text" => OutputFormat::Text,
            "json" => OutputFormat::Json,
            other => {
                return Err(ConfigError::InvalidValue(
                    "PROVISION_OUTPUT".to_string(),
                    format!("must be text or json, got {}", other),
                ))
            }
        };

        Ok(Config {
            data_dir,
            schema_name,
            max_retries,
            retry_interval,
            on_existing,
            output,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_interval)
    }
}
