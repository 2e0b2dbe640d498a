use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid scale_interval_secs: {0}. Must be at least 1")]
    InvalidScaleInterval(u64),

    #[error("Duplicate trigger id: {0}")]
    DuplicateTriggerId(String),

    #[error("Unknown trigger kind '{kind}' for trigger '{id}'")]
    UnknownTriggerKind { id: String, kind: String },

    #[error("Trigger '{0}' needs a url")]
    MissingTriggerUrl(String),

    #[error("Invalid HTTP method '{method}' for trigger '{id}'")]
    InvalidTriggerMethod { id: String, method: String },

    #[error("Failed to build HTTP client for trigger '{0}': {1}")]
    TriggerClient(String, String),

    #[error("Unknown scanner kind: {0}")]
    UnknownScannerKind(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. The YAML config file (optional; missing file means defaults)
    /// 3. Environment variables (NIGHTSHIFT_* prefix, highest priority)
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("NIGHTSHIFT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.scale_interval_secs == 0 {
            return Err(ConfigError::InvalidScaleInterval(config.scale_interval_secs));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let mut seen = std::collections::HashSet::new();
        for trigger in &config.triggers {
            if !seen.insert(trigger.id.as_str()) {
                return Err(ConfigError::DuplicateTriggerId(trigger.id.clone()));
            }
        }

        Ok(())
    }
}
