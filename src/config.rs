//! Configuration module

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration, read from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub rollover: RolloverSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "fleet_swap=debug")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Settings for the periodic summary rollover job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloverSettings {
    /// How often to roll summaries forward, in seconds
    pub interval_secs: u64,
}

impl Default for RolloverSettings {
    fn default() -> Self {
        Self { interval_secs: 3600 }
    }
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Default configuration file location (~/.config/fleet-swap/config.toml)
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleet-swap")
        .join("config.toml")
}

// ── Tests ──────────────────────────────────────────────────────
