use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actor::RetryConfig;
use crate::constants::{
    DEFAULT_LOG_FILTER, PAGE_SIZE, PENDING_POLL_SECS, SYNC_BACKOFF_FACTOR, SYNC_INITIAL_DELAY_MS,
    SYNC_MAX_ATTEMPTS, SYNC_MAX_DELAY_MS, UNDO_BANNER_MS,
};
use crate::error::CoreError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub list: ListConfig,
    #[serde(default)]
    pub undo: UndoConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListConfig {
    /// Items requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoConfig {
    /// How long the undo banner stays visible
    #[serde(default = "default_banner_ms")]
    pub banner_ms: u64,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            banner_ms: default_banner_ms(),
        }
    }
}

impl UndoConfig {
    pub fn banner_duration(&self) -> Duration {
        Duration::from_millis(self.banner_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Seconds between polls of the offline queue size
    #[serde(default = "default_pending_poll_secs")]
    pub pending_poll_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            pending_poll_secs: default_pending_poll_secs(),
        }
    }
}

impl SyncConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_factor,
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn pending_poll_interval(&self) -> Duration {
        Duration::from_secs(self.pending_poll_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Write to a log file in the data directory instead of stderr
    #[serde(default = "default_true")]
    pub to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            to_file: true,
        }
    }
}

fn default_page_size() -> usize {
    PAGE_SIZE
}

fn default_banner_ms() -> u64 {
    UNDO_BANNER_MS
}

fn default_max_attempts() -> u32 {
    SYNC_MAX_ATTEMPTS
}

fn default_initial_delay_ms() -> u64 {
    SYNC_INITIAL_DELAY_MS
}

fn default_backoff_factor() -> f64 {
    SYNC_BACKOFF_FACTOR
}

fn default_max_delay_ms() -> u64 {
    SYNC_MAX_DELAY_MS
}

fn default_pending_poll_secs() -> u64 {
    PENDING_POLL_SECS
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("inboxflow");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_local_dir()
            .context("Could not find data directory")?
            .join("inboxflow");
        Ok(dir)
    }

    /// Load from the default location; a missing file means defaults
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.list.page_size == 0 {
            return Err(CoreError::validation("list.page_size must be greater than 0"));
        }
        if self.sync.max_attempts == 0 {
            return Err(CoreError::validation("sync.max_attempts must be at least 1"));
        }
        if self.sync.backoff_factor.is_nan() || self.sync.backoff_factor < 1.0 {
            return Err(CoreError::validation("sync.backoff_factor must be >= 1.0"));
        }
        if self.sync.initial_delay_ms > self.sync.max_delay_ms {
            return Err(CoreError::validation(
                "sync.initial_delay_ms must not exceed sync.max_delay_ms",
            ));
        }
        Ok(())
    }
}
