//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/eventsync/config.toml)
//! 3. Environment variables (EVENTSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::queue::RetryPolicy;

/// Environment variable prefix
const ENV_PREFIX: &str = "EVENTSYNC";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the persisted interaction state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the events REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token sent with API calls (anonymous when unset)
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Timeout for each background network call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Interval between scheduled sync attempts
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Interval between housekeeping sweeps
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Age after which idle cache entries and failed queue entries are evicted
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    /// Attempts before a failing pending change is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each further attempt
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Log file for `watch` mode (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: default_api_url(),
            auth_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            max_age_hours: default_max_age_hours(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (EVENTSYNC_DATA_DIR, EVENTSYNC_API_URL, ...)
    /// 2. Config file (~/.config/eventsync/config.toml or EVENTSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path from the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.reset_zero_periods();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        config.reset_zero_periods();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.api_url = val;
            }
        }

        // Empty string clears the token
        if let Ok(val) = std::env::var(format!("{}_AUTH_TOKEN", ENV_PREFIX)) {
            self.auth_token = if val.is_empty() { None } else { Some(val) };
        }

        if let Some(secs) = env_nonzero_u64("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs;
        }

        if let Some(secs) = env_nonzero_u64("SYNC_INTERVAL_SECS") {
            self.sync_interval_secs = secs;
        }

        if let Some(secs) = env_nonzero_u64("CLEANUP_INTERVAL_SECS") {
            self.cleanup_interval_secs = secs;
        }

        if let Some(hours) = env_u64("MAX_AGE_HOURS") {
            self.max_age_hours = hours;
        }

        if let Some(retries) = env_u64("MAX_RETRIES").and_then(|v| u32::try_from(v).ok()) {
            self.max_retries = retries;
        }

        if let Some(ms) = env_u64("RETRY_BASE_DELAY_MS") {
            self.retry_base_delay_ms = ms;
        }

        // Empty string clears the log file
        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
    }

    /// Replace zero timeouts and intervals with their defaults
    ///
    /// Timers cannot run with a zero period.
    fn reset_zero_periods(&mut self) {
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        if self.sync_interval_secs == 0 {
            self.sync_interval_secs = default_sync_interval_secs();
        }
        if self.cleanup_interval_secs == 0 {
            self.cleanup_interval_secs = default_cleanup_interval_secs();
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with EVENTSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eventsync")
            .join("config.toml")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours.saturating_mul(3600))
    }

    /// Retry policy for failed background syncs
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: i64::try_from(self.retry_base_delay_ms).unwrap_or(i64::MAX),
        }
    }
}

fn env_u64(suffix: &str) -> Option<u64> {
    std::env::var(format!("{}_{}", ENV_PREFIX, suffix))
        .ok()
        .and_then(|v| v.parse().ok())
}

/// Like `env_u64`, but zero is ignored
fn env_nonzero_u64(suffix: &str) -> Option<u64> {
    env_u64(suffix).filter(|&v| v > 0)
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("eventsync")
}

fn default_api_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    8
}

fn default_sync_interval_secs() -> u64 {
    15
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_max_age_hours() -> u64 {
    24
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}
