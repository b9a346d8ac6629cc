//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/planwise/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/planwise/` (~/.config/planwise/)
//! - Data: `$XDG_DATA_HOME/planwise/` (~/.local/share/planwise/)
//! - State/Logs: `$XDG_STATE_HOME/planwise/` (~/.local/state/planwise/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `api.base_url`
pub const API_URL_ENV: &str = "PLANWISE_API_URL";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Backend API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Countdown timer configuration
    #[serde(default)]
    pub timers: TimerConfig,

    /// Local storage overrides
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Base URL of the REST API, e.g. `https://api.example.com/api/v1`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Default page size for list requests
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            page_size: default_page_size(),
        }
    }
}

impl ApiConfig {
    /// Config pointing at `base_url` with default timeouts (handy in tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api.base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "api.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(Error::Config(
                "api.page_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://localhost:3000/api/v1".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    20
}

/// Countdown timer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TimerConfig {
    /// Interval between countdown ticks
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    /// Minimum wall-clock interval between persisted countdown snapshots
    #[serde(default = "default_persist_interval")]
    pub persist_interval_millis: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            persist_interval_millis: default_persist_interval(),
        }
    }
}

impl TimerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_millis(self.persist_interval_millis)
    }
}

fn default_tick_millis() -> u64 {
    1000
}

fn default_persist_interval() -> u64 {
    1000
}

/// Local storage overrides
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    /// Directory for the JSON key-value cache
    pub cache_dir: Option<PathBuf>,
    /// File holding the session token pair
    pub secrets_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        if self.timers.tick_millis == 0 {
            return Err(Error::Config(
                "timers.tick_millis must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/planwise/config.toml` (~/.config/planwise/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("planwise").join("config.toml")
    }

    /// Returns the data directory path (for the cache and credentials)
    ///
    /// `$XDG_DATA_HOME/planwise/` (~/.local/share/planwise/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("planwise")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/planwise/` (~/.local/state/planwise/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("planwise")
    }

    /// Returns the key-value cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.storage
            .cache_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("cache"))
    }

    /// Returns the credentials file path
    pub fn secrets_path(&self) -> PathBuf {
        self.storage
            .secrets_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("credentials.json"))
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
