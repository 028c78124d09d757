//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pagepulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pagepulse/` (~/.config/pagepulse/)
//! - Data: `$XDG_DATA_HOME/pagepulse/` (~/.local/share/pagepulse/)
//! - State/Logs: `$XDG_STATE_HOME/pagepulse/` (~/.local/state/pagepulse/)

use crate::environment::PageContext;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

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
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tracker options
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Static page context reported by command-line producers
    #[serde(default)]
    pub page: PageContext,
}

/// Tracker options
///
/// Everything here is fixed once the tracker is built, except
/// `manual_flush` which can be toggled at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Site identifier sent with every batch (required)
    #[serde(default)]
    pub site_id: String,

    /// Collector endpoint for single events
    #[serde(default = "default_event_endpoint")]
    pub event_endpoint: String,

    /// Collector endpoint for batches (derived from `event_endpoint` when unset)
    #[serde(default)]
    pub batch_endpoint: Option<String>,

    /// Record an initial pageview when the tracker starts
    #[serde(default)]
    pub auto_track: bool,

    /// Log storage and delivery problems
    #[serde(default)]
    pub debug: bool,

    /// Queue length that triggers an immediate flush in auto mode
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Auto-mode flush timer period in milliseconds
    #[serde(default = "default_flush_interval_ms", alias = "flush_interval")]
    pub flush_interval_ms: u64,

    /// Mirror the queue to durable storage
    #[serde(default = "default_true")]
    pub enable_offline_tracking: bool,

    /// Minutes of inactivity before a session expires
    #[serde(default = "default_session_timeout", alias = "session_timeout")]
    pub session_timeout_minutes: u64,

    /// Percentage of observations admitted (0-100)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u8,

    /// Disable the flush timer and threshold triggers
    #[serde(default)]
    pub manual_flush: bool,

    /// Seconds between session expiry checks
    #[serde(default = "default_session_check_interval")]
    pub session_check_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            site_id: String::new(),
            event_endpoint: default_event_endpoint(),
            batch_endpoint: None,
            auto_track: false,
            debug: false,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            enable_offline_tracking: true,
            session_timeout_minutes: default_session_timeout(),
            sampling_rate: default_sampling_rate(),
            manual_flush: false,
            session_check_interval_secs: default_session_check_interval(),
        }
    }
}

fn default_event_endpoint() -> String {
    "http://localhost:8787/api/event".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_interval_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_session_timeout() -> u64 {
    30
}

fn default_sampling_rate() -> u8 {
    100
}

fn default_session_check_interval() -> u64 {
    60
}

impl TrackerConfig {
    /// Defaults for the given site
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            ..Default::default()
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.site_id.trim().is_empty() {
            return Err(Error::Config("tracker.site_id is required".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config(
                "tracker.batch_size must be at least 1".to_string(),
            ));
        }
        if self.sampling_rate > 100 {
            return Err(Error::Config(
                "tracker.sampling_rate must be between 0 and 100".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(Error::Config(
                "tracker.flush_interval_ms must be positive".to_string(),
            ));
        }
        if self.session_timeout_minutes == 0 {
            return Err(Error::Config(
                "tracker.session_timeout_minutes must be positive".to_string(),
            ));
        }
        if self.session_check_interval_secs == 0 {
            return Err(Error::Config(
                "tracker.session_check_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Endpoint that receives batches
    pub fn batch_endpoint(&self) -> String {
        match &self.batch_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("{}/batch", self.event_endpoint.trim_end_matches('/')),
        }
    }

    /// Get the configured flush interval
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Inactivity window after which a session is replaced
    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_timeout_minutes as i64)
    }

    /// Period of the session expiry timer
    pub fn session_check_interval(&self) -> Duration {
        Duration::from_secs(self.session_check_interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
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

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pagepulse/config.toml` (~/.config/pagepulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("pagepulse").join("config.toml")
    }

    /// Returns the data directory path (for the durable store)
    ///
    /// `$XDG_DATA_HOME/pagepulse/` (~/.local/share/pagepulse/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("pagepulse")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/pagepulse/` (~/.local/state/pagepulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("pagepulse")
    }

    /// Returns the durable store path
    ///
    /// `$XDG_DATA_HOME/pagepulse/state.db` (~/.local/share/pagepulse/state.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("state.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/pagepulse/pagepulse.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("pagepulse.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// For CLI binaries that want explicit, stable path behavior before
    /// invoking other components that read these env vars.
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
