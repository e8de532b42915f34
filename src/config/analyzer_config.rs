//! Configuration loading using Figment
//!
//! Strongly-typed configuration for the protocol engine, the lifecycle scheduler and the
//! mapping preview. Every section has defaults so a missing file still yields a usable
//! configuration; values that are present are validated after extraction.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong type
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// A value was out of range
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyzerConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Wire protocol and active-query settings
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Lifecycle scheduler settings
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Mapping preview limits
    #[serde(default)]
    pub preview: PreviewConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Wire protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Per-read timeout in seconds while an exchange is running
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Reject inbound frames whose checksum does not match
    #[serde(default)]
    pub verify_inbound_checksum: bool,
    /// Sender name placed in the query header record
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
}

/// Lifecycle scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Days without activation after which an ACTIVE analyzer goes OFFLINE
    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: u32,
    /// Hour of day (UTC) at which the sweep runs
    #[serde(default = "default_sweep_hour")]
    pub sweep_hour_utc: u32,
    /// Failure count above which the sweep logs a warning summary
    #[serde(default = "default_failure_threshold")]
    pub failure_warning_threshold: usize,
    /// Capacity of the status-change broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

/// Mapping preview configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Largest sample message accepted by the preview, in bytes
    #[serde(default = "default_preview_max")]
    pub max_message_bytes: usize,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "analyzer-core".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_read_timeout() -> u64 {
    300
}

fn default_sender_name() -> String {
    "AnalyzerCore".to_string()
}

fn default_inactivity_days() -> u32 {
    7
}

fn default_sweep_hour() -> u32 {
    2
}

fn default_failure_threshold() -> usize {
    3
}

fn default_event_capacity() -> usize {
    64
}

fn default_preview_max() -> usize {
    10 * 1024
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            verify_inbound_checksum: false,
            sender_name: default_sender_name(),
        }
    }
}

impl ProtocolConfig {
    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-byte read timeout as a `Duration`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            inactivity_days: default_inactivity_days(),
            sweep_hour_utc: default_sweep_hour(),
            failure_warning_threshold: default_failure_threshold(),
            event_channel_capacity: default_event_capacity(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_preview_max(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl AnalyzerConfig {
    /// Load configuration from `config/analyzer.toml` and environment variables
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file is malformed or validation fails. A missing
    /// file is not an error; defaults apply.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/analyzer.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file (relative or absolute)
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(AnalyzerConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ANALYZER_").split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Timeouts are non-zero
    /// - Sender name is usable inside a header record
    /// - Sweep hour is a valid hour of day
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.protocol.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.protocol.read_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "read_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let sender = self.protocol.sender_name.trim();
        if sender.is_empty() || sender.contains('|') || sender.contains('^') {
            return Err(ConfigError::ValidationError(format!(
                "Invalid sender_name '{}'. Must be non-empty and contain no '|' or '^'",
                self.protocol.sender_name
            )));
        }

        if self.lifecycle.inactivity_days == 0 {
            return Err(ConfigError::ValidationError(
                "inactivity_days must be at least 1".to_string(),
            ));
        }
        if self.lifecycle.sweep_hour_utc > 23 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid sweep_hour_utc {}. Must be 0-23",
                self.lifecycle.sweep_hour_utc
            )));
        }
        if self.lifecycle.event_channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
