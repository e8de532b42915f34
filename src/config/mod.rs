//! Configuration System
//!
//! This module provides configuration management for the integration core using Figment.
//!
//! # Configuration Sources
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables prefixed with `ANALYZER_`
//! 2. TOML configuration file (default: `config/analyzer.toml`)
//! 3. Built-in defaults
//!
//! # Example
//!
//! ```no_run
//! use analyzer_core::config::AnalyzerConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load from default location
//!     let config = AnalyzerConfig::load()?;
//!
//!     // Or load from custom location
//!     let config = AnalyzerConfig::load_from("custom/path.toml")?;
//!
//!     println!("App name: {}", config.application.name);
//!     println!("Read timeout: {:?}", config.protocol.read_timeout());
//!     Ok(())
//! }
//! ```
//!
//! # Environment Variables
//!
//! Any value can be overridden with the `ANALYZER_` prefix. Nested keys are separated
//! by a double underscore so that key names may themselves contain underscores:
//!
//! ```text
//! ANALYZER_APPLICATION__LOG_LEVEL=debug
//! ANALYZER_PROTOCOL__READ_TIMEOUT_SECS=60
//! ANALYZER_LIFECYCLE__INACTIVITY_DAYS=14
//! ```

pub mod analyzer_config;

pub use analyzer_config::{
    AnalyzerConfig, ApplicationConfig, ConfigError, LifecycleConfig, LogFormat, PreviewConfig,
    ProtocolConfig,
};
