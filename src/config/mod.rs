//! Configuration management for imgfetch
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use imgfetch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Downloading into: {}", config.download.output_folder.display());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `IMGFETCH__<section>__<key>`
//!
//! Examples:
//! - `IMGFETCH__SOURCE__FILE=catalog.csv`
//! - `IMGFETCH__DOWNLOAD__MAX_CONCURRENT_DOWNLOADS=32`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/imgfetch.toml`.
//! This can be overridden using the `IMGFETCH_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use models::{Config, DownloadConfig, ReportConfig, SourceConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`IMGFETCH__*`)
    /// 2. TOML file (default: `config/imgfetch.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation
    /// fails (zero concurrency bound, inverted pacing range, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
