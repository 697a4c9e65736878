// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ephys Configuration System
//!
//! Type-safe configuration loader for the cell-model assembly crates with
//! support for:
//! - TOML file parsing
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ephys_config::{load_config, EphysConfig};
//!
//! // Load configuration with automatic file discovery and overrides
//! let config: EphysConfig = load_config(None, None).expect("Failed to load config");
//!
//! println!("nseg frequency: {}", config.template.nseg_frequency);
//! println!("reference section: {}", config.scaler.reference_section);
//! ```
//!
//! Every section has a default, so an empty file (or no file at all, via
//! `EphysConfig::default()`) yields a usable configuration.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{apply_cli_overrides, apply_environment_overrides, find_config_file, load_config};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Re-export for convenience
pub use serde;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = EphysConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: EphysConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.template.nseg_frequency, config.template.nseg_frequency);
        assert_eq!(parsed.scaler.reference_section, "soma[0]");
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: ConfigError = toml::from_str::<EphysConfig>("[template\n").unwrap_err().into();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
