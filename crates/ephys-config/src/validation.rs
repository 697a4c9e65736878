// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures configuration values are within valid ranges and that generated
//! templates will only ever declare legal HOC identifiers.

use crate::{ConfigError, ConfigResult, EphysConfig};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Required fields
/// - Identifier syntax of section list / array names
/// - Valid value ranges
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &EphysConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_identifiers(config, &mut errors);
    validate_value_ranges(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_required_fields(config: &EphysConfig, errors: &mut Vec<ConfigValidationError>) {
    if !config.template.seclist_names.iter().any(|s| s == "all") {
        errors.push(ConfigValidationError::MissingRequired {
            field: "template.seclist_names: 'all'".to_string(),
        });
    }
    if config.scaler.reference_section.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "scaler.reference_section".to_string(),
        });
    }
    if config.logging.level.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "logging.level".to_string(),
        });
    }
}

fn validate_identifiers(config: &EphysConfig, errors: &mut Vec<ConfigValidationError>) {
    let lists = config
        .template
        .seclist_names
        .iter()
        .map(|n| ("template.seclist_names", n))
        .chain(
            config
                .template
                .secarray_names
                .iter()
                .map(|n| ("template.secarray_names", n)),
        );
    for (field, name) in lists {
        if !is_identifier(name) {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: format!("'{}' is not a valid identifier", name),
            });
        }
    }
}

fn validate_value_ranges(config: &EphysConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.template.nseg_frequency == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "template.nseg_frequency".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    let position = config.scaler.reference_position;
    if !(0.0..=1.0).contains(&position) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "scaler.reference_position".to_string(),
            reason: "must be between 0.0 and 1.0".to_string(),
        });
    }

    if !config.template.distance_placeholder.starts_with('%') {
        errors.push(ConfigValidationError::InvalidValue {
            field: "template.distance_placeholder".to_string(),
            reason: "must be a printf conversion such as '%.17g'".to_string(),
        });
    }

    let level = config.logging.level.to_lowercase();
    if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: "must be one of trace, debug, info, warn, error".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EphysConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_all_seclist() {
        let mut config = EphysConfig::default();
        config.template.seclist_names.retain(|s| s != "all");

        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("'all'")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_identifier() {
        let mut config = EphysConfig::default();
        config.template.secarray_names.push("3dend".to_string());

        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("template.secarray_names"));
                assert!(msg.contains("3dend"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = EphysConfig::default();
        config.template.nseg_frequency = 0;
        config.scaler.reference_position = -0.1;
        config.logging.level = "verbose".to_string();

        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("template.nseg_frequency"));
                assert!(msg.contains("scaler.reference_position"));
                assert!(msg.contains("logging.level"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
