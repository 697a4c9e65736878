// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, EphysConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "ephys_configuration.toml";

/// Find the ephys configuration file
///
/// Search order:
/// 1. `EPHYS_CONFIG_PATH` environment variable
/// 2. Current working directory: `./ephys_configuration.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("EPHYS_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by EPHYS_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "ephys configuration file '{}' not found in any of these locations:\n{}\n\nSet EPHYS_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found, contains invalid TOML, or fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<EphysConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: EphysConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    crate::validate_config(&config)?;
    Ok(config)
}

fn parse_flag(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `EPHYS_LOG_LEVEL` -> `logging.level`
/// - `EPHYS_DEBUG_ALL` -> `logging.debug`
/// - `EPHYS_TEMPLATE_BANNER` -> `template.banner`
/// - `EPHYS_NSEG_FREQUENCY` -> `template.nseg_frequency`
/// - `EPHYS_REFERENCE_SECTION` -> `scaler.reference_section`
/// - `EPHYS_REFERENCE_POSITION` -> `scaler.reference_position`
pub fn apply_environment_overrides(config: &mut EphysConfig) {
    if let Ok(value) = env::var("EPHYS_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = env::var("EPHYS_DEBUG_ALL") {
        config.logging.debug = parse_flag(&value);
    }
    if let Ok(value) = env::var("EPHYS_TEMPLATE_BANNER") {
        config.template.banner = parse_flag(&value);
    }
    if let Ok(value) = env::var("EPHYS_NSEG_FREQUENCY") {
        if let Ok(frequency) = value.parse::<u32>() {
            config.template.nseg_frequency = frequency;
        }
    }
    if let Ok(value) = env::var("EPHYS_REFERENCE_SECTION") {
        config.scaler.reference_section = value;
    }
    if let Ok(value) = env::var("EPHYS_REFERENCE_POSITION") {
        if let Ok(position) = value.parse::<f64>() {
            config.scaler.reference_position = position;
        }
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"log_level": "debug", "banner": "false"}`)
pub fn apply_cli_overrides(config: &mut EphysConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    if let Some(value) = cli_args.get("debug") {
        config.logging.debug = parse_flag(value);
    }
    if let Some(value) = cli_args.get("banner") {
        config.template.banner = parse_flag(value);
    }
    if let Some(value) = cli_args.get("nseg_frequency") {
        if let Ok(frequency) = value.parse::<u32>() {
            config.template.nseg_frequency = frequency;
        }
    }
    if let Some(value) = cli_args.get("ignored_globals") {
        config.template.ignored_globals = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(value) = cli_args.get("reference_section") {
        config.scaler.reference_section = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("EPHYS_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("EPHYS_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("EPHYS_CONFIG_PATH", "/definitely/not/here.toml");
        let result = find_config_file();
        env::remove_var("EPHYS_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::remove_var("EPHYS_NSEG_FREQUENCY");
        env::remove_var("EPHYS_TEMPLATE_BANNER");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[template]").unwrap();
        writeln!(file, "nseg_frequency = 20").unwrap();
        writeln!(file, "[scaler]").unwrap();
        writeln!(file, "reference_position = 0.0").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.template.nseg_frequency, 20);
        assert!(config.template.banner);
        assert_eq!(config.scaler.reference_position, 0.0);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::remove_var("EPHYS_NSEG_FREQUENCY");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[scaler]\nreference_position = 2.5\n").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = EphysConfig::default();

        env::set_var("EPHYS_NSEG_FREQUENCY", "100");
        env::set_var("EPHYS_TEMPLATE_BANNER", "no");
        env::set_var("EPHYS_REFERENCE_SECTION", "soma[1]");

        apply_environment_overrides(&mut config);

        env::remove_var("EPHYS_NSEG_FREQUENCY");
        env::remove_var("EPHYS_TEMPLATE_BANNER");
        env::remove_var("EPHYS_REFERENCE_SECTION");

        assert_eq!(config.template.nseg_frequency, 100);
        assert!(!config.template.banner);
        assert_eq!(config.scaler.reference_section, "soma[1]");
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = EphysConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("banner".to_string(), "false".to_string());
        cli_args.insert("ignored_globals".to_string(), "celsius, v_init".to_string());

        apply_cli_overrides(&mut config, &cli_args);

        assert!(!config.template.banner);
        assert_eq!(config.template.ignored_globals, vec!["celsius", "v_init"]);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[template]").unwrap();
        writeln!(file, "nseg_frequency = 10").unwrap();
        writeln!(file, "[logging]").unwrap();
        writeln!(file, "level = \"warn\"").unwrap();

        env::set_var("EPHYS_NSEG_FREQUENCY", "30");
        env::set_var("EPHYS_LOG_LEVEL", "debug");

        let mut cli_args = HashMap::new();
        cli_args.insert("nseg_frequency".to_string(), "50".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("EPHYS_NSEG_FREQUENCY");
        env::remove_var("EPHYS_LOG_LEVEL");

        // CLI wins for nseg frequency, env wins for log level (no CLI override)
        assert_eq!(config.template.nseg_frequency, 50);
        assert_eq!(config.logging.level, "debug");
    }
}
