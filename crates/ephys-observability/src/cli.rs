// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! CLI argument parsing for per-crate debug flags
//!
//! Supports flags like `--debug-ephys-model` to enable debug output per crate.

use std::collections::HashMap;
use std::env;

use crate::{crate_target, KNOWN_CRATES};

/// Parse debug flags from command-line arguments
///
/// # Example
/// ```rust
/// use ephys_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-ephys-model".to_string()]);
/// assert!(flags.is_enabled("ephys-model"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrateDebugFlags {
    pub enabled_crates: HashMap<String, bool>,
}

impl CrateDebugFlags {
    /// Parse debug flags from command-line arguments
    ///
    /// Looks for arguments matching `--debug-{crate-name}` pattern.
    /// Also supports `--debug-all` to enable all crates.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();
        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
                continue;
            }
            if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enabled_crates.insert(crate_name.to_string(), true);
            }
        }
        flags
    }

    /// Enable every known crate
    pub fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enabled_crates.insert(crate_name.to_string(), true);
        }
    }

    /// Check if debug is enabled for a specific crate
    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains_key(crate_name)
    }

    /// Check if debug is enabled for any crate
    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// Get log level for a crate
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Create a tracing filter from debug flags
    ///
    /// Format: "ephys_model=debug,info", or just the default level when no
    /// crate is enabled.
    pub fn to_filter_string(&self, default_level: &str) -> String {
        let mut crates: Vec<&String> = self.enabled_crates.keys().collect();
        crates.sort();
        let mut filters: Vec<String> = crates
            .into_iter()
            .map(|name| format!("{}=debug", crate_target(name)))
            .collect();
        filters.push(default_level.to_string());
        filters.join(",")
    }
}

/// Parse debug flags from the process arguments and `EPHYS_DEBUG`
///
/// Environment variable format: comma-separated crate names, e.g.
/// "ephys-model,ephys-config", or "all".
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(env_var) = env::var("EPHYS_DEBUG") {
        apply_debug_env(&mut flags, &env_var);
    }
    flags
}

fn apply_debug_env(flags: &mut CrateDebugFlags, value: &str) {
    if value == "all" {
        flags.enable_all();
        return;
    }
    for crate_name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        flags.enabled_crates.insert(crate_name.to_string(), true);
    }
}

/// Generate help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  EPHYS_DEBUG={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  EPHYS_DEBUG=all                               Enable debug for all crates
"#,
        KNOWN_CRATES.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args() {
        let flags = CrateDebugFlags::from_args(vec![
            "prog".to_string(),
            "--debug-ephys-model".to_string(),
            "--verbose".to_string(),
        ]);
        assert!(flags.is_enabled("ephys-model"));
        assert!(!flags.is_enabled("ephys-config"));
        assert_eq!(flags.log_level("ephys-model"), tracing::Level::DEBUG);
        assert_eq!(flags.log_level("ephys-config"), tracing::Level::INFO);
    }

    #[test]
    fn test_debug_all() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        for crate_name in KNOWN_CRATES {
            assert!(flags.is_enabled(crate_name));
        }
    }

    #[test]
    fn test_filter_string() {
        let flags = CrateDebugFlags::default();
        assert_eq!(flags.to_filter_string("info"), "info");

        let flags = CrateDebugFlags::from_args(vec![
            "--debug-ephys-model".to_string(),
            "--debug-ephys".to_string(),
        ]);
        assert_eq!(
            flags.to_filter_string("warn"),
            "ephys=debug,ephys_model=debug,warn"
        );
    }

    #[test]
    fn test_env_value() {
        let mut flags = CrateDebugFlags::default();
        apply_debug_env(&mut flags, "ephys-model, ephys-config,");
        assert!(flags.is_enabled("ephys-model"));
        assert!(flags.is_enabled("ephys-config"));
        assert_eq!(flags.enabled_crates.len(), 2);
    }

    #[test]
    fn test_help_lists_crates() {
        assert!(debug_flags_help().contains("ephys-model"));
    }
}
