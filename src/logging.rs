// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bridge from the `[logging]` configuration section to the logging setup.

use crate::config::{EphysConfig, LoggingConfig as LoggingSection};
use crate::observability::{init_logging, parse_debug_flags, CrateDebugFlags, LoggingConfig, LoggingGuard};

/// Logging settings for a `[logging]` section.
///
/// `debug = true` enables debug output for every known crate on top of
/// `flags`.
pub fn logging_settings(
    section: &LoggingSection,
    mut flags: CrateDebugFlags,
) -> (LoggingConfig, CrateDebugFlags) {
    if section.debug {
        flags.enable_all();
    }
    (LoggingConfig::with_level(section.level.to_lowercase()), flags)
}

/// Install the subscriber described by `config`, merged with the process
/// debug flags (`--debug-<crate>`, `EPHYS_DEBUG`)
pub fn init_logging_from_config(config: &EphysConfig) -> anyhow::Result<LoggingGuard> {
    let (logging, flags) = logging_settings(&config.logging, parse_debug_flags());
    init_logging(&flags, &logging)
}
