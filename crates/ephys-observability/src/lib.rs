// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ephys-observability
//!
//! Logging setup shared by every ephys crate.
//!
//! Library crates only emit `tracing` events; applications call
//! [`init_logging`] once to install a subscriber whose filter is derived
//! from per-crate debug flags.
//!
//! ## Features
//! - `file-logging`: JSON log files in timestamped run folders (desktop only)

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known ephys crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &["ephys", "ephys-model", "ephys-config"];

/// Tracing target for a crate name (`ephys-model` logs under `ephys_model`)
pub fn crate_target(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}
