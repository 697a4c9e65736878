// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `ephys_configuration.toml`.

use serde::{Deserialize, Serialize};

/// Section lists every generated template declares, in rendering order.
pub const DEFAULT_SECLIST_NAMES: &[&str] =
    &["all", "somatic", "apical", "axonal", "basal", "myelinated"];

/// Section arrays every generated template creates.
pub const DEFAULT_SECARRAY_NAMES: &[&str] = &["soma", "dend", "apic", "axon", "myelin"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EphysConfig {
    pub template: TemplateConfig,
    pub scaler: ScalerConfig,
    pub logging: LoggingConfig,
}

/// HOC template generation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Emit the "Created by" comment with a timestamp at the top of the template
    pub banner: bool,
    /// Frequency handed to `geom_nseg_fixed` when the template discretizes sections
    pub nseg_frequency: u32,
    /// Section lists declared by templates (`all` must be present)
    pub seclist_names: Vec<String>,
    /// Section arrays created by templates
    pub secarray_names: Vec<String>,
    /// Global parameters that are left out of the rendered text
    pub ignored_globals: Vec<String>,
    /// Token left in distance formulas, bound per segment by the template's `sprint`
    pub distance_placeholder: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            banner: true,
            nseg_frequency: 40,
            seclist_names: DEFAULT_SECLIST_NAMES.iter().map(|s| s.to_string()).collect(),
            secarray_names: DEFAULT_SECARRAY_NAMES.iter().map(|s| s.to_string()).collect(),
            ignored_globals: Vec::new(),
            distance_placeholder: "%.17g".to_string(),
        }
    }
}

/// Reference point used by distance-dependent scalers
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScalerConfig {
    pub reference_section: String,
    /// Normalized position along the reference section (0.0 - 1.0)
    pub reference_position: f64,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            reference_section: "soma[0]".to_string(),
            reference_position: 0.5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable debug output for every ephys crate
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug: false,
        }
    }
}
