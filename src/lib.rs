// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ephys - parameterized biophysical cell models
//!
//! Builds neuron models out of a morphology, density mechanisms and
//! parameters, then either instantiates them in a simulator session or
//! renders a self-contained HOC template that rebuilds the same cell.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! ephys = "0.3"  # Default: config + observability
//! ```
//!
//! ## Feature Flags
//!
//! - **`config`** (default): TOML configuration loader (`ephys::config`)
//! - **`observability`** (default): logging initialization and per-crate
//!   debug flags (`ephys::observability`)
//! - **`file-logging`**: rotating log files under timestamped run folders
//!
//! With both `config` and `observability`, `ephys::logging` turns the
//! `[logging]` section of the configuration file into a subscriber.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ephys::prelude::*;
//!
//! let sim = MemorySimulator::new();
//! sim.register_morphology("simple.swc", MorphologySpec::simple_cell())?;
//!
//! let somatic: Arc<dyn Location> = Arc::new(SeclistLocation::of("somatic")?);
//! let mut cell = CellModel::new(
//!     "simple_cell",
//!     Arc::new(FileMorphology::new("simple.swc")),
//!     vec![Box::new(DensityMechanism::new("hh", "hh", vec![somatic.clone()])?)],
//!     vec![RangeParameter::new("gnabar_hh", "gnabar_hh", vec![somatic])?
//!         .with_bounds(0.05, 0.125)?
//!         .into()],
//! )?;
//!
//! // Render a template for a given parameter set, leaving the model untouched
//! let hoc = cell.create_hoc(&ParamValues::new().with("gnabar_hh", 0.1))?;
//!
//! // Or build a live cell
//! cell.freeze(&ParamValues::new().with("gnabar_hh", 0.1))?;
//! cell.instantiate(&sim, InstanceRegistry::global())?;
//! cell.destroy(&sim, InstanceRegistry::global())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: ephys-config                               │
//! │  (template options, scaler reference point, logging)    │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Infrastructure: ephys-observability                    │
//! │  (tracing subscriber, per-crate debug flags)            │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Models: ephys-model                                    │
//! │  (parameters, scalers, registry, HOC generation)        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

// Re-export the model layer
pub use ephys_model as model;

// Re-export infrastructure
#[cfg(feature = "config")]
pub use ephys_config as config;

#[cfg(feature = "observability")]
pub use ephys_observability as observability;

#[cfg(all(feature = "config", feature = "observability"))]
pub mod logging;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::model::prelude::*;

    #[cfg(feature = "config")]
    pub use crate::config::{load_config, EphysConfig, ScalerConfig, TemplateConfig};

    #[cfg(feature = "observability")]
    pub use crate::observability::{init_logging, parse_debug_flags, CrateDebugFlags};

    #[cfg(all(feature = "config", feature = "observability"))]
    pub use crate::logging::init_logging_from_config;
}
