// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Cell models.

[`CellModel`] assembles a cell from a morphology, mechanisms and parameters.
[`HocCellModel`] wraps an existing template text. Both go through the same
[`ModelLifecycle`] so callers can freeze, instantiate and render either
without knowing which one they hold.
*/

mod cell_model;
mod hoc_cell_model;

pub use cell_model::CellModel;
pub use hoc_cell_model::HocCellModel;

use std::fmt;

use crate::error::ModelResult;
use crate::host::{CellHandle, Simulator};
use crate::parameter::ParamValues;
use crate::registry::InstanceRegistry;

/// Lifecycle shared by every cell model
pub trait ModelLifecycle: fmt::Display + fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Freeze the named parameters at the given values
    fn freeze(&mut self, values: &ParamValues) -> ModelResult<()>;

    fn unfreeze(&mut self, names: &[&str]) -> ModelResult<()>;

    /// Fails naming every unfrozen parameter not listed in `exempt`
    fn check_nonfrozen_params(&self, exempt: &[&str]) -> ModelResult<()>;

    /// Build a live cell in `sim`, counted in `registry`
    fn instantiate(&mut self, sim: &dyn Simulator, registry: &InstanceRegistry) -> ModelResult<()>;

    /// Tear down the live cell; no-op when not instantiated
    fn destroy(&mut self, sim: &dyn Simulator, registry: &InstanceRegistry) -> ModelResult<()>;

    /// Template text with `values` applied for the duration of the call
    fn render(&mut self, values: &ParamValues) -> ModelResult<String>;

    /// Live cell, if instantiated
    fn icell(&self) -> Option<CellHandle>;
}
