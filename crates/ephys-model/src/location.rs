// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Locations: sets of sections on a live cell that mechanisms and parameters
//! apply to.

use std::fmt;

use crate::error::{validate_name, ModelResult};
use crate::host::{CellHandle, SectionHandle, Segment, Simulator};

/// Resolves to sections of a live cell
pub trait Location: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Section list the location stands for in generated templates.
    /// Locations without one cannot be rendered.
    fn seclist_name(&self) -> Option<&str> {
        None
    }

    fn instantiate(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<Vec<SectionHandle>>;

    /// Every segment of every section, in section order
    fn segments(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<Vec<Segment>> {
        let mut segments = Vec::new();
        for section in self.instantiate(sim, cell)? {
            segments.extend(sim.segments(section)?);
        }
        Ok(segments)
    }
}

/// All sections of a named section list (`somatic`, `apical`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeclistLocation {
    name: String,
    seclist_name: String,
}

impl SeclistLocation {
    pub fn new(name: impl Into<String>, seclist_name: impl Into<String>) -> ModelResult<Self> {
        let name = name.into();
        let seclist_name = seclist_name.into();
        validate_name(&name)?;
        validate_name(&seclist_name)?;
        Ok(Self { name, seclist_name })
    }

    /// Location named after its list
    pub fn of(seclist_name: impl Into<String>) -> ModelResult<Self> {
        let seclist_name = seclist_name.into();
        Self::new(seclist_name.clone(), seclist_name)
    }
}

impl Location for SeclistLocation {
    fn name(&self) -> &str {
        &self.name
    }

    fn seclist_name(&self) -> Option<&str> {
        Some(&self.seclist_name)
    }

    fn instantiate(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<Vec<SectionHandle>> {
        Ok(sim.section_list(cell, &self.seclist_name)?)
    }
}

impl fmt::Display for SeclistLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.seclist_name)
    }
}
