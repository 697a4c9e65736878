// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{location_names, Parameter};
use crate::error::{validate_name, ModelResult};
use crate::host::{CellHandle, Simulator};
use crate::location::Location;
use crate::numeric::Numeric;

/// Host-global variable such as `celsius` or `v_init`
#[derive(Debug)]
pub struct GlobalParameter {
    core: Parameter,
    param_name: String,
}

impl GlobalParameter {
    pub fn new(name: impl Into<String>, param_name: impl Into<String>) -> ModelResult<Self> {
        let param_name = param_name.into();
        validate_name(&param_name)?;
        Ok(Self {
            core: Parameter::new(name)?,
            param_name,
        })
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> ModelResult<Self> {
        self.core = self.core.with_bounds(lower, upper)?;
        Ok(self)
    }

    pub fn with_frozen_value(mut self, value: impl Into<Numeric>) -> ModelResult<Self> {
        self.core = self.core.with_frozen_value(value)?;
        Ok(self)
    }

    pub fn core(&self) -> &Parameter {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Parameter {
        &mut self.core
    }

    pub fn param_name(&self) -> &str {
        &self.param_name
    }

    pub fn instantiate(&self, sim: &dyn Simulator) -> ModelResult<()> {
        let value = self.core.frozen_value()?;
        sim.set_global(&self.param_name, value.as_f64())?;
        debug!(target: "ephys_model::parameter", "Set global {} = {}", self.param_name, value);
        Ok(())
    }
}

impl fmt::Display for GlobalParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} = {}",
            self.core.name(),
            self.param_name,
            self.core.describe_value()
        )
    }
}

/// Attribute set once per section (e.g. `Ra`) on every section of its
/// locations
#[derive(Debug)]
pub struct SectionParameter {
    core: Parameter,
    param_name: String,
    locations: Vec<Arc<dyn Location>>,
}

impl SectionParameter {
    pub fn new(
        name: impl Into<String>,
        param_name: impl Into<String>,
        locations: Vec<Arc<dyn Location>>,
    ) -> ModelResult<Self> {
        let param_name = param_name.into();
        validate_name(&param_name)?;
        Ok(Self {
            core: Parameter::new(name)?,
            param_name,
            locations,
        })
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> ModelResult<Self> {
        self.core = self.core.with_bounds(lower, upper)?;
        Ok(self)
    }

    pub fn with_frozen_value(mut self, value: impl Into<Numeric>) -> ModelResult<Self> {
        self.core = self.core.with_frozen_value(value)?;
        Ok(self)
    }

    pub fn core(&self) -> &Parameter {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Parameter {
        &mut self.core
    }

    pub fn param_name(&self) -> &str {
        &self.param_name
    }

    pub fn locations(&self) -> &[Arc<dyn Location>] {
        &self.locations
    }

    pub fn instantiate(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<()> {
        let value = self.core.frozen_value()?.as_f64();
        for location in &self.locations {
            for section in location.instantiate(sim, cell)? {
                sim.set_section_value(section, &self.param_name, value)?;
            }
        }
        debug!(
            target: "ephys_model::parameter",
            "Set {} = {} on [{}]",
            self.param_name,
            value,
            location_names(&self.locations)
        );
        Ok(())
    }
}

impl fmt::Display for SectionParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: [{}] {} = {}",
            self.core.name(),
            location_names(&self.locations),
            self.param_name,
            self.core.describe_value()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::host::{MemorySimulator, MorphologySpec};
    use crate::location::SeclistLocation;
    use std::path::Path;

    #[test]
    fn test_global() {
        let sim = MemorySimulator::new();
        let param = GlobalParameter::new("celsius", "celsius").unwrap();
        assert!(matches!(param.instantiate(&sim), Err(ModelError::Unfrozen { .. })));

        let param = param.with_frozen_value(34).unwrap();
        param.instantiate(&sim).unwrap();
        assert_eq!(sim.global("celsius").unwrap(), 34.0);
        assert_eq!(param.to_string(), "celsius: celsius = 34");
    }

    #[test]
    fn test_section_value() {
        let sim = MemorySimulator::new();
        sim.register_morphology("cell.swc", MorphologySpec::simple_cell())
            .unwrap();
        sim.define_template("begintemplate S\nendtemplate S\n").unwrap();
        let cell = sim.new_instance("S", &[]).unwrap();
        sim.load_morphology(cell, Path::new("cell.swc")).unwrap();

        let somatic: Arc<dyn Location> = Arc::new(SeclistLocation::of("somatic").unwrap());
        let param = SectionParameter::new("Ra", "Ra", vec![somatic.clone()])
            .unwrap()
            .with_frozen_value(100.0)
            .unwrap();
        param.instantiate(&sim, cell).unwrap();
        for segment in somatic.segments(&sim, cell).unwrap() {
            assert_eq!(sim.segment_value(segment, "Ra").unwrap(), 100.0);
        }
    }
}
