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
use crate::scaler::{Distribution, ValueScaler};

/// Per-segment attribute, optionally shaped by a value scaler
#[derive(Debug)]
pub struct RangeParameter {
    core: Parameter,
    param_name: String,
    locations: Vec<Arc<dyn Location>>,
    scaler: Option<Arc<dyn ValueScaler>>,
}

impl RangeParameter {
    /// # Arguments
    /// * `name` - parameter name used by `freeze`
    /// * `param_name` - host attribute, e.g. `gbar_NaTs2_t`
    /// * `locations` - where the attribute is set
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
            scaler: None,
        })
    }

    pub fn with_scaler(mut self, scaler: Arc<dyn ValueScaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> ModelResult<Self> {
        self.core = self.core.with_bounds(lower, upper)?;
        Ok(self)
    }

    pub fn with_value(mut self, value: impl Into<Numeric>) -> ModelResult<Self> {
        self.core = self.core.with_value(value)?;
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

    pub fn scaler(&self) -> Option<&Arc<dyn ValueScaler>> {
        self.scaler.as_ref()
    }

    /// Spread of the frozen value, for code generation
    pub fn distribution(&self) -> ModelResult<Distribution> {
        let value = self.core.frozen_value()?;
        match &self.scaler {
            Some(scaler) => scaler.distribution(value),
            None => Ok(Distribution::Uniform(value.as_f64())),
        }
    }

    /// Set the attribute on every segment of every location
    pub fn instantiate(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<()> {
        let value = self.core.frozen_value()?;
        let mut count = 0usize;
        for location in &self.locations {
            for segment in location.segments(sim, cell)? {
                let scaled = match &self.scaler {
                    Some(scaler) => scaler.scale(value, segment, sim)?,
                    None => value.as_f64(),
                };
                sim.set_segment_value(segment, &self.param_name, scaled)?;
                count += 1;
            }
        }
        debug!(
            target: "ephys_model::parameter",
            "Set {} on {} segments of [{}]",
            self.param_name,
            count,
            location_names(&self.locations)
        );
        Ok(())
    }
}

impl fmt::Display for RangeParameter {
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
    use crate::host::{MemorySimulator, MorphologySpec, Segment};
    use crate::location::SeclistLocation;
    use crate::scaler::{LinearScaler, SomaDistanceScaler};
    use std::path::Path;

    fn all() -> Vec<Arc<dyn Location>> {
        vec![Arc::new(SeclistLocation::of("all").unwrap())]
    }

    fn live_cell() -> (MemorySimulator, CellHandle) {
        let sim = MemorySimulator::new();
        sim.register_morphology("cell.swc", MorphologySpec::simple_cell())
            .unwrap();
        sim.define_template("begintemplate R\nendtemplate R\n").unwrap();
        let cell = sim.new_instance("R", &[]).unwrap();
        sim.load_morphology(cell, Path::new("cell.swc")).unwrap();
        (sim, cell)
    }

    #[test]
    fn test_unfrozen_instantiate_fails() {
        let (sim, cell) = live_cell();
        let param = RangeParameter::new("cm", "cm", all()).unwrap();
        let err = param.instantiate(&sim, cell).unwrap_err();
        assert!(matches!(err, ModelError::Unfrozen { ref names } if names == &["cm".to_string()]));
    }

    #[test]
    fn test_constant_value() {
        let (sim, cell) = live_cell();
        let param = RangeParameter::new("cm", "cm", all())
            .unwrap()
            .with_frozen_value(2.0)
            .unwrap();
        param.instantiate(&sim, cell).unwrap();
        for segment in all()[0].segments(&sim, cell).unwrap() {
            assert_eq!(sim.segment_value(segment, "cm").unwrap(), 2.0);
        }
        assert_eq!(param.to_string(), "cm: [all] cm = 2.0");
    }

    #[test]
    fn test_distance_scaled_value() {
        let (sim, cell) = live_cell();
        let scaler = Arc::new(
            SomaDistanceScaler::new("{value} * math.exp({distance} * {k})", &["k"])
                .unwrap()
                .with_coefficient("k", -0.01)
                .unwrap(),
        );
        let param = RangeParameter::new("cm", "cm", all())
            .unwrap()
            .with_scaler(scaler)
            .with_frozen_value(1.0)
            .unwrap();
        param.instantiate(&sim, cell).unwrap();

        let soma = sim.section_by_name(cell, "soma[0]").unwrap();
        let origin = Segment { section: soma, x: 0.5 };
        for segment in all()[0].segments(&sim, cell).unwrap() {
            let distance = sim.distance(origin, segment).unwrap();
            let expected = 1.0 * (distance * -0.01f64).exp();
            assert_eq!(sim.segment_value(segment, "cm").unwrap(), expected);
        }
        assert!(matches!(param.distribution().unwrap(), Distribution::Distance(_)));
    }

    #[test]
    fn test_linear_scaler_and_missing_mechanism() {
        let (sim, cell) = live_cell();
        let param = RangeParameter::new("gbar", "gbar_NaT", all())
            .unwrap()
            .with_scaler(Arc::new(LinearScaler::new(2.0, 0.0)))
            .with_frozen_value(0.5)
            .unwrap();
        assert_eq!(param.distribution().unwrap(), Distribution::Uniform(1.0));
        assert!(matches!(
            param.instantiate(&sim, cell),
            Err(ModelError::Host(_))
        ));
    }
}
