// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Value scalers.

A scaler maps a parameter value onto a segment. [`SomaDistanceScaler`] uses
a distribution formula of the path distance from a reference point (the
middle of `soma[0]` by default); [`LinearScaler`] applies a constant
multiplier and offset.

Both paths of a scaler must agree: [`ValueScaler::scale`] evaluates the
formula now, for one segment of a live cell, while
[`ValueScaler::distribution`] hands the still-open formula to the code
generator so the template evaluates it per segment later.
*/

use std::fmt;

use ephys_config::ScalerConfig;
use parking_lot::RwLock;
use tracing::trace;

use crate::error::{is_valid_identifier, ModelError, ModelResult};
use crate::formula::{DistributionTemplate, PartialFormula, DISTANCE_SLOT, VALUE_SLOT};
use crate::host::{Segment, Simulator};
use crate::numeric::Numeric;

/// Placeholder the generated templates bind per segment
pub const DEFAULT_DISTANCE_PLACEHOLDER: &str = "%.17g";

/// Mutable named coefficients, written through by meta parameters
pub trait CoefficientStore: Send + Sync + fmt::Debug {
    /// Declared coefficient names, in declaration order
    fn coefficient_names(&self) -> Vec<String>;

    /// `Ok(None)` for a declared coefficient without a value
    fn get_coefficient(&self, name: &str) -> ModelResult<Option<Numeric>>;

    fn set_coefficient(&self, name: &str, value: Numeric) -> ModelResult<()>;

    fn clear_coefficient(&self, name: &str) -> ModelResult<()>;
}

/// How a scaled value spreads over a location
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    /// Same value on every segment
    Uniform(f64),
    /// Formula of the distance to the scaler's reference point
    Distance(PartialFormula),
}

/// Point distances are measured from
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoint {
    pub section: String,
    pub position: f64,
}

impl Default for ReferencePoint {
    fn default() -> Self {
        Self {
            section: "soma[0]".to_string(),
            position: 0.5,
        }
    }
}

impl ReferencePoint {
    pub fn new(section: impl Into<String>, position: f64) -> ModelResult<Self> {
        let section = section.into();
        if section.trim().is_empty() {
            return Err(ModelError::Validation(
                "reference section name is empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&position) {
            return Err(ModelError::Validation(format!(
                "reference position {} is outside [0, 1]",
                position
            )));
        }
        Ok(Self { section, position })
    }
}

impl fmt::Display for ReferencePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.section, self.position)
    }
}

/// Maps parameter values onto segments
pub trait ValueScaler: Send + Sync + fmt::Debug {
    /// Value for one segment of a live cell
    fn scale(&self, value: Numeric, segment: Segment, sim: &dyn Simulator) -> ModelResult<f64>;

    /// Value spread for code generation
    fn distribution(&self, value: Numeric) -> ModelResult<Distribution>;

    /// Reference point of distance distributions
    fn reference(&self) -> Option<&ReferencePoint> {
        None
    }
}

/// Distance-dependent distribution with named coefficients
#[derive(Debug)]
pub struct SomaDistanceScaler {
    name: String,
    template: DistributionTemplate,
    coefficients: RwLock<Vec<(String, Option<Numeric>)>>,
    reference: ReferencePoint,
}

impl SomaDistanceScaler {
    /// # Arguments
    /// * `distribution` - formula template, e.g. `{value} * math.exp({distance} * {decay})`
    /// * `coefficients` - names of the extra slots the template may use
    pub fn new(distribution: &str, coefficients: &[&str]) -> ModelResult<Self> {
        let mut declared: Vec<String> = Vec::with_capacity(coefficients.len());
        for name in coefficients {
            if !is_valid_identifier(name) {
                return Err(ModelError::InvalidName(name.to_string()));
            }
            if *name == DISTANCE_SLOT || *name == VALUE_SLOT {
                return Err(ModelError::Validation(format!(
                    "'{}' is reserved and cannot be a coefficient",
                    name
                )));
            }
            if declared.iter().any(|d| d == name) {
                return Err(ModelError::Validation(format!(
                    "coefficient '{}' declared twice",
                    name
                )));
            }
            declared.push(name.to_string());
        }

        let template = DistributionTemplate::with_coefficients(distribution, &declared)?;
        Ok(Self {
            name: "soma_distance".to_string(),
            template,
            coefficients: RwLock::new(declared.into_iter().map(|name| (name, None)).collect()),
            reference: ReferencePoint::default(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_reference(mut self, section: impl Into<String>, position: f64) -> ModelResult<Self> {
        self.reference = ReferencePoint::new(section, position)?;
        Ok(self)
    }

    /// Apply the reference point from configuration
    pub fn with_config(self, config: &ScalerConfig) -> ModelResult<Self> {
        self.with_reference(config.reference_section.clone(), config.reference_position)
    }

    /// Set a coefficient, builder style
    pub fn with_coefficient(self, name: &str, value: impl Into<Numeric>) -> ModelResult<Self> {
        self.set_coefficient(name, value.into())?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &DistributionTemplate {
        &self.template
    }

    pub fn reference_point(&self) -> &ReferencePoint {
        &self.reference
    }

    /// Formula with value and coefficients bound
    pub fn partial(&self, value: Numeric) -> ModelResult<PartialFormula> {
        let coefficients = self.coefficients.read();
        // Every declared coefficient needs a value, used by the template or not
        if let Some((name, _)) = coefficients.iter().find(|(_, value)| value.is_none()) {
            return Err(ModelError::MissingCoefficient(name.clone()));
        }
        self.template.bind(value, |slot| {
            coefficients
                .iter()
                .find(|(name, _)| name == slot)
                .map(|(_, value)| *value)
                .ok_or_else(|| ModelError::UnknownCoefficient(slot.to_string()))
        })
    }

    /// Fully substituted formula text for a value at a distance
    pub fn eval_dist(&self, value: impl Into<Numeric>, distance: f64) -> ModelResult<String> {
        Ok(self.partial(value.into())?.bind_distance(distance).into_string())
    }

    /// Formula text for generated code, distance left as `%.17g`
    pub fn inst_distribution(&self, value: impl Into<Numeric>) -> ModelResult<String> {
        self.inst_distribution_with(value, DEFAULT_DISTANCE_PLACEHOLDER)
    }

    pub fn inst_distribution_with(
        &self,
        value: impl Into<Numeric>,
        placeholder: &str,
    ) -> ModelResult<String> {
        Ok(self.partial(value.into())?.to_lazy(placeholder))
    }

    /// Path distance from the reference point to `segment`
    pub fn distance(&self, segment: Segment, sim: &dyn Simulator) -> ModelResult<f64> {
        let reference = sim.section_by_name(segment.section.cell, &self.reference.section)?;
        let origin = Segment {
            section: reference,
            x: self.reference.position,
        };
        Ok(sim.distance(origin, segment)?)
    }

    fn slot_index(&self, coefficients: &[(String, Option<Numeric>)], name: &str) -> ModelResult<usize> {
        coefficients
            .iter()
            .position(|(declared, _)| declared == name)
            .ok_or_else(|| ModelError::UnknownCoefficient(name.to_string()))
    }
}

impl CoefficientStore for SomaDistanceScaler {
    fn coefficient_names(&self) -> Vec<String> {
        self.coefficients.read().iter().map(|(name, _)| name.clone()).collect()
    }

    fn get_coefficient(&self, name: &str) -> ModelResult<Option<Numeric>> {
        let coefficients = self.coefficients.read();
        let index = self.slot_index(&coefficients, name)?;
        Ok(coefficients[index].1)
    }

    fn set_coefficient(&self, name: &str, value: Numeric) -> ModelResult<()> {
        let mut coefficients = self.coefficients.write();
        let index = self.slot_index(&coefficients, name)?;
        coefficients[index].1 = Some(value);
        trace!(target: "ephys_model::scaler", "{}: {} = {}", self.name, name, value);
        Ok(())
    }

    fn clear_coefficient(&self, name: &str) -> ModelResult<()> {
        let mut coefficients = self.coefficients.write();
        let index = self.slot_index(&coefficients, name)?;
        coefficients[index].1 = None;
        Ok(())
    }
}

impl ValueScaler for SomaDistanceScaler {
    fn scale(&self, value: Numeric, segment: Segment, sim: &dyn Simulator) -> ModelResult<f64> {
        let partial = self.partial(value)?;
        let distance = self.distance(segment, sim)?;
        partial.bind_distance(distance).evaluate()
    }

    fn distribution(&self, value: Numeric) -> ModelResult<Distribution> {
        let partial = self.partial(value)?;
        if partial.depends_on_distance() {
            Ok(Distribution::Distance(partial))
        } else {
            Ok(Distribution::Uniform(partial.bind_distance(0.0).evaluate()?))
        }
    }

    fn reference(&self) -> Option<&ReferencePoint> {
        Some(&self.reference)
    }
}

impl fmt::Display for SomaDistanceScaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} from {}", self.name, self.template, self.reference)
    }
}

/// `multiplier * value + offset`, the same on every segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScaler {
    pub multiplier: f64,
    pub offset: f64,
}

impl Default for LinearScaler {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            offset: 0.0,
        }
    }
}

impl LinearScaler {
    pub fn new(multiplier: f64, offset: f64) -> Self {
        Self { multiplier, offset }
    }

    pub fn apply(&self, value: Numeric) -> f64 {
        self.multiplier * value.as_f64() + self.offset
    }
}

impl ValueScaler for LinearScaler {
    fn scale(&self, value: Numeric, _segment: Segment, _sim: &dyn Simulator) -> ModelResult<f64> {
        Ok(self.apply(value))
    }

    fn distribution(&self, value: Numeric) -> ModelResult<Distribution> {
        Ok(Distribution::Uniform(self.apply(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemorySimulator, MorphologySpec};
    use std::path::Path;

    const EXP_DISTRIBUTION: &str = "({A} + {B} * math.exp({distance} * {C})) * {value}";

    fn exp_scaler() -> SomaDistanceScaler {
        SomaDistanceScaler::new(EXP_DISTRIBUTION, &["A", "B", "C"])
            .unwrap()
            .with_coefficient("A", -1)
            .unwrap()
            .with_coefficient("B", 2.0)
            .unwrap()
            .with_coefficient("C", 0.003)
            .unwrap()
    }

    #[test]
    fn test_eval_dist() {
        let scaler = exp_scaler();
        assert_eq!(
            scaler.eval_dist(1.0, 1.0).unwrap(),
            "(-1 + 2.0 * math.exp(1 * 0.003)) * 1"
        );
        assert_eq!(
            scaler.inst_distribution(1.0).unwrap(),
            "(-1 + 2.0 * exp(%.17g * 0.003)) * 1"
        );
    }

    #[test]
    fn test_coefficient_store() {
        let scaler = SomaDistanceScaler::new(EXP_DISTRIBUTION, &["A", "B", "C"]).unwrap();
        assert_eq!(scaler.coefficient_names(), vec!["A", "B", "C"]);
        assert_eq!(scaler.get_coefficient("A").unwrap(), None);

        scaler.set_coefficient("A", Numeric::Int(-1)).unwrap();
        assert_eq!(scaler.get_coefficient("A").unwrap(), Some(Numeric::Int(-1)));
        scaler.clear_coefficient("A").unwrap();
        assert_eq!(scaler.get_coefficient("A").unwrap(), None);

        assert!(matches!(
            scaler.get_coefficient("Z"),
            Err(ModelError::UnknownCoefficient(_))
        ));
    }

    #[test]
    fn test_unset_coefficient_fails_evaluation() {
        let scaler = SomaDistanceScaler::new(EXP_DISTRIBUTION, &["A", "B", "C"]).unwrap();
        scaler.set_coefficient("A", Numeric::Int(-1)).unwrap();
        let err = scaler.eval_dist(1.0, 1.0).unwrap_err();
        assert!(matches!(err, ModelError::MissingCoefficient(ref name) if name == "B"));
    }

    #[test]
    fn test_unused_coefficient_must_be_set() {
        let scaler = SomaDistanceScaler::new("{A} * {value} * {distance}", &["A", "B"]).unwrap();
        scaler.set_coefficient("A", Numeric::Float(2.0)).unwrap();
        for result in [scaler.eval_dist(1.0, 1.0), scaler.inst_distribution(1.0)] {
            assert!(matches!(
                result,
                Err(ModelError::MissingCoefficient(ref name)) if name == "B"
            ));
        }

        scaler.set_coefficient("B", Numeric::Int(0)).unwrap();
        assert_eq!(scaler.eval_dist(1.0, 1.0).unwrap(), "2.0 * 1 * 1");
    }

    #[test]
    fn test_construction_checks() {
        assert!(matches!(
            SomaDistanceScaler::new("{value} * {D}", &["A"]),
            Err(ModelError::UnknownCoefficient(_))
        ));
        assert!(SomaDistanceScaler::new("{value}", &["value"]).is_err());
        assert!(SomaDistanceScaler::new("{value}", &["A", "A"]).is_err());
        assert!(SomaDistanceScaler::new("{value}", &["1A"]).is_err());
        assert!(SomaDistanceScaler::new("{value", &[]).is_err());
    }

    #[test]
    fn test_reference_point() {
        let scaler = exp_scaler();
        assert_eq!(scaler.reference_point(), &ReferencePoint::default());
        assert!(exp_scaler().with_reference("soma[0]", 1.5).is_err());

        let config = ScalerConfig {
            reference_section: "soma[0]".to_string(),
            reference_position: 0.0,
        };
        let scaler = exp_scaler().with_config(&config).unwrap();
        assert_eq!(scaler.reference_point().position, 0.0);
    }

    #[test]
    fn test_scale_uses_path_distance() {
        let sim = MemorySimulator::new();
        sim.register_morphology("cell.swc", MorphologySpec::simple_cell())
            .unwrap();
        sim.define_template("begintemplate S\nendtemplate S\n").unwrap();
        let cell = sim.new_instance("S", &[]).unwrap();
        sim.load_morphology(cell, Path::new("cell.swc")).unwrap();

        let scaler = exp_scaler();
        let dend = sim.section_by_name(cell, "dend[0]").unwrap();
        for segment in sim.segments(dend).unwrap() {
            let distance = sim
                .distance(
                    Segment {
                        section: sim.section_by_name(cell, "soma[0]").unwrap(),
                        x: 0.5,
                    },
                    segment,
                )
                .unwrap();
            let scaled = scaler.scale(Numeric::Float(0.5), segment, &sim).unwrap();
            assert_eq!(scaled, (-1.0 + 2.0 * (distance * 0.003).exp()) * 0.5);
        }
    }

    #[test]
    fn test_distribution_kinds() {
        let scaler = exp_scaler();
        assert!(matches!(
            scaler.distribution(Numeric::Float(1.0)).unwrap(),
            Distribution::Distance(_)
        ));

        let constant = SomaDistanceScaler::new("{value} * {k}", &["k"])
            .unwrap()
            .with_coefficient("k", 4)
            .unwrap();
        assert_eq!(
            constant.distribution(Numeric::Float(0.5)).unwrap(),
            Distribution::Uniform(2.0)
        );

        let linear = LinearScaler::new(2.0, 1.0);
        assert_eq!(
            linear.distribution(Numeric::Int(3)).unwrap(),
            Distribution::Uniform(7.0)
        );
        assert!(linear.reference().is_none());
    }
}
