// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{Bounds, Parameter, ParameterSnapshot};
use crate::error::{ModelError, ModelResult};
use crate::numeric::Numeric;
use crate::scaler::CoefficientStore;

/// Parameter whose value is a coefficient of a shared scaler.
///
/// The parameter keeps no value of its own: reading it reads the
/// coefficient and freezing it writes the coefficient. Unfreezing leaves the
/// coefficient in place.
#[derive(Debug)]
pub struct MetaParameter {
    core: Parameter,
    target: Arc<dyn CoefficientStore>,
    attr_name: String,
}

impl MetaParameter {
    pub fn new(
        name: impl Into<String>,
        target: Arc<dyn CoefficientStore>,
        attr_name: impl Into<String>,
    ) -> ModelResult<Self> {
        let core = Parameter::new(name)?;
        let attr_name = attr_name.into();
        target.get_coefficient(&attr_name)?;
        Ok(Self {
            core,
            target,
            attr_name,
        })
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> ModelResult<Self> {
        self.core = self.core.with_bounds(lower, upper)?;
        if let Some(value) = self.value() {
            self.core.check_bounds(value)?;
        }
        Ok(self)
    }

    /// Write an initial coefficient value, leaving the parameter unfrozen
    pub fn with_value(self, value: impl Into<Numeric>) -> ModelResult<Self> {
        let value = value.into();
        self.core.check_bounds(value)?;
        self.target.set_coefficient(&self.attr_name, value)?;
        Ok(self)
    }

    pub fn with_frozen_value(mut self, value: impl Into<Numeric>) -> ModelResult<Self> {
        self.freeze(value.into())?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn attr_name(&self) -> &str {
        &self.attr_name
    }

    pub fn target(&self) -> &Arc<dyn CoefficientStore> {
        &self.target
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.core.bounds()
    }

    pub fn is_frozen(&self) -> bool {
        self.core.is_frozen()
    }

    /// Current coefficient value
    pub fn value(&self) -> Option<Numeric> {
        self.target.get_coefficient(&self.attr_name).ok().flatten()
    }

    pub fn freeze(&mut self, value: Numeric) -> ModelResult<()> {
        let current = self.target.get_coefficient(&self.attr_name)?;
        if self.core.check_refreeze(current, value)? {
            return Ok(());
        }
        self.core.check_bounds(value)?;
        self.target.set_coefficient(&self.attr_name, value)?;
        self.core.mark_frozen(true);
        debug!(
            target: "ephys_model::parameter",
            "Froze {} ({} = {})",
            self.core.name(),
            self.attr_name,
            value
        );
        Ok(())
    }

    pub fn unfreeze(&mut self) {
        self.core.unfreeze();
    }

    pub fn frozen_value(&self) -> ModelResult<Numeric> {
        match (self.is_frozen(), self.value()) {
            (true, Some(value)) => Ok(value),
            _ => Err(ModelError::Unfrozen {
                names: vec![self.name().to_string()],
            }),
        }
    }

    pub(super) fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            value: self.value(),
            frozen: self.is_frozen(),
        }
    }

    pub(super) fn restore(&mut self, snapshot: &ParameterSnapshot) -> ModelResult<()> {
        match snapshot.value {
            Some(value) => self.target.set_coefficient(&self.attr_name, value)?,
            None => self.target.clear_coefficient(&self.attr_name)?,
        }
        self.core.mark_frozen(snapshot.frozen);
        Ok(())
    }
}

impl fmt::Display for MetaParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match (self.value(), self.bounds()) {
            (Some(value), _) => value.to_string(),
            (None, Some(bounds)) => bounds.to_string(),
            (None, None) => "?".to_string(),
        };
        write!(f, "{}: {} = {}", self.name(), self.attr_name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaler::SomaDistanceScaler;

    fn scaler() -> Arc<SomaDistanceScaler> {
        Arc::new(SomaDistanceScaler::new("{value} * {A} + {B}", &["A", "B"]).unwrap())
    }

    #[test]
    fn test_freeze_writes_through() {
        let scaler = scaler();
        let mut param = MetaParameter::new("ParamA", scaler.clone(), "A").unwrap();
        assert_eq!(param.value(), None);

        param.freeze(Numeric::Int(-1)).unwrap();
        assert_eq!(scaler.get_coefficient("A").unwrap(), Some(Numeric::Int(-1)));
        assert_eq!(param.to_string(), "ParamA: A = -1");

        param.unfreeze();
        assert!(!param.is_frozen());
        assert_eq!(scaler.get_coefficient("A").unwrap(), Some(Numeric::Int(-1)));
    }

    #[test]
    fn test_refreeze() {
        let mut param = MetaParameter::new("ParamA", scaler(), "A").unwrap();
        param.freeze(Numeric::Float(2.0)).unwrap();
        param.freeze(Numeric::Float(2.0)).unwrap();
        assert!(matches!(
            param.freeze(Numeric::Float(3.0)),
            Err(ModelError::FrozenConflict { .. })
        ));
        param.unfreeze();
        param.freeze(Numeric::Float(3.0)).unwrap();
        assert_eq!(param.frozen_value().unwrap(), Numeric::Float(3.0));
    }

    #[test]
    fn test_unknown_coefficient() {
        assert!(matches!(
            MetaParameter::new("ParamC", scaler(), "C"),
            Err(ModelError::UnknownCoefficient(_))
        ));
    }

    #[test]
    fn test_bounds_and_initial_value() {
        let scaler = scaler();
        let param = MetaParameter::new("ParamB", scaler.clone(), "B")
            .unwrap()
            .with_bounds(0.0, 1.0)
            .unwrap();
        assert!(param.with_value(2.0).is_err());
        assert_eq!(scaler.get_coefficient("B").unwrap(), None);

        let param = MetaParameter::new("ParamB", scaler.clone(), "B")
            .unwrap()
            .with_value(0.5)
            .unwrap();
        assert!(!param.is_frozen());
        assert_eq!(scaler.get_coefficient("B").unwrap(), Some(Numeric::Float(0.5)));
    }

    #[test]
    fn test_snapshot_restore() {
        let scaler = scaler();
        let mut param = MetaParameter::new("ParamA", scaler.clone(), "A").unwrap();
        let before = param.snapshot();
        param.freeze(Numeric::Int(4)).unwrap();
        param.restore(&before).unwrap();
        assert!(!param.is_frozen());
        assert_eq!(scaler.get_coefficient("A").unwrap(), None);
    }
}
