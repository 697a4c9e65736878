// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Model parameters.

Every parameter kind shares the [`Parameter`] core: a validated name,
optional bounds, an optional value and a frozen flag. A model is ready for
simulation once every parameter is frozen (or exempted by the caller).

Freezing is idempotent for an equal value and refuses a different one
until the parameter is unfrozen.
*/

mod meta;
mod range;
mod section;

pub use meta::MetaParameter;
pub use range::RangeParameter;
pub use section::{GlobalParameter, SectionParameter};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{validate_name, ModelError, ModelResult};
use crate::host::{CellHandle, Simulator};
use crate::location::Location;
use crate::numeric::Numeric;

/// Inclusive value range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn contains(&self, value: Numeric) -> bool {
        let value = value.as_f64();
        value >= self.lower && value <= self.upper
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Captured `(value, frozen)` state, see [`ModelParameter::snapshot`]
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot {
    pub value: Option<Numeric>,
    pub frozen: bool,
}

/// State shared by all parameter kinds
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    bounds: Option<Bounds>,
    value: Option<Numeric>,
    frozen: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> ModelResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            bounds: None,
            value: None,
            frozen: false,
        })
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> ModelResult<Self> {
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(ModelError::InvalidBounds {
                name: self.name,
                lower,
                upper,
            });
        }
        self.bounds = Some(Bounds { lower, upper });
        if let Some(value) = self.value {
            self.check_bounds(value)?;
        }
        Ok(self)
    }

    /// Initial value, left unfrozen
    pub fn with_value(mut self, value: impl Into<Numeric>) -> ModelResult<Self> {
        let value = value.into();
        self.check_bounds(value)?;
        self.value = Some(value);
        Ok(self)
    }

    /// Initial value, frozen
    pub fn with_frozen_value(mut self, value: impl Into<Numeric>) -> ModelResult<Self> {
        self.freeze(value.into())?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn value(&self) -> Option<Numeric> {
        self.value
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn check_bounds(&self, value: Numeric) -> ModelResult<()> {
        if !value.is_finite() {
            return Err(ModelError::Validation(format!(
                "value {} of {} is not finite",
                value, self.name
            )));
        }
        match self.bounds {
            Some(bounds) if !bounds.contains(value) => Err(ModelError::OutOfBounds {
                name: self.name.clone(),
                value,
                lower: bounds.lower,
                upper: bounds.upper,
            }),
            _ => Ok(()),
        }
    }

    /// Fails with [`ModelError::FrozenConflict`] when already frozen at a
    /// different value
    pub fn check_refreeze(&self, current: Option<Numeric>, value: Numeric) -> ModelResult<bool> {
        if !self.frozen {
            return Ok(false);
        }
        match current {
            Some(current) if current == value => Ok(true),
            Some(current) => Err(ModelError::FrozenConflict {
                name: self.name.clone(),
                current,
                requested: value,
            }),
            None => Ok(false),
        }
    }

    pub fn freeze(&mut self, value: Numeric) -> ModelResult<()> {
        if self.check_refreeze(self.value, value)? {
            return Ok(());
        }
        self.check_bounds(value)?;
        self.value = Some(value);
        self.frozen = true;
        Ok(())
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    /// Value of a frozen parameter
    pub fn frozen_value(&self) -> ModelResult<Numeric> {
        match (self.frozen, self.value) {
            (true, Some(value)) => Ok(value),
            _ => Err(ModelError::Unfrozen {
                names: vec![self.name.clone()],
            }),
        }
    }

    fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            value: self.value,
            frozen: self.frozen,
        }
    }

    fn restore(&mut self, snapshot: &ParameterSnapshot) {
        self.value = snapshot.value;
        self.frozen = snapshot.frozen;
    }

    pub(crate) fn mark_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    fn describe_value(&self) -> String {
        match (self.value, self.bounds) {
            (Some(value), _) => value.to_string(),
            (None, Some(bounds)) => bounds.to_string(),
            (None, None) => "?".to_string(),
        }
    }
}

/// Parameter values keyed by parameter name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamValues(BTreeMap<String, Numeric>);

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Numeric>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Numeric>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<Numeric> {
        self.0.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Numeric)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a JSON object of `name: number` pairs
    pub fn from_json(text: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ModelResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

impl<K: Into<String>, V: Into<Numeric>> FromIterator<(K, V)> for ParamValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (name, value) in iter {
            values.insert(name, value);
        }
        values
    }
}

/// Any parameter a cell model can own
#[derive(Debug)]
pub enum ModelParameter {
    Meta(MetaParameter),
    Global(GlobalParameter),
    Section(SectionParameter),
    Range(RangeParameter),
}

impl ModelParameter {
    pub fn name(&self) -> &str {
        match self {
            ModelParameter::Meta(p) => p.name(),
            ModelParameter::Global(p) => p.core().name(),
            ModelParameter::Section(p) => p.core().name(),
            ModelParameter::Range(p) => p.core().name(),
        }
    }

    pub fn value(&self) -> Option<Numeric> {
        match self {
            ModelParameter::Meta(p) => p.value(),
            ModelParameter::Global(p) => p.core().value(),
            ModelParameter::Section(p) => p.core().value(),
            ModelParameter::Range(p) => p.core().value(),
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            ModelParameter::Meta(p) => p.bounds(),
            ModelParameter::Global(p) => p.core().bounds(),
            ModelParameter::Section(p) => p.core().bounds(),
            ModelParameter::Range(p) => p.core().bounds(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        match self {
            ModelParameter::Meta(p) => p.is_frozen(),
            ModelParameter::Global(p) => p.core().is_frozen(),
            ModelParameter::Section(p) => p.core().is_frozen(),
            ModelParameter::Range(p) => p.core().is_frozen(),
        }
    }

    pub fn freeze(&mut self, value: Numeric) -> ModelResult<()> {
        match self {
            ModelParameter::Meta(p) => p.freeze(value),
            ModelParameter::Global(p) => p.core_mut().freeze(value),
            ModelParameter::Section(p) => p.core_mut().freeze(value),
            ModelParameter::Range(p) => p.core_mut().freeze(value),
        }
    }

    pub fn unfreeze(&mut self) {
        match self {
            ModelParameter::Meta(p) => p.unfreeze(),
            ModelParameter::Global(p) => p.core_mut().unfreeze(),
            ModelParameter::Section(p) => p.core_mut().unfreeze(),
            ModelParameter::Range(p) => p.core_mut().unfreeze(),
        }
    }

    /// Current `(value, frozen)` state
    pub fn snapshot(&self) -> ParameterSnapshot {
        match self {
            ModelParameter::Meta(p) => p.snapshot(),
            ModelParameter::Global(p) => p.core().snapshot(),
            ModelParameter::Section(p) => p.core().snapshot(),
            ModelParameter::Range(p) => p.core().snapshot(),
        }
    }

    pub fn restore(&mut self, snapshot: &ParameterSnapshot) -> ModelResult<()> {
        match self {
            ModelParameter::Meta(p) => p.restore(snapshot),
            ModelParameter::Global(p) => {
                p.core_mut().restore(snapshot);
                Ok(())
            }
            ModelParameter::Section(p) => {
                p.core_mut().restore(snapshot);
                Ok(())
            }
            ModelParameter::Range(p) => {
                p.core_mut().restore(snapshot);
                Ok(())
            }
        }
    }

    /// Apply the frozen value to a live cell
    pub fn instantiate(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<()> {
        match self {
            // Coefficients take effect through the range parameters using them
            ModelParameter::Meta(p) => p.frozen_value().map(|_| ()),
            ModelParameter::Global(p) => p.instantiate(sim),
            ModelParameter::Section(p) => p.instantiate(sim, cell),
            ModelParameter::Range(p) => p.instantiate(sim, cell),
        }
    }

    pub fn locations(&self) -> &[Arc<dyn Location>] {
        match self {
            ModelParameter::Section(p) => p.locations(),
            ModelParameter::Range(p) => p.locations(),
            ModelParameter::Meta(_) | ModelParameter::Global(_) => &[],
        }
    }
}

impl fmt::Display for ModelParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelParameter::Meta(p) => fmt::Display::fmt(p, f),
            ModelParameter::Global(p) => fmt::Display::fmt(p, f),
            ModelParameter::Section(p) => fmt::Display::fmt(p, f),
            ModelParameter::Range(p) => fmt::Display::fmt(p, f),
        }
    }
}

impl From<MetaParameter> for ModelParameter {
    fn from(p: MetaParameter) -> Self {
        ModelParameter::Meta(p)
    }
}

impl From<GlobalParameter> for ModelParameter {
    fn from(p: GlobalParameter) -> Self {
        ModelParameter::Global(p)
    }
}

impl From<SectionParameter> for ModelParameter {
    fn from(p: SectionParameter) -> Self {
        ModelParameter::Section(p)
    }
}

impl From<RangeParameter> for ModelParameter {
    fn from(p: RangeParameter) -> Self {
        ModelParameter::Range(p)
    }
}

fn location_names(locations: &[Arc<dyn Location>]) -> String {
    locations
        .iter()
        .map(|location| location.name())
        .collect::<Vec<_>>()
        .join(", ")
}
