// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mechanisms inserted into the sections of their locations.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{validate_name, ModelError, ModelResult};
use crate::host::{CellHandle, Simulator};
use crate::location::Location;

/// Channel or other mechanism added to a cell
pub trait Mechanism: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn instantiate(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<()>;

    fn destroy(&self, _sim: &dyn Simulator) -> ModelResult<()> {
        Ok(())
    }

    /// `(seclist, suffix)` pairs this mechanism renders as `insert` statements
    fn insertions(&self) -> ModelResult<Vec<(String, String)>>;
}

/// Density mechanism identified by its suffix
#[derive(Debug, Clone)]
pub struct DensityMechanism {
    name: String,
    suffix: String,
    locations: Vec<Arc<dyn Location>>,
}

impl DensityMechanism {
    pub fn new(
        name: impl Into<String>,
        suffix: impl Into<String>,
        locations: Vec<Arc<dyn Location>>,
    ) -> ModelResult<Self> {
        let name = name.into();
        let suffix = suffix.into();
        validate_name(&name)?;
        validate_name(&suffix)?;
        Ok(Self {
            name,
            suffix,
            locations,
        })
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn locations(&self) -> &[Arc<dyn Location>] {
        &self.locations
    }
}

impl Mechanism for DensityMechanism {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<()> {
        for location in &self.locations {
            let sections = location.instantiate(sim, cell)?;
            for section in &sections {
                sim.insert_mechanism(*section, &self.suffix)?;
            }
            debug!(
                target: "ephys_model::mechanism",
                "Inserted {} into {} sections of {}",
                self.suffix,
                sections.len(),
                location.name()
            );
        }
        Ok(())
    }

    fn insertions(&self) -> ModelResult<Vec<(String, String)>> {
        self.locations
            .iter()
            .map(|location| {
                location
                    .seclist_name()
                    .map(|seclist| (seclist.to_string(), self.suffix.clone()))
                    .ok_or_else(|| {
                        ModelError::Validation(format!(
                            "mechanism {}: location {} has no section list",
                            self.name,
                            location.name()
                        ))
                    })
            })
            .collect()
    }
}

impl fmt::Display for DensityMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let locations: Vec<&str> = self.locations.iter().map(|l| l.name()).collect();
        write!(f, "{}: {} at [{}]", self.name, self.suffix, locations.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::SeclistLocation;

    fn location(list: &str) -> Arc<dyn Location> {
        Arc::new(SeclistLocation::of(list).unwrap())
    }

    #[test]
    fn test_insertions() {
        let mechanism =
            DensityMechanism::new("hh", "hh", vec![location("somatic"), location("axonal")])
                .unwrap();
        assert_eq!(
            mechanism.insertions().unwrap(),
            vec![
                ("somatic".to_string(), "hh".to_string()),
                ("axonal".to_string(), "hh".to_string())
            ]
        );
        assert_eq!(mechanism.to_string(), "hh: hh at [somatic, axonal]");
    }

    #[test]
    fn test_invalid_suffix() {
        assert!(DensityMechanism::new("na", "Na-T", vec![]).is_err());
    }
}
