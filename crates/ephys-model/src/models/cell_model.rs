// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Arc;

use ephys_config::TemplateConfig;
use tracing::{debug, info, warn};

use super::ModelLifecycle;
use crate::error::{validate_name, ModelError, ModelResult};
use crate::host::{CellHandle, Simulator};
use crate::mechanism::Mechanism;
use crate::morphology::Morphology;
use crate::parameter::{ModelParameter, ParamValues, ParameterSnapshot};
use crate::registry::InstanceRegistry;
use crate::template::{self, CellTemplate};

/// Cell assembled from a morphology, mechanisms and parameters.
///
/// Parameters keep their insertion order and are looked up by name. Several
/// models may share a name; they then share one host template.
#[derive(Debug)]
pub struct CellModel {
    name: String,
    morphology: Arc<dyn Morphology>,
    mechanisms: Vec<Box<dyn Mechanism>>,
    params: Vec<ModelParameter>,
    template_config: TemplateConfig,
    icell: Option<CellHandle>,
}

impl CellModel {
    pub fn new(
        name: impl Into<String>,
        morphology: Arc<dyn Morphology>,
        mechanisms: Vec<Box<dyn Mechanism>>,
        params: Vec<ModelParameter>,
    ) -> ModelResult<Self> {
        let name = name.into();
        validate_name(&name)?;

        for (index, param) in params.iter().enumerate() {
            if params[..index].iter().any(|p| p.name() == param.name()) {
                return Err(ModelError::DuplicateParameter(param.name().to_string()));
            }
        }

        Ok(Self {
            name,
            morphology,
            mechanisms,
            params,
            template_config: TemplateConfig::default(),
            icell: None,
        })
    }

    /// Section lists, section arrays and rendering options
    pub fn with_template_config(mut self, config: TemplateConfig) -> Self {
        self.template_config = config;
        self
    }

    pub fn with_seclist_names(mut self, names: Vec<String>) -> Self {
        self.template_config.seclist_names = names;
        self
    }

    pub fn with_secarray_names(mut self, names: Vec<String>) -> Self {
        self.template_config.secarray_names = names;
        self
    }

    pub fn morphology(&self) -> &Arc<dyn Morphology> {
        &self.morphology
    }

    pub fn mechanisms(&self) -> &[Box<dyn Mechanism>] {
        &self.mechanisms
    }

    pub fn params(&self) -> &[ModelParameter] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ModelParameter> {
        self.params.iter().find(|p| p.name() == name)
    }

    pub fn template_config(&self) -> &TemplateConfig {
        &self.template_config
    }

    pub fn params_by_names(&self, names: &[&str]) -> ModelResult<Vec<&ModelParameter>> {
        names
            .iter()
            .map(|name| {
                self.param(name)
                    .ok_or_else(|| ModelError::UnknownParameter(name.to_string()))
            })
            .collect()
    }

    fn index_of(&self, name: &str) -> ModelResult<usize> {
        self.params
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| ModelError::UnknownParameter(name.to_string()))
    }

    fn snapshots(&self) -> Vec<ParameterSnapshot> {
        self.params.iter().map(ModelParameter::snapshot).collect()
    }

    fn restore(&mut self, snapshots: &[ParameterSnapshot]) -> ModelResult<()> {
        for (param, snapshot) in self.params.iter_mut().zip(snapshots) {
            param.restore(snapshot)?;
        }
        Ok(())
    }

    /// Freeze every named parameter, or none of them
    pub fn freeze(&mut self, values: &ParamValues) -> ModelResult<()> {
        let indices = values
            .iter()
            .map(|(name, value)| self.index_of(name).map(|index| (index, value)))
            .collect::<ModelResult<Vec<_>>>()?;

        let snapshots = self.snapshots();
        for (index, value) in indices {
            if let Err(e) = self.params[index].freeze(value) {
                self.restore(&snapshots)?;
                return Err(e);
            }
        }
        debug!(target: "ephys_model::model", "Froze {} parameters of {}", values.len(), self.name);
        Ok(())
    }

    pub fn unfreeze(&mut self, names: &[&str]) -> ModelResult<()> {
        let indices = names
            .iter()
            .map(|name| self.index_of(name))
            .collect::<ModelResult<Vec<_>>>()?;
        for index in indices {
            self.params[index].unfreeze();
        }
        debug!(target: "ephys_model::model", "Unfroze [{}] of {}", names.join(", "), self.name);
        Ok(())
    }

    pub fn check_nonfrozen_params(&self, exempt: &[&str]) -> ModelResult<()> {
        let names: Vec<String> = self
            .params
            .iter()
            .filter(|p| !p.is_frozen() && !exempt.contains(&p.name()))
            .map(|p| p.name().to_string())
            .collect();
        if names.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Unfrozen { names })
        }
    }

    /// Minimal template a live model is instantiated from
    pub fn create_empty_template(
        name: &str,
        seclist_names: &[String],
        secarray_names: &[String],
    ) -> ModelResult<String> {
        template::create_empty_template(name, seclist_names, secarray_names)
    }

    /// Define the minimal template `name` in `sim` unless the host already
    /// knows the symbol, returning the template name
    pub fn create_empty_cell(
        name: &str,
        sim: &dyn Simulator,
        seclist_names: &[String],
        secarray_names: &[String],
    ) -> ModelResult<String> {
        let text = template::create_empty_template(name, seclist_names, secarray_names)?;
        if sim.has_symbol(name) {
            return Ok(name.to_string());
        }
        let defined = sim.define_template(&text)?;
        debug!(target: "ephys_model::model", "Defined empty template {}", defined);
        Ok(defined)
    }

    /// Build a live cell.
    ///
    /// The template is defined only if the host does not know the name yet.
    /// On failure the partially built cell is torn down again.
    pub fn instantiate(&mut self, sim: &dyn Simulator, registry: &InstanceRegistry) -> ModelResult<()> {
        if self.icell.is_some() {
            return Err(ModelError::AlreadyInstantiated(self.name.clone()));
        }
        self.check_nonfrozen_params(&[])?;

        let config = &self.template_config;
        let cell = registry.acquire(sim, &self.name, &[], || {
            template::create_empty_template(&self.name, &config.seclist_names, &config.secarray_names)
        })?;
        self.icell = Some(cell);

        if let Err(e) = self.populate(sim, cell) {
            warn!(target: "ephys_model::model", "Instantiating {} failed: {}", self.name, e);
            if let Err(cleanup) = self.destroy(sim, registry) {
                warn!(target: "ephys_model::model", "Cleanup of {} failed: {}", self.name, cleanup);
            }
            return Err(e);
        }

        info!(target: "ephys_model::model", "Instantiated {} as {}", self.name, cell);
        Ok(())
    }

    fn populate(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<()> {
        self.morphology.instantiate(sim, cell)?;
        for mechanism in &self.mechanisms {
            mechanism.instantiate(sim, cell)?;
        }
        for param in &self.params {
            param.instantiate(sim, cell)?;
        }
        Ok(())
    }

    pub fn destroy(&mut self, sim: &dyn Simulator, registry: &InstanceRegistry) -> ModelResult<()> {
        let Some(cell) = self.icell.take() else {
            return Ok(());
        };

        let mut outcome = registry.release(sim, &self.name, cell).map(|_| ());
        let teardown = std::iter::once(self.morphology.destroy(sim))
            .chain(self.mechanisms.iter().map(|mechanism| mechanism.destroy(sim)));
        for result in teardown {
            if let Err(e) = result {
                if outcome.is_ok() {
                    outcome = Err(e);
                } else {
                    warn!(target: "ephys_model::model", "Teardown of {} failed: {}", self.name, e);
                }
            }
        }
        outcome?;
        info!(target: "ephys_model::model", "Destroyed {} ({})", self.name, cell);
        Ok(())
    }

    pub fn icell(&self) -> Option<CellHandle> {
        self.icell
    }

    /// Render the full template with the model's own options
    pub fn create_hoc(&mut self, values: &ParamValues) -> ModelResult<String> {
        let config = self.template_config.clone();
        self.create_hoc_with(values, &config)
    }

    /// Render with `values` frozen; parameters return to their previous
    /// state afterwards, also on failure
    pub fn create_hoc_with(&mut self, values: &ParamValues, config: &TemplateConfig) -> ModelResult<String> {
        let snapshots = self.snapshots();
        let rendered = self.freeze(values).and_then(|_| {
            template::create_hoc(
                &CellTemplate {
                    name: &self.name,
                    morphology: self.morphology.as_ref(),
                    mechanisms: &self.mechanisms,
                    params: &self.params,
                },
                config,
            )
        });
        self.restore(&snapshots)?;
        rendered
    }
}

impl ModelLifecycle for CellModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn freeze(&mut self, values: &ParamValues) -> ModelResult<()> {
        CellModel::freeze(self, values)
    }

    fn unfreeze(&mut self, names: &[&str]) -> ModelResult<()> {
        CellModel::unfreeze(self, names)
    }

    fn check_nonfrozen_params(&self, exempt: &[&str]) -> ModelResult<()> {
        CellModel::check_nonfrozen_params(self, exempt)
    }

    fn instantiate(&mut self, sim: &dyn Simulator, registry: &InstanceRegistry) -> ModelResult<()> {
        CellModel::instantiate(self, sim, registry)
    }

    fn destroy(&mut self, sim: &dyn Simulator, registry: &InstanceRegistry) -> ModelResult<()> {
        CellModel::destroy(self, sim, registry)
    }

    fn render(&mut self, values: &ParamValues) -> ModelResult<String> {
        self.create_hoc(values)
    }

    fn icell(&self) -> Option<CellHandle> {
        self.icell
    }
}

impl fmt::Display for CellModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        writeln!(f, "  morphology:")?;
        writeln!(f, "    {}", self.morphology.morphology_path().display())?;
        writeln!(f, "  mechanisms:")?;
        for mechanism in &self.mechanisms {
            writeln!(f, "    {}", mechanism.name())?;
        }
        writeln!(f, "  params:")?;
        for param in &self.params {
            writeln!(f, "    {}", param)?;
        }
        Ok(())
    }
}
