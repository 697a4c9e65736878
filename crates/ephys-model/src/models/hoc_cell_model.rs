// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::ModelLifecycle;
use crate::error::{validate_name, ModelError, ModelResult};
use crate::host::{CellHandle, Simulator, TemplateArg};
use crate::morphology::split_morphology_path;
use crate::parameter::{ModelParameter, ParamValues};
use crate::registry::InstanceRegistry;

/// Cell model backed by ready-made template text.
///
/// The template is constructed as `Template(0, morphology_dir,
/// morphology_file)`. It carries no parameters of its own, so the parameter
/// operations of [`ModelLifecycle`] do nothing.
#[derive(Debug, Clone)]
pub struct HocCellModel {
    name: String,
    template_name: String,
    morphology_path: PathBuf,
    hoc_text: String,
    icell: Option<CellHandle>,
}

impl HocCellModel {
    pub fn from_string(
        name: impl Into<String>,
        morphology_path: impl Into<PathBuf>,
        hoc_text: impl Into<String>,
    ) -> ModelResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        let hoc_text = hoc_text.into();
        let template_name = template_name(&hoc_text)?;
        Ok(Self {
            name,
            template_name,
            morphology_path: morphology_path.into(),
            hoc_text,
            icell: None,
        })
    }

    pub fn from_file(
        name: impl Into<String>,
        morphology_path: impl Into<PathBuf>,
        template_path: impl AsRef<Path>,
    ) -> ModelResult<Self> {
        let text = std::fs::read_to_string(template_path.as_ref())?;
        debug!(
            target: "ephys_model::model",
            "Read template {} ({} bytes)",
            template_path.as_ref().display(),
            text.len()
        );
        Self::from_string(name, morphology_path, text)
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn hoc_text(&self) -> &str {
        &self.hoc_text
    }

    pub fn morphology_path(&self) -> &Path {
        &self.morphology_path
    }

    /// Always empty, the template text owns its values
    pub fn params_by_names(&self, _names: &[&str]) -> ModelResult<Vec<&ModelParameter>> {
        Ok(Vec::new())
    }

    /// Define `text` in `sim` unless its template already exists, returning
    /// the template name
    pub fn load_hoc_template(sim: &dyn Simulator, text: &str) -> ModelResult<String> {
        let name = template_name(text)?;
        if sim.has_symbol(&name) {
            debug!(target: "ephys_model::model", "Template {} already loaded", name);
        } else {
            sim.define_template(text)?;
            debug!(target: "ephys_model::model", "Loaded template {}", name);
        }
        Ok(name)
    }

    fn constructor_args(&self) -> Vec<TemplateArg> {
        let (dir, file) = split_morphology_path(&self.morphology_path);
        let mut args = vec![TemplateArg::Number(0.0), TemplateArg::Str(dir)];
        if let Some(file) = file {
            args.push(TemplateArg::Str(file));
        }
        args
    }

    pub fn instantiate(&mut self, sim: &dyn Simulator, registry: &InstanceRegistry) -> ModelResult<()> {
        if self.icell.is_some() {
            return Err(ModelError::AlreadyInstantiated(self.name.clone()));
        }
        let args = self.constructor_args();
        let cell = registry.acquire(sim, &self.template_name, &args, || Ok(self.hoc_text.clone()))?;
        self.icell = Some(cell);
        info!(
            target: "ephys_model::model",
            "Instantiated {} from template {} as {}",
            self.name,
            self.template_name,
            cell
        );
        Ok(())
    }

    pub fn destroy(&mut self, sim: &dyn Simulator, registry: &InstanceRegistry) -> ModelResult<()> {
        if let Some(cell) = self.icell.take() {
            registry.release(sim, &self.template_name, cell)?;
            info!(target: "ephys_model::model", "Destroyed {} ({})", self.name, cell);
        }
        Ok(())
    }
}

/// Name following the first `begintemplate`
fn template_name(text: &str) -> ModelResult<String> {
    let name = text
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("begintemplate"))
        .and_then(|rest| rest.split_whitespace().next())
        .ok_or_else(|| ModelError::Validation("template text has no begintemplate".to_string()))?;
    validate_name(name)?;
    Ok(name.to_string())
}

impl ModelLifecycle for HocCellModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn freeze(&mut self, _values: &ParamValues) -> ModelResult<()> {
        Ok(())
    }

    fn unfreeze(&mut self, _names: &[&str]) -> ModelResult<()> {
        Ok(())
    }

    fn check_nonfrozen_params(&self, _exempt: &[&str]) -> ModelResult<()> {
        Ok(())
    }

    fn instantiate(&mut self, sim: &dyn Simulator, registry: &InstanceRegistry) -> ModelResult<()> {
        HocCellModel::instantiate(self, sim, registry)
    }

    fn destroy(&mut self, sim: &dyn Simulator, registry: &InstanceRegistry) -> ModelResult<()> {
        HocCellModel::destroy(self, sim, registry)
    }

    fn render(&mut self, _values: &ParamValues) -> ModelResult<String> {
        Ok(self.hoc_text.clone())
    }

    fn icell(&self) -> Option<CellHandle> {
        self.icell
    }
}

impl fmt::Display for HocCellModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        writeln!(f, "  template: {}", self.template_name)?;
        writeln!(f, "  morphology: {}", self.morphology_path.display())
    }
}
