// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Live instance registry.

Several models may share one template name. The registry counts their live
instances per name so the template is defined once, on the first
instantiation, and removed from the host when the last instance goes away.

Acquire (define-if-absent, construct, increment) and release (destroy,
decrement, remove-at-zero) each run entirely under the registry lock.
*/

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ModelError, ModelResult};
use crate::host::{CellHandle, Simulator, TemplateArg};

static GLOBAL: Lazy<InstanceRegistry> = Lazy::new(InstanceRegistry::new);

/// Template name -> live instance count
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    counts: Mutex<AHashMap<String, usize>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static InstanceRegistry {
        &GLOBAL
    }

    /// Define `name` from `template` unless the host already knows it, then
    /// construct an instance and count it
    pub fn acquire<F>(
        &self,
        sim: &dyn Simulator,
        name: &str,
        args: &[TemplateArg],
        template: F,
    ) -> ModelResult<CellHandle>
    where
        F: FnOnce() -> ModelResult<String>,
    {
        let mut counts = self.counts.lock();

        let defined_here = !sim.has_symbol(name);
        if !defined_here {
            debug!(target: "ephys_model::registry", "Template {} already defined", name);
        } else {
            let defined = sim.define_template(&template()?)?;
            if defined != name {
                // Leave the host as it was
                if let Err(e) = sim.remove_template(&defined) {
                    warn!(target: "ephys_model::registry", "Failed to remove template {}: {}", defined, e);
                }
                return Err(ModelError::Validation(format!(
                    "template text defines {} instead of {}",
                    defined, name
                )));
            }
            debug!(target: "ephys_model::registry", "Defined template {}", name);
        }

        let cell = match sim.new_instance(name, args) {
            Ok(cell) => cell,
            Err(e) => {
                if defined_here {
                    if let Err(remove) = sim.remove_template(name) {
                        warn!(target: "ephys_model::registry", "Failed to remove template {}: {}", name, remove);
                    }
                }
                return Err(e.into());
            }
        };
        let count = counts.entry(name.to_string()).or_insert(0);
        *count += 1;
        info!(
            target: "ephys_model::registry",
            "Instantiated {} as {} (live instances: {})",
            name,
            cell,
            count
        );
        Ok(cell)
    }

    /// Destroy `cell` and uncount it; at zero the template is removed from
    /// the host. Returns the remaining count.
    ///
    /// The count is updated even when the host fails to destroy the cell.
    pub fn release(&self, sim: &dyn Simulator, name: &str, cell: CellHandle) -> ModelResult<usize> {
        let mut counts = self.counts.lock();

        let destroyed = sim.destroy_instance(cell);

        let remaining = match counts.get_mut(name) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => {
                warn!(target: "ephys_model::registry", "Releasing {} with no registered instances", name);
                0
            }
        };

        if remaining == 0 {
            counts.remove(name);
            if sim.has_symbol(name) {
                sim.remove_template(name)?;
                debug!(target: "ephys_model::registry", "Removed template {}", name);
            }
        }

        destroyed?;
        info!(
            target: "ephys_model::registry",
            "Released {} of {} (live instances: {})",
            cell,
            name,
            remaining
        );
        Ok(remaining)
    }

    /// Live instances registered under `name`
    pub fn count(&self, name: &str) -> usize {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.counts.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemorySimulator;

    fn text(name: &str) -> ModelResult<String> {
        Ok(format!("begintemplate {0}\nendtemplate {0}\n", name))
    }

    #[test]
    fn test_counts_and_symbol_lifetime() {
        let sim = MemorySimulator::new();
        let registry = InstanceRegistry::new();

        assert_eq!(registry.count("Cell"), 0);
        let first = registry.acquire(&sim, "Cell", &[], || text("Cell")).unwrap();
        assert_eq!(registry.count("Cell"), 1);
        let second = registry
            .acquire(&sim, "Cell", &[], || panic!("template must not be redefined"))
            .unwrap();
        assert_eq!(registry.count("Cell"), 2);
        assert_eq!(registry.names(), vec!["Cell"]);

        assert_eq!(registry.release(&sim, "Cell", first).unwrap(), 1);
        assert!(sim.has_symbol("Cell"));
        assert_eq!(registry.release(&sim, "Cell", second).unwrap(), 0);
        assert!(!sim.has_symbol("Cell"));
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_mismatched_template_name() {
        let sim = MemorySimulator::new();
        let registry = InstanceRegistry::new();
        let err = registry
            .acquire(&sim, "Cell", &[], || text("Other"))
            .unwrap_err();
        assert!(matches!(err, ModelError::Validation(_)));
        assert!(!sim.has_symbol("Other"));
        assert_eq!(registry.count("Cell"), 0);
    }

    #[test]
    fn test_failed_definition_leaves_no_count() {
        let sim = MemorySimulator::new();
        let registry = InstanceRegistry::new();
        let err = registry
            .acquire(&sim, "Cell", &[], || Ok("begintemplate Cell\n".to_string()))
            .unwrap_err();
        assert!(matches!(err, ModelError::Host(_)));
        assert_eq!(registry.count("Cell"), 0);
    }

    #[test]
    fn test_failed_construction_removes_new_template() {
        let sim = MemorySimulator::new();
        let registry = InstanceRegistry::new();
        let text = "begintemplate Cell\nproc init() {\n  load_morphology($s2, \"missing.swc\")\n}\nendtemplate Cell\n";
        let args = [TemplateArg::Number(0.0), TemplateArg::Str(".".to_string())];
        assert!(registry
            .acquire(&sim, "Cell", &args, || Ok(text.to_string()))
            .is_err());
        assert!(!sim.has_symbol("Cell"));
        assert_eq!(registry.count("Cell"), 0);
    }

    #[test]
    fn test_release_unknown_cell_still_restores_invariant() {
        let sim = MemorySimulator::new();
        let registry = InstanceRegistry::new();
        let cell = registry.acquire(&sim, "Cell", &[], || text("Cell")).unwrap();
        sim.destroy_instance(cell).unwrap();

        assert!(registry.release(&sim, "Cell", cell).is_err());
        assert_eq!(registry.count("Cell"), 0);
        assert!(!sim.has_symbol("Cell"));
    }
}
