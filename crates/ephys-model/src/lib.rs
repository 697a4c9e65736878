// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# ephys model

Assembly of parameterized biophysical cell models:
- Parameters with bounds and a freeze/unfreeze lifecycle
- Value scalers that spread a parameter over the cell as a function of the
  path distance to the soma
- Live instantiation through a host [`Simulator`] session, with a registry
  counting live instances per template name
- Rendering of a self-contained HOC template that rebuilds the same cell

## Layout

- `numeric`, `formula` → values and distribution formulas
- `scaler`, `parameter` → what gets frozen
- `location`, `mechanism`, `morphology` → what a cell is made of
- `host`, `registry` → live cells
- `template`, `models` → code generation and the cell models themselves

Copyright 2025 Neuraville Inc.
Licensed under the Apache License, Version 2.0
*/

pub mod error;
pub mod formula;
pub mod host;
pub mod location;
pub mod mechanism;
pub mod models;
pub mod morphology;
pub mod numeric;
pub mod parameter;
pub mod registry;
pub mod scaler;
pub mod template;

pub use error::{is_valid_identifier, validate_name, ModelError, ModelResult};
pub use formula::{DistributionTemplate, NumericFormula, PartialFormula};
pub use host::{
    CellHandle, HostError, HostResult, MemorySimulator, MorphologySpec, SectionHandle, SectionKind,
    Segment, Simulator, TemplateArg,
};
pub use location::{Location, SeclistLocation};
pub use mechanism::{DensityMechanism, Mechanism};
pub use models::{CellModel, HocCellModel, ModelLifecycle};
pub use morphology::{split_morphology_path, FileMorphology, Morphology};
pub use numeric::{format_general, Numeric};
pub use parameter::{
    Bounds, GlobalParameter, MetaParameter, ModelParameter, ParamValues, Parameter,
    ParameterSnapshot, RangeParameter, SectionParameter,
};
pub use registry::InstanceRegistry;
pub use scaler::{
    CoefficientStore, Distribution, LinearScaler, ReferencePoint, SomaDistanceScaler, ValueScaler,
};
pub use template::{create_empty_template, create_hoc, CellTemplate};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::error::{ModelError, ModelResult};
    pub use crate::host::{MemorySimulator, MorphologySpec, Simulator};
    pub use crate::location::{Location, SeclistLocation};
    pub use crate::mechanism::{DensityMechanism, Mechanism};
    pub use crate::models::{CellModel, HocCellModel, ModelLifecycle};
    pub use crate::morphology::{FileMorphology, Morphology};
    pub use crate::numeric::Numeric;
    pub use crate::parameter::{
        GlobalParameter, MetaParameter, ModelParameter, ParamValues, RangeParameter,
        SectionParameter,
    };
    pub use crate::registry::InstanceRegistry;
    pub use crate::scaler::{CoefficientStore, SomaDistanceScaler, ValueScaler};
}
