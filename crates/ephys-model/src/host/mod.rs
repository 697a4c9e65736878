// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Host simulator session.

Everything the model layer needs from the simulator goes through the
[`Simulator`] trait: template definition from text, symbol bookkeeping,
instance lifetime, geometry queries and attribute access. Handles are plain
`Copy` values; the host owns the objects they point to.

[`MemorySimulator`] is an in-process host used by tests and dry runs.
*/

mod memory;
mod program;

pub use memory::{MemorySimulator, MorphologySpec, SectionKind, SectionSpec};

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Host session errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Undefined symbol: {0}")]
    UndefinedSymbol(String),

    #[error("Symbol {0} is already defined")]
    AlreadyDefined(String),

    /// Template text was rejected
    #[error("Template syntax error: {0}")]
    TemplateSyntax(String),

    #[error("Unknown cell {0}")]
    UnknownCell(CellHandle),

    #[error("Unknown section {0}")]
    UnknownSection(String),

    #[error("Unknown section list {list} on {cell}")]
    UnknownSectionList { cell: CellHandle, list: String },

    #[error("Section {section} has no attribute {attribute}")]
    UnknownAttribute { section: String, attribute: String },

    #[error("Morphology error: {0}")]
    Morphology(String),

    #[error("Execution failed: {0}")]
    Execution(String),
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// Live cell object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellHandle(pub u64);

impl fmt::Display for CellHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Section of a live cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionHandle {
    pub cell: CellHandle,
    pub index: usize,
}

/// Segment center `x` (0 < x < 1) on a section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub section: SectionHandle,
    pub x: f64,
}

/// Argument passed to a template constructor
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateArg {
    Number(f64),
    Str(String),
}

impl From<f64> for TemplateArg {
    fn from(value: f64) -> Self {
        TemplateArg::Number(value)
    }
}

impl From<&str> for TemplateArg {
    fn from(value: &str) -> Self {
        TemplateArg::Str(value.to_string())
    }
}

impl From<String> for TemplateArg {
    fn from(value: String) -> Self {
        TemplateArg::Str(value)
    }
}

/// Simulator session used by models
pub trait Simulator: Send + Sync {
    // --- symbols and templates ---

    fn has_symbol(&self, name: &str) -> bool;

    /// Define a template from text and return its name
    fn define_template(&self, text: &str) -> HostResult<String>;

    fn remove_template(&self, name: &str) -> HostResult<()>;

    /// Live instances of a template
    fn template_instance_count(&self, name: &str) -> HostResult<usize>;

    fn new_instance(&self, template: &str, args: &[TemplateArg]) -> HostResult<CellHandle>;

    fn destroy_instance(&self, cell: CellHandle) -> HostResult<()>;

    // --- geometry ---

    /// Replace the sections of `cell` with the morphology stored at `path`
    fn load_morphology(&self, cell: CellHandle, path: &Path) -> HostResult<()>;

    /// Replace the axon of `cell` with a two-section stub
    fn replace_axon(&self, cell: CellHandle) -> HostResult<()>;

    fn section_list(&self, cell: CellHandle, list: &str) -> HostResult<Vec<SectionHandle>>;

    /// Look up a section by its name, e.g. `soma[0]`
    fn section_by_name(&self, cell: CellHandle, name: &str) -> HostResult<SectionHandle>;

    fn section_name(&self, section: SectionHandle) -> HostResult<String>;

    fn segments(&self, section: SectionHandle) -> HostResult<Vec<Segment>>;

    /// Path distance along the section tree, in microns
    fn distance(&self, from: Segment, to: Segment) -> HostResult<f64>;

    // --- mechanisms and attributes ---

    fn insert_mechanism(&self, section: SectionHandle, suffix: &str) -> HostResult<()>;

    /// Set an attribute on the whole section (every segment)
    fn set_section_value(&self, section: SectionHandle, name: &str, value: f64) -> HostResult<()>;

    fn set_segment_value(&self, segment: Segment, name: &str, value: f64) -> HostResult<()>;

    fn segment_value(&self, segment: Segment, name: &str) -> HostResult<f64>;

    fn set_global(&self, name: &str, value: f64) -> HostResult<()>;

    fn global(&self, name: &str) -> HostResult<f64>;
}
