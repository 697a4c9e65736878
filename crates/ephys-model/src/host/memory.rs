// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
In-process simulator host.

Morphologies are registered up front as [`MorphologySpec`] trees keyed by
path. Templates are read into a small program (see `program.rs`) when they
are defined, and replayed against every new instance: morphology load, axon
replacement, mechanism insertion, section assignments and distance
distributions, in the order the template's `init` runs them.

Sections connect their 0-end to the 1-end of their parent.
*/

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::program::{self, Statement, TemplateProgram};
use super::{CellHandle, HostError, HostResult, SectionHandle, Segment, Simulator, TemplateArg};
use crate::formula::expr;
use crate::numeric::format_general;

/// Length of each of the two replacement axon sections (um)
const STUB_AXON_LENGTH: f64 = 30.0;

/// Attributes every section carries regardless of inserted mechanisms
const BUILTIN_ATTRIBUTES: &[&str] = &["cm", "Ra", "L", "diam", "v", "ena", "ek", "eca", "ecl"];

/// Section type, mapping to a section array and a section list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Soma,
    Basal,
    Apical,
    Axon,
    Myelin,
}

impl SectionKind {
    pub fn array_name(self) -> &'static str {
        match self {
            SectionKind::Soma => "soma",
            SectionKind::Basal => "dend",
            SectionKind::Apical => "apic",
            SectionKind::Axon => "axon",
            SectionKind::Myelin => "myelin",
        }
    }

    pub fn list_name(self) -> &'static str {
        match self {
            SectionKind::Soma => "somatic",
            SectionKind::Basal => "basal",
            SectionKind::Apical => "apical",
            SectionKind::Axon => "axonal",
            SectionKind::Myelin => "myelinated",
        }
    }
}

/// One unbranched section of a synthetic morphology
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSpec {
    pub kind: SectionKind,
    /// Index of the parent section; `None` only for the root
    pub parent: Option<usize>,
    pub length: f64,
    pub diam: f64,
    pub nseg: usize,
}

/// Synthetic morphology: a tree of sections, root first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphologySpec {
    sections: Vec<SectionSpec>,
}

impl MorphologySpec {
    /// Single-section soma
    pub fn with_soma(length: f64, diam: f64) -> Self {
        Self {
            sections: vec![SectionSpec {
                kind: SectionKind::Soma,
                parent: None,
                length,
                diam,
                nseg: 1,
            }],
        }
    }

    /// Append a section and return its index
    pub fn add_section(
        &mut self,
        kind: SectionKind,
        parent: usize,
        length: f64,
        diam: f64,
        nseg: usize,
    ) -> usize {
        self.sections.push(SectionSpec {
            kind,
            parent: Some(parent),
            length,
            diam,
            nseg,
        });
        self.sections.len() - 1
    }

    pub fn with_section(
        mut self,
        kind: SectionKind,
        parent: usize,
        length: f64,
        diam: f64,
        nseg: usize,
    ) -> Self {
        self.add_section(kind, parent, length, diam, nseg);
        self
    }

    /// Soma with one basal and one apical dendrite and a two-section axon
    pub fn simple_cell() -> Self {
        Self::with_soma(20.0, 20.0)
            .with_section(SectionKind::Basal, 0, 200.0, 2.0, 5)
            .with_section(SectionKind::Apical, 0, 400.0, 3.0, 9)
            .with_section(SectionKind::Axon, 0, 100.0, 1.0, 3)
            .with_section(SectionKind::Axon, 3, 100.0, 0.8, 3)
    }

    pub fn sections(&self) -> &[SectionSpec] {
        &self.sections
    }

    pub fn validate(&self) -> HostResult<()> {
        if self.sections.is_empty() {
            return Err(HostError::Morphology("morphology has no sections".to_string()));
        }
        for (index, section) in self.sections.iter().enumerate() {
            match (index, section.parent) {
                (0, None) => {}
                (0, Some(_)) => {
                    return Err(HostError::Morphology("root section has a parent".to_string()))
                }
                (_, Some(parent)) if parent < index => {}
                (_, parent) => {
                    return Err(HostError::Morphology(format!(
                        "section {} has invalid parent {:?}",
                        index, parent
                    )))
                }
            }
            let positive = |v: f64| v.is_finite() && v > 0.0;
            if !positive(section.length) || !positive(section.diam) || section.nseg == 0 {
                return Err(HostError::Morphology(format!(
                    "section {} needs positive length, diameter and segment count",
                    index
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SectionState {
    name: String,
    parent: Option<usize>,
    length: f64,
    diam: f64,
    nseg: usize,
    mechanisms: BTreeSet<String>,
    values: AHashMap<String, f64>,
    segment_values: Vec<AHashMap<String, f64>>,
    alive: bool,
}

impl SectionState {
    fn new(name: String, parent: Option<usize>, length: f64, diam: f64, nseg: usize) -> Self {
        Self {
            name,
            parent,
            length,
            diam,
            nseg,
            mechanisms: BTreeSet::new(),
            values: AHashMap::new(),
            segment_values: vec![AHashMap::new(); nseg],
            alive: true,
        }
    }

    fn accepts(&self, attribute: &str) -> bool {
        BUILTIN_ATTRIBUTES.contains(&attribute)
            || self.mechanisms.iter().any(|mechanism| {
                attribute.len() > mechanism.len() + 1
                    && attribute.ends_with(mechanism.as_str())
                    && attribute[..attribute.len() - mechanism.len()].ends_with('_')
            })
    }

    fn check_attribute(&self, attribute: &str) -> HostResult<()> {
        if self.accepts(attribute) {
            Ok(())
        } else {
            Err(HostError::UnknownAttribute {
                section: self.name.clone(),
                attribute: attribute.to_string(),
            })
        }
    }

    fn segment_index(&self, x: f64) -> usize {
        ((x * self.nseg as f64).floor().max(0.0) as usize).min(self.nseg - 1)
    }

    fn set(&mut self, attribute: &str, value: f64) -> HostResult<()> {
        self.check_attribute(attribute)?;
        match attribute {
            "L" => self.length = value,
            "diam" => self.diam = value,
            _ => {}
        }
        for segment in &mut self.segment_values {
            segment.remove(attribute);
        }
        self.values.insert(attribute.to_string(), value);
        Ok(())
    }

    fn set_at(&mut self, x: f64, attribute: &str, value: f64) -> HostResult<()> {
        self.check_attribute(attribute)?;
        let index = self.segment_index(x);
        self.segment_values[index].insert(attribute.to_string(), value);
        Ok(())
    }

    fn get_at(&self, x: f64, attribute: &str) -> HostResult<f64> {
        self.check_attribute(attribute)?;
        let index = self.segment_index(x);
        if let Some(value) = self.segment_values[index].get(attribute) {
            return Ok(*value);
        }
        if let Some(value) = self.values.get(attribute) {
            return Ok(*value);
        }
        Ok(match attribute {
            "L" => self.length,
            "diam" => self.diam,
            "cm" => 1.0,
            "Ra" => 35.4,
            "v" => -65.0,
            _ => 0.0,
        })
    }

    fn segment_centers(&self) -> Vec<f64> {
        (0..self.nseg)
            .map(|i| (i as f64 + 0.5) / self.nseg as f64)
            .collect()
    }
}

#[derive(Debug, Clone)]
struct CellState {
    template: String,
    sections: Vec<SectionState>,
    lists: BTreeMap<String, Vec<usize>>,
}

impl CellState {
    fn new(template: &str, seclists: &[String]) -> Self {
        Self {
            template: template.to_string(),
            sections: Vec::new(),
            lists: seclists.iter().map(|name| (name.clone(), Vec::new())).collect(),
        }
    }

    fn section(&self, index: usize) -> HostResult<&SectionState> {
        self.sections
            .get(index)
            .filter(|s| s.alive)
            .ok_or_else(|| HostError::UnknownSection(format!("#{}", index)))
    }

    fn section_mut(&mut self, index: usize) -> HostResult<&mut SectionState> {
        self.sections
            .get_mut(index)
            .filter(|s| s.alive)
            .ok_or_else(|| HostError::UnknownSection(format!("#{}", index)))
    }

    fn index_by_name(&self, name: &str) -> HostResult<usize> {
        self.sections
            .iter()
            .position(|s| s.alive && s.name == name)
            .ok_or_else(|| HostError::UnknownSection(name.to_string()))
    }

    fn list(&self, cell: CellHandle, name: &str) -> HostResult<Vec<usize>> {
        self.lists
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::UnknownSectionList {
                cell,
                list: name.to_string(),
            })
    }

    fn append(&mut self, section: SectionState, lists: &[&str]) -> usize {
        let index = self.sections.len();
        self.sections.push(section);
        for list in lists {
            self.lists.entry(list.to_string()).or_default().push(index);
        }
        index
    }

    fn load(&mut self, spec: &MorphologySpec) {
        for section in &mut self.sections {
            section.alive = false;
        }
        for members in self.lists.values_mut() {
            members.clear();
        }

        let base = self.sections.len();
        let mut counters: AHashMap<SectionKind, usize> = AHashMap::new();
        for section in spec.sections() {
            let counter = counters.entry(section.kind).or_insert(0);
            let name = format!("{}[{}]", section.kind.array_name(), counter);
            *counter += 1;
            self.append(
                SectionState::new(
                    name,
                    section.parent.map(|p| base + p),
                    section.length,
                    section.diam,
                    section.nseg,
                ),
                &["all", section.kind.list_name()],
            );
        }
    }

    fn replace_axon(&mut self) -> HostResult<()> {
        let axonal = self.lists.get("axonal").cloned().unwrap_or_default();
        let diams: Vec<f64> = axonal
            .iter()
            .filter_map(|i| self.sections.get(*i))
            .filter(|s| s.alive)
            .map(|s| s.diam)
            .take(2)
            .collect();
        let first = diams.first().copied().unwrap_or(1.0);
        let second = diams.get(1).copied().unwrap_or(first);

        for index in &axonal {
            if let Some(section) = self.sections.get_mut(*index) {
                section.alive = false;
            }
        }
        for members in self.lists.values_mut() {
            members.retain(|index| !axonal.contains(index));
        }

        let soma = self
            .index_by_name("soma[0]")
            .map_err(|_| HostError::Morphology("cannot replace axon without soma[0]".to_string()))?;
        let nseg = 1 + 2 * (STUB_AXON_LENGTH / 40.0) as usize;
        let axon0 = self.append(
            SectionState::new("axon[0]".to_string(), Some(soma), STUB_AXON_LENGTH, first, nseg),
            &["all", "axonal"],
        );
        self.append(
            SectionState::new("axon[1]".to_string(), Some(axon0), STUB_AXON_LENGTH, second, nseg),
            &["all", "axonal"],
        );
        Ok(())
    }

    /// Path from `index` up to the root, starting with `index` itself
    fn ancestry(&self, index: usize) -> Vec<usize> {
        let mut path = vec![index];
        let mut current = index;
        while let Some(parent) = self.sections.get(current).and_then(|s| s.parent) {
            path.push(parent);
            current = parent;
        }
        path
    }

    /// Distance from `(index, x)` to where its path enters `ancestor`, and
    /// the entry position on `ancestor`
    fn climb(&self, index: usize, x: f64, ancestor: usize) -> (f64, f64) {
        if index == ancestor {
            return (0.0, x);
        }
        let mut distance = x * self.sections[index].length;
        let mut current = self.sections[index].parent;
        while let Some(section) = current {
            if section == ancestor {
                break;
            }
            distance += self.sections[section].length;
            current = self.sections[section].parent;
        }
        (distance, 1.0)
    }

    fn path_distance(&self, from: (usize, f64), to: (usize, f64)) -> HostResult<f64> {
        let from_path = self.ancestry(from.0);
        let to_path = self.ancestry(to.0);
        let common = from_path
            .iter()
            .find(|section| to_path.contains(section))
            .copied()
            .ok_or_else(|| HostError::Execution("sections are not connected".to_string()))?;

        let (up_from, entry_from) = self.climb(from.0, from.1, common);
        let (up_to, entry_to) = self.climb(to.0, to.1, common);
        Ok(up_from + up_to + (entry_from - entry_to).abs() * self.sections[common].length)
    }
}

#[derive(Debug)]
struct TemplateState {
    program: TemplateProgram,
    instances: Vec<CellHandle>,
}

#[derive(Debug, Default)]
struct HostState {
    templates: AHashMap<String, TemplateState>,
    cells: AHashMap<CellHandle, CellState>,
    morphologies: AHashMap<PathBuf, MorphologySpec>,
    globals: AHashMap<String, f64>,
    next_cell: u64,
}

impl HostState {
    fn cell(&self, handle: CellHandle) -> HostResult<&CellState> {
        self.cells.get(&handle).ok_or(HostError::UnknownCell(handle))
    }

    fn cell_mut(&mut self, handle: CellHandle) -> HostResult<&mut CellState> {
        self.cells.get_mut(&handle).ok_or(HostError::UnknownCell(handle))
    }

    fn morphology(&self, path: &Path) -> HostResult<&MorphologySpec> {
        self.morphologies
            .get(&normalize(path))
            .ok_or_else(|| HostError::Morphology(format!("no morphology registered at {}", path.display())))
    }

    fn run_program(
        &mut self,
        handle: CellHandle,
        program: &TemplateProgram,
        args: &[TemplateArg],
    ) -> HostResult<()> {
        if let Some(call) = &program.morphology {
            let dir = match args.get(1) {
                Some(TemplateArg::Str(dir)) => Some(dir.as_str()),
                _ => None,
            };
            let file = match args.get(2) {
                Some(TemplateArg::Str(file)) => Some(file.as_str()),
                _ => call.default_file.as_deref(),
            };
            if let (Some(dir), Some(file)) = (dir, file) {
                let spec = self.morphology(&Path::new(dir).join(file))?.clone();
                self.cell_mut(handle)?.load(&spec);
            }
        }

        if program.replace_axon {
            self.cell_mut(handle)?.replace_axon()?;
        }

        for statement in &program.statements {
            let cell = self.cell_mut(handle)?;
            match statement {
                Statement::Insert { seclist, suffix } => {
                    for index in cell.list(handle, seclist)? {
                        cell.section_mut(index)?.mechanisms.insert(suffix.clone());
                    }
                }
                Statement::Assign {
                    seclist,
                    attribute,
                    value,
                } => {
                    for index in cell.list(handle, seclist)? {
                        cell.section_mut(index)?.set(attribute, *value)?;
                    }
                }
                Statement::Distribute {
                    seclist,
                    attribute,
                    formula,
                } => {
                    let (reference_name, reference_x) = &program.reference;
                    let reference = (cell.index_by_name(reference_name)?, *reference_x);
                    for index in cell.list(handle, seclist)? {
                        for x in cell.section(index)?.segment_centers() {
                            let distance = cell.path_distance(reference, (index, x))?;
                            let text = fill_placeholder(formula, distance);
                            let value = expr::evaluate(&text)
                                .map_err(|reason| HostError::Execution(format!("{}: {}", text, reason)))?;
                            cell.section_mut(index)?.set_at(x, attribute, value)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Drop `.` components so `./a.swc` and `a.swc` name the same file
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// Replace each printf conversion (`%g`, `%.17g`, `%f`, ...) with `distance`
fn fill_placeholder(formula: &str, distance: f64) -> String {
    let chars: Vec<char> = formula.chars().collect();
    let mut out = String::with_capacity(formula.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
            j += 1;
        }
        let spec: String = chars[i + 1..j].iter().collect();
        let precision = spec
            .split_once('.')
            .and_then(|(_, p)| p.parse::<usize>().ok())
            .unwrap_or(6);
        match chars.get(j) {
            Some('g') => out.push_str(&format_general(distance, precision)),
            Some('f') => out.push_str(&format!("{:.*}", precision, distance)),
            Some('e') => out.push_str(&format!("{:.*e}", precision, distance)),
            Some('%') if spec.is_empty() => out.push('%'),
            _ => {
                out.extend(&chars[i..j]);
                i = j;
                continue;
            }
        }
        i = j + 1;
    }
    out
}

/// In-process host session
#[derive(Debug, Default)]
pub struct MemorySimulator {
    state: RwLock<HostState>,
}

impl MemorySimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `spec` loadable from `path`
    pub fn register_morphology(&self, path: impl AsRef<Path>, spec: MorphologySpec) -> HostResult<()> {
        spec.validate()?;
        let path = normalize(path.as_ref());
        debug!(target: "ephys_model::host", "Registered morphology {} ({} sections)", path.display(), spec.sections().len());
        self.state.write().morphologies.insert(path, spec);
        Ok(())
    }

    /// Mechanisms inserted in a section
    pub fn mechanisms(&self, section: SectionHandle) -> HostResult<Vec<String>> {
        let state = self.state.read();
        let cell = state.cell(section.cell)?;
        Ok(cell.section(section.index)?.mechanisms.iter().cloned().collect())
    }

    /// Template a live cell was built from
    pub fn cell_template(&self, cell: CellHandle) -> HostResult<String> {
        Ok(self.state.read().cell(cell)?.template.clone())
    }

    pub fn live_cells(&self) -> usize {
        self.state.read().cells.len()
    }
}

impl Simulator for MemorySimulator {
    fn has_symbol(&self, name: &str) -> bool {
        self.state.read().templates.contains_key(name)
    }

    fn define_template(&self, text: &str) -> HostResult<String> {
        let program = program::parse(text)?;
        let mut state = self.state.write();
        if state.templates.contains_key(&program.name) {
            return Err(HostError::AlreadyDefined(program.name));
        }
        for (name, value) in &program.globals {
            state.globals.insert(name.clone(), *value);
        }
        let name = program.name.clone();
        debug!(
            target: "ephys_model::host",
            "Defined template {} ({} statements)",
            name,
            program.statements.len()
        );
        state.templates.insert(
            name.clone(),
            TemplateState {
                program,
                instances: Vec::new(),
            },
        );
        Ok(name)
    }

    fn remove_template(&self, name: &str) -> HostResult<()> {
        let mut state = self.state.write();
        let template = state
            .templates
            .get(name)
            .ok_or_else(|| HostError::UndefinedSymbol(name.to_string()))?;
        if !template.instances.is_empty() {
            return Err(HostError::Execution(format!(
                "template {} still has {} instances",
                name,
                template.instances.len()
            )));
        }
        state.templates.remove(name);
        debug!(target: "ephys_model::host", "Removed template {}", name);
        Ok(())
    }

    fn template_instance_count(&self, name: &str) -> HostResult<usize> {
        self.state
            .read()
            .templates
            .get(name)
            .map(|t| t.instances.len())
            .ok_or_else(|| HostError::UndefinedSymbol(name.to_string()))
    }

    fn new_instance(&self, template: &str, args: &[TemplateArg]) -> HostResult<CellHandle> {
        let mut state = self.state.write();
        let program = state
            .templates
            .get(template)
            .map(|t| t.program.clone())
            .ok_or_else(|| HostError::UndefinedSymbol(template.to_string()))?;

        let handle = CellHandle(state.next_cell);
        state.next_cell += 1;
        state
            .cells
            .insert(handle, CellState::new(template, &program.seclists));

        if let Err(err) = state.run_program(handle, &program, args) {
            state.cells.remove(&handle);
            return Err(err);
        }
        if let Some(entry) = state.templates.get_mut(template) {
            entry.instances.push(handle);
        }
        trace!(target: "ephys_model::host", "New {} instance {}", template, handle);
        Ok(handle)
    }

    fn destroy_instance(&self, cell: CellHandle) -> HostResult<()> {
        let mut state = self.state.write();
        let removed = state.cells.remove(&cell).ok_or(HostError::UnknownCell(cell))?;
        if let Some(template) = state.templates.get_mut(&removed.template) {
            template.instances.retain(|handle| *handle != cell);
        }
        trace!(target: "ephys_model::host", "Destroyed {}", cell);
        Ok(())
    }

    fn load_morphology(&self, cell: CellHandle, path: &Path) -> HostResult<()> {
        let mut state = self.state.write();
        let spec = state.morphology(path)?.clone();
        state.cell_mut(cell)?.load(&spec);
        Ok(())
    }

    fn replace_axon(&self, cell: CellHandle) -> HostResult<()> {
        self.state.write().cell_mut(cell)?.replace_axon()
    }

    fn section_list(&self, cell: CellHandle, list: &str) -> HostResult<Vec<SectionHandle>> {
        let state = self.state.read();
        Ok(state
            .cell(cell)?
            .list(cell, list)?
            .into_iter()
            .map(|index| SectionHandle { cell, index })
            .collect())
    }

    fn section_by_name(&self, cell: CellHandle, name: &str) -> HostResult<SectionHandle> {
        let state = self.state.read();
        let index = state.cell(cell)?.index_by_name(name)?;
        Ok(SectionHandle { cell, index })
    }

    fn section_name(&self, section: SectionHandle) -> HostResult<String> {
        let state = self.state.read();
        Ok(state.cell(section.cell)?.section(section.index)?.name.clone())
    }

    fn segments(&self, section: SectionHandle) -> HostResult<Vec<Segment>> {
        let state = self.state.read();
        Ok(state
            .cell(section.cell)?
            .section(section.index)?
            .segment_centers()
            .into_iter()
            .map(|x| Segment { section, x })
            .collect())
    }

    fn distance(&self, from: Segment, to: Segment) -> HostResult<f64> {
        if from.section.cell != to.section.cell {
            return Err(HostError::Execution(format!(
                "no path between {} and {}",
                from.section.cell, to.section.cell
            )));
        }
        let state = self.state.read();
        let cell = state.cell(from.section.cell)?;
        cell.section(from.section.index)?;
        cell.section(to.section.index)?;
        cell.path_distance((from.section.index, from.x), (to.section.index, to.x))
    }

    fn insert_mechanism(&self, section: SectionHandle, suffix: &str) -> HostResult<()> {
        let mut state = self.state.write();
        state
            .cell_mut(section.cell)?
            .section_mut(section.index)?
            .mechanisms
            .insert(suffix.to_string());
        Ok(())
    }

    fn set_section_value(&self, section: SectionHandle, name: &str, value: f64) -> HostResult<()> {
        let mut state = self.state.write();
        state
            .cell_mut(section.cell)?
            .section_mut(section.index)?
            .set(name, value)
    }

    fn set_segment_value(&self, segment: Segment, name: &str, value: f64) -> HostResult<()> {
        let mut state = self.state.write();
        state
            .cell_mut(segment.section.cell)?
            .section_mut(segment.section.index)?
            .set_at(segment.x, name, value)
    }

    fn segment_value(&self, segment: Segment, name: &str) -> HostResult<f64> {
        let state = self.state.read();
        state
            .cell(segment.section.cell)?
            .section(segment.section.index)?
            .get_at(segment.x, name)
    }

    fn set_global(&self, name: &str, value: f64) -> HostResult<()> {
        self.state.write().globals.insert(name.to_string(), value);
        Ok(())
    }

    fn global(&self, name: &str) -> HostResult<f64> {
        self.state
            .read()
            .globals
            .get(name)
            .copied()
            .ok_or_else(|| HostError::UndefinedSymbol(name.to_string()))
    }
}
