// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
HOC template generation.

Two templates are produced here:

- the empty class a live model is instantiated from: section lists,
  section arrays and the `CellRef` self reference, nothing else
- the complete cell template, which rebuilds the model on its own: it loads
  the morphology, discretizes it, optionally replaces the axon, inserts
  mechanisms and assigns parameters. Distance-scaled parameters are written
  as formulas evaluated per segment by `distribute_distance`.
*/

use ephys_config::TemplateConfig;
use tracing::debug;

use crate::error::{validate_name, ModelError, ModelResult};
use crate::mechanism::Mechanism;
use crate::morphology::{split_morphology_path, Morphology};
use crate::numeric::format_general;
use crate::parameter::ModelParameter;
use crate::scaler::{Distribution, ReferencePoint};

/// Minimal class: section lists, section arrays, `CellRef`
pub fn create_empty_template(
    name: &str,
    seclist_names: &[String],
    secarray_names: &[String],
) -> ModelResult<String> {
    validate_name(name)?;
    for list in seclist_names.iter().chain(secarray_names) {
        validate_name(list)?;
    }

    let mut objrefs = vec!["this".to_string(), "CellRef".to_string()];
    objrefs.extend(seclist_names.iter().cloned());

    let mut text = format!("begintemplate {}\n", name);
    text.push_str(&format!("  objref {}\n", objrefs.join(", ")));
    text.push_str("  proc init() {\n");
    for list in seclist_names {
        text.push_str(&format!("    {} = new SectionList()\n", list));
    }
    text.push_str("    forall delete_section()\n");
    text.push_str("    CellRef = this\n");
    text.push_str("  }\n\n");
    text.push_str("  gid = 0\n\n");
    text.push_str("  proc destroy() {localobj nil\n");
    text.push_str("    CellRef = nil\n");
    text.push_str("  }\n\n");
    if !secarray_names.is_empty() {
        let arrays: Vec<String> = secarray_names.iter().map(|a| format!("{}[1]", a)).collect();
        text.push_str(&format!("  create {}\n", arrays.join(", ")));
    }
    text.push_str(&format!("endtemplate {}\n", name));
    Ok(text)
}

/// Model pieces the full template is rendered from
pub struct CellTemplate<'a> {
    pub name: &'a str,
    pub morphology: &'a dyn Morphology,
    pub mechanisms: &'a [Box<dyn Mechanism>],
    pub params: &'a [ModelParameter],
}

/// Statements collected per section list
struct Blocks {
    order: Vec<String>,
    entries: Vec<(String, Vec<String>)>,
}

impl Blocks {
    fn new(order: &[String]) -> Self {
        Self {
            order: order.to_vec(),
            entries: Vec::new(),
        }
    }

    fn push(&mut self, seclist: &str, line: String) {
        match self.entries.iter_mut().find(|(list, _)| list == seclist) {
            Some((_, lines)) => {
                if !lines.contains(&line) {
                    lines.push(line);
                }
            }
            None => self.entries.push((seclist.to_string(), vec![line])),
        }
    }

    /// Canonical lists first, others in first-seen order
    fn sorted(mut self) -> Vec<(String, Vec<String>)> {
        let order = self.order;
        self.entries.sort_by_key(|(list, _)| {
            order
                .iter()
                .position(|name| name == list)
                .unwrap_or(usize::MAX)
        });
        self.entries
    }
}

fn seclist_of<'p>(param: &'p ModelParameter, index: usize) -> ModelResult<&'p str> {
    let location = &param.locations()[index];
    location.seclist_name().ok_or_else(|| {
        ModelError::Validation(format!(
            "parameter {}: location {} has no section list",
            param.name(),
            location.name()
        ))
    })
}

/// Render the complete cell template.
///
/// Every parameter must be frozen.
pub fn create_hoc(cell: &CellTemplate<'_>, config: &TemplateConfig) -> ModelResult<String> {
    validate_name(cell.name)?;

    let unfrozen: Vec<String> = cell
        .params
        .iter()
        .filter(|p| !p.is_frozen())
        .map(|p| p.name().to_string())
        .collect();
    if !unfrozen.is_empty() {
        return Err(ModelError::Unfrozen { names: unfrozen });
    }

    let replace_axon = cell.morphology.do_replace_axon();
    if replace_axon && !config.seclist_names.iter().any(|l| l == "axonal") {
        return Err(ModelError::Validation(
            "axon replacement needs an 'axonal' section list".to_string(),
        ));
    }

    let mut channels = Blocks::new(&config.seclist_names);
    for mechanism in cell.mechanisms {
        for (seclist, suffix) in mechanism.insertions()? {
            channels.push(&seclist, format!("insert {}", suffix));
        }
    }

    let mut globals = Vec::new();
    let mut sections = Blocks::new(&config.seclist_names);
    let mut distributions = Blocks::new(&config.seclist_names);
    let mut reference: Option<ReferencePoint> = None;

    for param in cell.params {
        match param {
            ModelParameter::Meta(_) => {}
            ModelParameter::Global(p) => {
                if config.ignored_globals.iter().any(|g| g == p.param_name()) {
                    continue;
                }
                let value = p.core().frozen_value()?;
                globals.push(format!("{} = {}", p.param_name(), value.to_general()));
            }
            ModelParameter::Section(p) => {
                let value = p.core().frozen_value()?.to_general();
                for index in 0..p.locations().len() {
                    let seclist = seclist_of(param, index)?;
                    sections.push(seclist, format!("{} = {}", p.param_name(), value));
                }
            }
            ModelParameter::Range(p) => match p.distribution()? {
                Distribution::Uniform(value) => {
                    for index in 0..p.locations().len() {
                        let seclist = seclist_of(param, index)?;
                        sections.push(
                            seclist,
                            format!("{} = {}", p.param_name(), format_general(value, 17)),
                        );
                    }
                }
                Distribution::Distance(formula) => {
                    let scaler_reference = p
                        .scaler()
                        .and_then(|s| s.reference())
                        .cloned()
                        .unwrap_or_default();
                    match &reference {
                        Some(existing) if *existing != scaler_reference => {
                            return Err(ModelError::Validation(format!(
                                "parameter {} measures distance from {}, others from {}",
                                p.core().name(),
                                scaler_reference,
                                existing
                            )))
                        }
                        Some(_) => {}
                        None => reference = Some(scaler_reference),
                    }
                    let lazy = formula.to_lazy(&config.distance_placeholder);
                    for index in 0..p.locations().len() {
                        let seclist = seclist_of(param, index)?;
                        distributions.push(
                            seclist,
                            format!(
                                "distribute_distance(CellRef.{}, \"{}\", \"{}\")",
                                seclist,
                                p.param_name(),
                                lazy
                            ),
                        );
                    }
                }
            },
        }
    }

    let reference = reference.unwrap_or_default();
    let (_, morphology_file) = split_morphology_path(cell.morphology.morphology_path());

    let mut text = String::new();
    if config.banner {
        text.push_str(&format!(
            "/*\nCreated by ephys {} at {}\n*/\n",
            env!("CARGO_PKG_VERSION"),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
    }
    for line in &globals {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str("load_file(\"stdrun.hoc\")\nload_file(\"import3d.hoc\")\n\n");

    render_header(&mut text, cell.name, config);
    render_init(
        &mut text,
        &config.seclist_names,
        morphology_file.as_deref().unwrap_or_default(),
        replace_axon,
    );
    render_load_morphology(&mut text);
    render_distribute_distance(&mut text, &reference);
    text.push_str(&format!(
        "proc geom_nseg() {{\n  this.geom_nsec()\n  this.geom_nseg_fixed({})\n  this.geom_nsec()\n}}\n\n",
        config.nseg_frequency
    ));

    text.push_str("proc insertChannel() {\n");
    for (seclist, lines) in channels.sorted() {
        render_block(&mut text, "this", &seclist, &lines);
    }
    text.push_str("}\n\n");

    text.push_str("proc biophys() {\n");
    for (seclist, lines) in sections.sorted() {
        render_block(&mut text, "CellRef", &seclist, &lines);
        text.push('\n');
    }
    for (_, lines) in distributions.sorted() {
        for line in lines {
            text.push_str(&format!("  {}\n", line));
        }
    }
    text.push_str("}\n\n");

    render_utilities(&mut text);
    if replace_axon {
        render_replace_axon(&mut text, config.nseg_frequency);
    }
    text.push_str(&format!("endtemplate {}\n", cell.name));

    debug!(
        target: "ephys_model::template",
        "Rendered template {} ({} bytes, replace_axon={})",
        cell.name,
        text.len(),
        replace_axon
    );
    Ok(text)
}

fn render_block(text: &mut String, owner: &str, seclist: &str, lines: &[String]) {
    text.push_str(&format!("  forsec {}.{} {{\n", owner, seclist));
    for line in lines {
        text.push_str(&format!("    {}\n", line));
    }
    text.push_str("  }\n");
}

fn render_header(text: &mut String, name: &str, config: &TemplateConfig) {
    text.push_str(&format!("begintemplate {}\n", name));
    text.push_str("  public init, load_morphology, geom_nseg_fixed, geom_nsec, getCell, gid\n");
    text.push_str("  public CellRef, nSecAll, segCounts\n");
    if !config.secarray_names.is_empty() {
        let arrays: Vec<String> = config
            .secarray_names
            .iter()
            .map(|a| format!("{}[1]", a))
            .collect();
        text.push_str(&format!("  public {}\n", config.secarray_names.join(", ")));
        text.push_str(&format!("  create {}\n", arrays.join(", ")));
    }
    let mut objrefs = vec!["this".to_string(), "CellRef".to_string(), "segCounts".to_string()];
    objrefs.extend(config.seclist_names.iter().cloned());
    text.push_str(&format!("  public {}\n", config.seclist_names.join(", ")));
    text.push_str(&format!("  objref {}\n\n", objrefs.join(", ")));
    text.push_str("obfunc getCell(){\n  return this\n}\n\n");
}

fn render_init(text: &mut String, seclists: &[String], morphology_file: &str, replace_axon: bool) {
    text.push_str("proc init(/* args: gid, morphology_dir, morphology_name */) {\n");
    for list in seclists {
        text.push_str(&format!("  {} = new SectionList()\n", list));
    }
    text.push_str("  forall delete_section()\n");
    text.push_str("  CellRef = this\n\n");
    text.push_str("  gid = $1\n");
    text.push_str("  if(numarg() >= 3) {\n");
    text.push_str("    load_morphology($s2, $s3)\n");
    text.push_str("  } else {\n");
    text.push_str(&format!("    load_morphology($s2, \"{}\")\n", morphology_file));
    text.push_str("  }\n\n");
    text.push_str("  geom_nseg()\n");
    if replace_axon {
        text.push_str("  replace_axon()\n");
    }
    text.push_str("  insertChannel()\n");
    text.push_str("  biophys()\n");
    text.push_str("}\n\n");
}

fn render_load_morphology(text: &mut String) {
    text.push_str(
        r#"proc load_morphology(/* morphology_dir, morphology_name */) {localobj morph, import, sf, extension
  strdef morph_path
  sprint(morph_path, "%s/%s", $s1, $s2)

  sf = new StringFunctions()
  extension = new String()
  sscanf(morph_path, "%s", extension.s)
  sf.right(extension.s, sf.len(extension.s) - 4)

  if(strcmp(extension.s, ".asc") == 0 || strcmp(extension.s, ".ASC") == 0) {
    morph = new Import3d_Neurolucida3()
  } else if(strcmp(extension.s, ".swc") == 0 || strcmp(extension.s, ".SWC") == 0) {
    morph = new Import3d_SWC_read()
  } else {
    execerror("Unrecognized morphology file format: ", morph_path)
  }

  morph.quiet = 1
  morph.input(morph_path)

  import = new Import3d_GUI(morph, 0)
  import.instantiate(this)
}

"#,
    );
}

fn render_distribute_distance(text: &mut String, reference: &ReferencePoint) {
    text.push_str("/*\n * Set a range attribute on every segment from a formula of the path\n * distance to the reference point\n */\n");
    text.push_str("proc distribute_distance(){local x localobj sl\n");
    text.push_str("  strdef stmp, distfunc, mech\n\n");
    text.push_str("  sl = $o1\n  mech = $s2\n  distfunc = $s3\n");
    text.push_str(&format!(
        "  this.{} distance(0, {})\n",
        reference.section,
        format_general(reference.position, 17)
    ));
    text.push_str("  sprint(distfunc, \"%%s %s(%%f) = %s\", mech, distfunc)\n");
    text.push_str("  forsec sl for(x, 0) {\n");
    text.push_str("    sprint(stmp, distfunc, secname(), x, distance(x))\n");
    text.push_str("    execute(stmp)\n");
    text.push_str("  }\n}\n\n");
}

fn render_utilities(text: &mut String) {
    text.push_str(
        r#"func sec_count(/* SectionList */) { local nSec
  nSec = 0
  forsec $o1 {
    nSec += 1
  }
  return nSec
}

proc geom_nsec() { local nSec
  nSecAll = sec_count(all)
  segCounts = new Vector()
  segCounts.resize(nSecAll)
  nSec = 0
  forsec all {
    segCounts.x[nSec] = nseg
    nSec += 1
  }
}

/*
 * Odd segment count, one segment per chunkSize microns
 */
proc geom_nseg_fixed(/* chunkSize */) { local secIndex, chunkSize
  chunkSize = $1
  secIndex = 0
  forsec all {
    nseg = 1 + 2*int(L/chunkSize)
    segCounts.x[secIndex] = nseg
    secIndex += 1
  }
}

"#,
    );
}

fn render_replace_axon(text: &mut String, nseg_frequency: u32) {
    text.push_str("proc replace_axon(){ local nSec, D1, D2\n");
    text.push_str("  // diameters of the first two axon sections carry over to the stub\n");
    text.push_str("  nSec = sec_count(axonal)\n");
    text.push_str("  D1 = D2 = 1\n");
    text.push_str("  if(nSec > 0) {\n    axon[0] D1 = D2 = diam\n  }\n");
    text.push_str("  if(nSec > 1) {\n    axon[1] D2 = diam\n  }\n\n");
    text.push_str("  forsec axonal{delete_section()}\n");
    text.push_str("  execute1(\"create axon[2]\", CellRef)\n\n");
    for (index, diam) in [(0, "D1"), (1, "D2")] {
        text.push_str(&format!("  axon[{}] {{\n", index));
        text.push_str("    L = 30\n");
        text.push_str(&format!("    diam = {}\n", diam));
        text.push_str(&format!("    nseg = 1 + 2*int(L/{})\n", nseg_frequency));
        text.push_str("    all.append()\n    axonal.append()\n  }\n");
    }
    text.push_str("  soma[0] connect axon[0](0), 1\n");
    text.push_str("  axon[0] connect axon[1](0), 1\n");
    text.push_str("}\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Location, SeclistLocation};
    use crate::mechanism::DensityMechanism;
    use crate::morphology::FileMorphology;
    use crate::parameter::{GlobalParameter, MetaParameter, RangeParameter, SectionParameter};
    use crate::scaler::SomaDistanceScaler;
    use std::sync::Arc;

    fn loc(list: &str) -> Arc<dyn Location> {
        Arc::new(SeclistLocation::of(list).unwrap())
    }

    fn defaults() -> (Vec<String>, Vec<String>) {
        let config = TemplateConfig::default();
        (config.seclist_names, config.secarray_names)
    }

    #[test]
    fn test_empty_template() {
        let (lists, arrays) = defaults();
        let text = create_empty_template("Cell", &lists, &arrays).unwrap();
        assert!(text.starts_with("begintemplate Cell\n"));
        assert!(text.contains(
            "objref this, CellRef, all, somatic, apical, axonal, basal, myelinated"
        ));
        assert!(text.contains("    somatic = new SectionList()\n"));
        assert!(text.contains("create soma[1], dend[1], apic[1], axon[1], myelin[1]"));
        assert!(text.contains("proc destroy()"));
        assert!(text.ends_with("endtemplate Cell\n"));
        assert!(create_empty_template("3Cell", &lists, &arrays).is_err());
    }

    fn render(params: &[ModelParameter], replace_axon: bool, config: &TemplateConfig) -> ModelResult<String> {
        let morphology = FileMorphology::new("morphs/simple.swc").with_replace_axon(replace_axon);
        let mechanisms: Vec<Box<dyn Mechanism>> = vec![
            Box::new(DensityMechanism::new("pas", "pas", vec![loc("all")]).unwrap()),
            Box::new(DensityMechanism::new("hh", "hh", vec![loc("axonal"), loc("somatic")]).unwrap()),
        ];
        create_hoc(
            &CellTemplate {
                name: "CellModel",
                morphology: &morphology,
                mechanisms: &mechanisms,
                params,
            },
            config,
        )
    }

    fn frozen_params() -> Vec<ModelParameter> {
        let scaler = Arc::new(
            SomaDistanceScaler::new("({A} + {B} * math.exp({distance} * {C})) * {value}", &["A", "B", "C"])
                .unwrap(),
        );
        vec![
            MetaParameter::new("A", scaler.clone(), "A").unwrap().with_frozen_value(-1).unwrap().into(),
            MetaParameter::new("B", scaler.clone(), "B").unwrap().with_frozen_value(2.0).unwrap().into(),
            MetaParameter::new("C", scaler.clone(), "C").unwrap().with_frozen_value(0.003).unwrap().into(),
            GlobalParameter::new("celsius", "celsius").unwrap().with_frozen_value(34).unwrap().into(),
            SectionParameter::new("Ra", "Ra", vec![loc("somatic")]).unwrap().with_frozen_value(100.0).unwrap().into(),
            RangeParameter::new("cm", "cm", vec![loc("all")])
                .unwrap()
                .with_scaler(scaler)
                .with_frozen_value(1.0)
                .unwrap()
                .into(),
            RangeParameter::new("g_pas", "g_pas", vec![loc("all")]).unwrap().with_frozen_value(1e-4).unwrap().into(),
        ]
    }

    #[test]
    fn test_full_template() {
        let text = render(&frozen_params(), true, &TemplateConfig::default()).unwrap();
        assert!(text.starts_with("/*\nCreated by ephys"));
        assert!(text.contains("celsius = 34\n"));
        assert!(text.contains("begintemplate CellModel"));
        assert!(text.contains("load_morphology($s2, \"simple.swc\")"));
        assert!(text.contains("  forsec this.all {\n    insert pas\n  }\n  forsec this.somatic {\n    insert hh\n  }\n  forsec this.axonal {\n    insert hh\n  }\n"));
        assert!(text.contains("  forsec CellRef.all {\n    g_pas = 0.0001\n  }\n"));
        assert!(text.contains("  forsec CellRef.somatic {\n    Ra = 100\n  }\n"));
        assert!(text.contains(
            "distribute_distance(CellRef.all, \"cm\", \"(-1 + 2.0 * exp(%.17g * 0.003)) * 1\")"
        ));
        assert!(text.contains("  this.soma[0] distance(0, 0.5)\n"));
        assert!(text.contains("  replace_axon()\n"));
        assert!(text.contains("proc replace_axon()"));
        assert!(text.ends_with("endtemplate CellModel\n"));
    }

    #[test]
    fn test_options() {
        let config = TemplateConfig {
            banner: false,
            ignored_globals: vec!["celsius".to_string()],
            nseg_frequency: 20,
            ..Default::default()
        };
        let text = render(&frozen_params(), false, &config).unwrap();
        assert!(text.starts_with("load_file(\"stdrun.hoc\")"));
        assert!(!text.contains("celsius"));
        assert!(text.contains("this.geom_nseg_fixed(20)"));
        assert!(!text.contains("replace_axon"));
    }

    #[test]
    fn test_unfrozen_parameter_named() {
        let mut params = frozen_params();
        params.push(RangeParameter::new("gnabar_hh", "gnabar_hh", vec![loc("somatic")]).unwrap().into());
        let err = render(&params, false, &TemplateConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Unfrozen { ref names } if names == &["gnabar_hh".to_string()]));
    }
}
