// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! A rendered template rebuilds the same cell as live instantiation.
//!
//! Range values scaled eagerly (per segment, while instantiating) must match
//! the lazy formulas the template evaluates per segment, bit for bit.

use std::sync::Arc;

use ephys_model::prelude::*;
use ephys_model::{CellHandle, ModelError, Segment};

const MORPHOLOGY: &str = "morphs/simple.swc";

fn loc(list: &str) -> Arc<dyn Location> {
    Arc::new(SeclistLocation::of(list).unwrap())
}

fn simulator() -> MemorySimulator {
    let sim = MemorySimulator::new();
    sim.register_morphology(MORPHOLOGY, MorphologySpec::simple_cell())
        .unwrap();
    sim
}

fn scaler() -> Arc<SomaDistanceScaler> {
    Arc::new(
        SomaDistanceScaler::new(
            "({A} + {B} * math.exp({distance} * {C})) * {value}",
            &["A", "B", "C"],
        )
        .unwrap(),
    )
}

fn model(name: &str, replace_axon: bool) -> CellModel {
    let scaler = scaler();
    let params: Vec<ModelParameter> = vec![
        MetaParameter::new("A", scaler.clone(), "A").unwrap().into(),
        MetaParameter::new("B", scaler.clone(), "B").unwrap().into(),
        MetaParameter::new("C", scaler.clone(), "C").unwrap().into(),
        GlobalParameter::new("celsius", "celsius").unwrap().into(),
        SectionParameter::new("Ra", "Ra", vec![loc("all")]).unwrap().into(),
        RangeParameter::new("cm", "cm", vec![loc("all")])
            .unwrap()
            .with_scaler(scaler)
            .into(),
        RangeParameter::new("g_pas", "g_pas", vec![loc("all")])
            .unwrap()
            .into(),
        RangeParameter::new("gnabar_hh", "gnabar_hh", vec![loc("somatic"), loc("axonal")])
            .unwrap()
            .with_bounds(0.0, 1.0)
            .unwrap()
            .into(),
    ];
    let mechanisms: Vec<Box<dyn Mechanism>> = vec![
        Box::new(DensityMechanism::new("pas", "pas", vec![loc("all")]).unwrap()),
        Box::new(DensityMechanism::new("hh", "hh", vec![loc("somatic"), loc("axonal")]).unwrap()),
    ];
    CellModel::new(
        name,
        Arc::new(FileMorphology::new(MORPHOLOGY).with_replace_axon(replace_axon)),
        mechanisms,
        params,
    )
    .unwrap()
}

fn values() -> ParamValues {
    ParamValues::from_json(
        r#"{"A": -1, "B": 2.0, "C": 0.003, "celsius": 34, "Ra": 123.5,
            "cm": 1.0, "g_pas": 0.00003, "gnabar_hh": 0.12}"#,
    )
    .unwrap()
}

/// `(section name, x, attribute, value)` for every segment of `cell`
fn snapshot(sim: &MemorySimulator, cell: CellHandle) -> Vec<(String, f64, &'static str, f64)> {
    let mut rows = Vec::new();
    for section in sim.section_list(cell, "all").unwrap() {
        let name = sim.section_name(section).unwrap();
        let has_hh = sim.mechanisms(section).unwrap().contains(&"hh".to_string());
        for segment in sim.segments(section).unwrap() {
            for attribute in ["cm", "g_pas", "Ra", "gnabar_hh"] {
                if attribute == "gnabar_hh" && !has_hh {
                    continue;
                }
                rows.push((
                    name.clone(),
                    segment.x,
                    attribute,
                    sim.segment_value(segment, attribute).unwrap(),
                ));
            }
        }
    }
    rows
}

#[test]
fn eval_dist_formats_like_the_host() {
    let scaler = SomaDistanceScaler::new(
        "({A} + {B} * math.exp({distance} * {C})) * {value}",
        &["A", "B", "C"],
    )
    .unwrap()
    .with_coefficient("A", -1)
    .unwrap()
    .with_coefficient("B", 2.0)
    .unwrap()
    .with_coefficient("C", 0.003)
    .unwrap();
    assert_eq!(
        scaler.eval_dist(1.0, 1.0).unwrap(),
        "(-1 + 2.0 * math.exp(1 * 0.003)) * 1"
    );
    assert_eq!(
        scaler.inst_distribution(1.0).unwrap(),
        "(-1 + 2.0 * exp(%.17g * 0.003)) * 1"
    );
}

#[test]
fn scale_matches_true_distance() {
    let sim = simulator();
    let registry = InstanceRegistry::new();
    let mut cell = model("Scaled", false);
    cell.freeze(&values()).unwrap();
    cell.instantiate(&sim, &registry).unwrap();
    let icell = cell.icell().unwrap();

    let soma = sim.section_by_name(icell, "soma[0]").unwrap();
    let origin = Segment { section: soma, x: 0.5 };
    for section in sim.section_list(icell, "all").unwrap() {
        for segment in sim.segments(section).unwrap() {
            let distance = sim.distance(origin, segment).unwrap();
            let expected = -1.0 + 2.0 * (distance * 0.003).exp();
            let actual = sim.segment_value(segment, "cm").unwrap();
            assert!((actual - expected).abs() < 1e-12, "{} vs {}", actual, expected);
        }
    }

    cell.destroy(&sim, &registry).unwrap();
}

#[test]
fn generated_template_rebuilds_the_live_cell() {
    for replace_axon in [false, true] {
        let registry = InstanceRegistry::new();

        let live_sim = simulator();
        let mut cell = model("RoundTrip", replace_axon);
        cell.freeze(&values()).unwrap();
        cell.instantiate(&live_sim, &registry).unwrap();
        let live = snapshot(&live_sim, cell.icell().unwrap());

        let text = cell.create_hoc(&ParamValues::new()).unwrap();
        assert_eq!(text.contains("proc replace_axon()"), replace_axon);

        let generated_sim = simulator();
        let mut generated = HocCellModel::from_string("generated", MORPHOLOGY, text).unwrap();
        generated.instantiate(&generated_sim, &registry).unwrap();
        let rebuilt = snapshot(&generated_sim, generated.icell().unwrap());

        assert!(!live.is_empty());
        assert_eq!(live, rebuilt);
        assert_eq!(generated_sim.global("celsius").unwrap(), 34.0);
        if replace_axon {
            let axon = live.iter().filter(|row| row.0.starts_with("axon")).count();
            // two single-segment stub sections, four attributes each
            assert_eq!(axon, 2 * 4);
        }

        // Both models register under the same template name
        assert_eq!(registry.count("RoundTrip"), 2);
        generated.destroy(&generated_sim, &registry).unwrap();
        cell.destroy(&live_sim, &registry).unwrap();
        assert_eq!(registry.count("RoundTrip"), 0);
    }
}

#[test]
fn template_requires_frozen_parameters() {
    let mut cell = model("Unfrozen", false);
    let partial = ParamValues::new().with("A", -1).with("B", 2.0).with("C", 0.003);
    let err = cell.create_hoc(&partial).unwrap_err();
    match err {
        ModelError::Unfrozen { names } => {
            assert_eq!(names, vec!["celsius", "Ra", "cm", "g_pas", "gnabar_hh"]);
        }
        other => panic!("unexpected error {}", other),
    }
    // Overrides are rolled back
    assert!(cell.params().iter().all(|p| !p.is_frozen()));
    assert!(cell.param("A").unwrap().value().is_none());
}

#[test]
fn template_without_banner_is_stable() {
    let mut cell = model("Stable", true);
    let config = ephys_config::TemplateConfig {
        banner: false,
        ..Default::default()
    };
    let first = cell.create_hoc_with(&values(), &config).unwrap();
    let second = cell.create_hoc_with(&values(), &config).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("begintemplate Stable\n"));
    assert!(first.contains(
        "  forsec this.all {\n    insert pas\n  }\n  forsec this.somatic {\n    insert hh\n  }\n  forsec this.axonal {\n    insert hh\n  }\n"
    ));
}
