//! End-to-end scenarios driven entirely through the public `Engine` facade,
//! one knowledge base and one module per scenario, no filesystem I/O.

use std::collections::BTreeMap;

use z3::Context;

use licentia::checker::CheckResult;
use licentia::config::EngineConfig;
use licentia::definitions::KnowledgeBaseDef;
use licentia::domain::{Component, Module};
use licentia::engine::Engine;
use licentia::kernel;

fn engine_from<'ctx>(ctx: &'ctx Context, json: &str) -> Engine<'ctx> {
    let defs: KnowledgeBaseDef = serde_json::from_str(json).unwrap();
    Engine::new(ctx, &EngineConfig::default(), &defs)
}

fn single_component_module(module_props: &[(&str, bool)], comp_props: &[(&str, bool)], licenses: &[&str]) -> Module {
    let mut components = BTreeMap::new();
    components.insert(
        "widget".to_string(),
        Component {
            key: "widget".to_string(),
            properties: comp_props.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            licenses: licenses.iter().map(|s| s.to_string()).collect(),
        },
    );
    Module {
        key: "acme".to_string(),
        properties: module_props.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        components,
    }
}

#[test]
fn s1_trivial_sat() {
    let ctx = kernel::build_context(&EngineConfig::default());
    let engine = engine_from(&ctx, r#"{ "Licenses": { "MIT": { "T1": true } } }"#);
    let module = single_component_module(&[], &[], &["MIT"]);

    let result = engine.check_module(&module, None);
    assert_eq!(result["widget"]["MIT"], CheckResult::Sat { obligations: vec![] });
}

#[test]
fn s2_obligation_fires() {
    let json = r#"{
        "Licenses": { "MIT": { "T1": true, "O1": true } },
        "Constraints": {
            "Rights": { "O1": {} },
            "Obligations": { "O1": { "setting": [["Component.dist_obj"]] } }
        }
    }"#;
    let ctx = kernel::build_context(&EngineConfig::default());
    let engine = engine_from(&ctx, json);
    let module = single_component_module(&[], &[("dist_obj", true)], &["MIT"]);

    let result = engine.check_module(&module, None);
    match &result["widget"]["MIT"] {
        CheckResult::Sat { obligations } => assert_eq!(obligations, &vec!["O1".to_string()]),
        other => panic!("expected SAT, got {other:?}"),
    }
}

#[test]
fn s3_single_violation() {
    let json = r#"{
        "Licenses": { "GPL-2.0-only": {} },
        "Rules": [{
            "key": "R1",
            "type": "violation",
            "setting": [["Component.dist_obj"]],
            "require": [["Component.src_disclosed"]]
        }]
    }"#;
    let ctx = kernel::build_context(&EngineConfig::default());
    let engine = engine_from(&ctx, json);
    let module = single_component_module(&[("D_op", true)], &[("dist_obj", true), ("src_disclosed", false)], &["GPL-2.0-only"]);

    let result = engine.check_module(&module, None);
    match &result["widget"]["GPL-2.0-only"] {
        CheckResult::Unsat { rules, obligations } => {
            assert_eq!(rules, &vec!["R1".to_string()]);
            assert_eq!(obligations, &Some(vec![]));
        }
        other => panic!("expected UNSAT, got {other:?}"),
    }
}

#[test]
fn s4_two_independent_violations() {
    let json = r#"{
        "Licenses": { "Proprietary": {} },
        "Rules": [
            { "key": "R1", "type": "violation", "setting": [["Component.a"]], "require": [["Component.x"]] },
            { "key": "R2", "type": "violation", "setting": [["Component.b"]], "require": [["Component.y"]] }
        ]
    }"#;
    let ctx = kernel::build_context(&EngineConfig::default());
    let engine = engine_from(&ctx, json);
    let module = single_component_module(&[], &[("a", true), ("b", true), ("x", false), ("y", false)], &["Proprietary"]);

    let result = engine.check_module(&module, None);
    match &result["widget"]["Proprietary"] {
        CheckResult::Unsat { rules, .. } => {
            let mut sorted = rules.clone();
            sorted.sort();
            assert_eq!(sorted, vec!["R1".to_string(), "R2".to_string()]);
        }
        other => panic!("expected UNSAT, got {other:?}"),
    }
}

#[test]
fn s5_unknown_license() {
    let ctx = kernel::build_context(&EngineConfig::default());
    let engine = engine_from(&ctx, "{}");
    let module = single_component_module(&[], &[], &["NoSuchLicense"]);

    let result = engine.check_module(&module, None);
    match &result["widget"]["NoSuchLicense"] {
        CheckResult::Unknown { reason } => assert!(reason.is_some()),
        other => panic!("expected UNKNOWN, got {other:?}"),
    }
}

#[test]
fn s6_variant_obligation() {
    let json = r#"{
        "Licenses": { "MIT": { "O1__source": true, "O1__binary": true } },
        "Constraints": {
            "Variants": {
                "source": { "setting": [["Component.dist_src"]] },
                "binary": { "setting": [["Component.dist_obj"]] }
            },
            "Obligations": {
                "O1": { "setting": [], "variants": { "source": {}, "binary": {} } }
            }
        }
    }"#;
    let ctx = kernel::build_context(&EngineConfig::default());
    let engine = engine_from(&ctx, json);
    let module = single_component_module(&[("D_op", true)], &[("dist_obj", true)], &["MIT"]);

    let result = engine.check_module(&module, None);
    match &result["widget"]["MIT"] {
        CheckResult::Sat { obligations } => {
            assert!(obligations.contains(&"O1__binary".to_string()));
            assert!(!obligations.contains(&"O1__source".to_string()));
        }
        other => panic!("expected SAT, got {other:?}"),
    }
}
