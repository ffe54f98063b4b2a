//! The Checker (§4.5): orchestrates `check_license` → `check_component` →
//! `check_module`, driving the subject stack, the kernel's assumption-based
//! SAT check, and the MUS enumerator on UNSAT.

use std::collections::BTreeMap;

use serde::Serialize;
use z3::ast::{Ast, Dynamic};

use crate::domain::{Component, Module};
use crate::kernel::{CheckResult as KernelResult, Kernel};
use crate::knowledge::KnowledgeBase;
use crate::mus::{self, SetKind};
use crate::subject::{ScopeGuard, Stack, SubjectKind};

/// A single `(module component, license)` check outcome (§6 wire shape).
/// Internally tagged on `status` with `UPPERCASE` variant names, so this
/// serializes to exactly `{"status": "SAT"|"UNSAT"|"UNKNOWN", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum CheckResult {
    Sat {
        obligations: Vec<String>,
    },
    Unsat {
        rules: Vec<String>,
        /// Absent (not `[]`) when the retry with violations disabled is
        /// itself UNSAT — a cycle of mutually exclusive rules (§9 Design
        /// Notes, preserving the source's unset-field behaviour).
        #[serde(skip_serializing_if = "Option::is_none")]
        obligations: Option<Vec<String>>,
    },
    Unknown {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

pub type ComponentResult = BTreeMap<String, CheckResult>;
pub type ModuleResult = BTreeMap<String, ComponentResult>;

const UNKNOWN_LICENSE_REASON: &str = "License could not be matched correctly";

/// Check `license_const` against the current (module, component) frame.
/// Pushes one `License` frame and pops it on every exit path via
/// [`ScopeGuard`] (§5).
pub fn check_license<'ctx>(
    kernel: &Kernel<'ctx>,
    stack: &Stack<'_, 'ctx>,
    kb: &KnowledgeBase<'ctx>,
    license_const: &Dynamic<'ctx>,
) -> CheckResult {
    stack.push_license(license_const);
    let _guard = ScopeGuard::new(stack, SubjectKind::License);

    let all_rule_keys = kb.rule_keys();

    match kernel.check(&all_rule_keys) {
        KernelResult::Sat => CheckResult::Sat {
            obligations: extract_obligations(kernel, stack, kb),
        },
        KernelResult::Unsat => {
            let violations = violated_rules(kernel, &all_rule_keys);
            let remaining: Vec<String> = all_rule_keys
                .iter()
                .filter(|k| !violations.contains(*k))
                .cloned()
                .collect();

            let obligations = match kernel.check(&remaining) {
                KernelResult::Sat => Some(extract_obligations(kernel, stack, kb)),
                _ => None,
            };

            CheckResult::Unsat {
                rules: violations.into_iter().collect(),
                obligations,
            }
        }
        KernelResult::Unknown(reason) => CheckResult::Unknown { reason },
    }
}

/// Union the rule tags from every reported MUS: the jointly-responsible
/// violated rules (§4.5 step 4).
fn violated_rules<'ctx>(kernel: &Kernel<'ctx>, all_rule_keys: &[String]) -> std::collections::BTreeSet<String> {
    mus::enumerate(kernel, all_rule_keys)
        .into_iter()
        .filter(|(kind, _)| *kind == SetKind::Mus)
        .flat_map(|(_, tags)| tags)
        .collect()
}

fn extract_obligations<'ctx>(kernel: &Kernel<'ctx>, stack: &Stack<'_, 'ctx>, kb: &KnowledgeBase<'ctx>) -> Vec<String> {
    let Some(c_const) = stack.current_component() else {
        return Vec::new();
    };

    kb.obligation_keys
        .iter()
        .filter(|key| {
            let id = kernel.constraint_id(key);
            let kconst = kernel.constraint_const(id);
            let term = kernel
                .relations
                .component_constraint
                .apply(&[&c_const as &dyn Ast<'ctx>, &kconst as &dyn Ast<'ctx>])
                .as_bool()
                .expect("ComponentConstraint is boolean-valued");
            kernel.eval_bool(&term)
        })
        .cloned()
        .collect()
}

/// Check `component` against `licenses` (or, when omitted, the component's
/// own license list). Unknown license keys map to `CheckResult::Unknown`
/// with the exact reason string from §6 rather than aborting the whole
/// call.
pub fn check_component<'ctx>(
    kernel: &Kernel<'ctx>,
    stack: &Stack<'_, 'ctx>,
    kb: &KnowledgeBase<'ctx>,
    component: &Component,
    licenses: Option<&[String]>,
) -> ComponentResult {
    stack.push_component(component);
    let _guard = ScopeGuard::new(stack, SubjectKind::Component);

    let license_keys: Vec<String> = match licenses {
        Some(ls) => ls.to_vec(),
        None => component.licenses.clone(),
    };

    let mut results = ComponentResult::new();
    for license_key in license_keys {
        let result = match kb.licenses.get(&license_key) {
            Some(license_const) => check_license(kernel, stack, kb, license_const),
            None => CheckResult::Unknown {
                reason: Some(UNKNOWN_LICENSE_REASON.to_string()),
            },
        };
        results.insert(license_key, result);
    }
    results
}

/// Check every (or a named subset of) `module`'s components against their
/// own licenses.
pub fn check_module<'ctx>(
    kernel: &Kernel<'ctx>,
    stack: &Stack<'_, 'ctx>,
    kb: &KnowledgeBase<'ctx>,
    module: &Module,
    components: Option<&[String]>,
) -> ModuleResult {
    stack.push_module(module);
    let _guard = ScopeGuard::new(stack, SubjectKind::Module);

    let component_keys: Vec<String> = match components {
        Some(cs) => cs.to_vec(),
        None => module.components.keys().cloned().collect(),
    };

    let mut out = ModuleResult::new();
    for component_key in component_keys {
        if let Some(component) = module.components.get(&component_key) {
            out.insert(component_key, check_component(kernel, stack, kb, component, None));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::definitions::KnowledgeBaseDef;
    use crate::domain::Module;
    use crate::kernel;
    use crate::knowledge;
    use std::collections::BTreeMap;
    use z3::Context;

    fn engine_for<'ctx>(ctx: &'ctx Context, json: &str) -> (Kernel<'ctx>, KnowledgeBase<'ctx>) {
        let defs: KnowledgeBaseDef = serde_json::from_str(json).unwrap();
        let kernel = Kernel::new(ctx, &EngineConfig::default());
        let kb = knowledge::load(&kernel, &defs);
        (kernel, kb)
    }

    fn module_with_component(module_props: &[(&str, bool)], comp_props: &[(&str, bool)], licenses: Vec<&str>) -> Module {
        let mut components = BTreeMap::new();
        components.insert(
            "test".to_string(),
            Component {
                key: "test".to_string(),
                properties: comp_props.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                licenses: licenses.into_iter().map(str::to_string).collect(),
            },
        );
        Module {
            key: "m".to_string(),
            properties: module_props.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            components,
        }
    }

    #[test]
    fn s1_trivial_sat() {
        let ctx = kernel::build_context(&EngineConfig::default());
        let (kernel, kb) = engine_for(&ctx, r#"{ "Licenses": { "L1": { "T1": true } } }"#);
        let stack = Stack::new(&kernel);
        let module = module_with_component(&[], &[], vec!["L1"]);

        let result = check_module(&kernel, &stack, &kb, &module, None);
        let license_result = &result["test"]["L1"];
        assert_eq!(license_result, &CheckResult::Sat { obligations: vec![] });
    }

    #[test]
    fn s2_obligation_fires() {
        let json = r#"{
            "Licenses": { "L1": { "T1": true, "O1": true } },
            "Constraints": {
                "Rights": { "O1": {} },
                "Obligations": { "O1": { "setting": [["Component.dist_obj"]] } }
            }
        }"#;
        let ctx = kernel::build_context(&EngineConfig::default());
        let (kernel, kb) = engine_for(&ctx, json);
        let stack = Stack::new(&kernel);
        let module = module_with_component(&[], &[("dist_obj", true)], vec!["L1"]);

        let result = check_module(&kernel, &stack, &kb, &module, None);
        match &result["test"]["L1"] {
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
        let (kernel, kb) = engine_for(&ctx, json);
        let stack = Stack::new(&kernel);
        // `push_component` consumes already-derived properties (derivation
        // from module flags happens in `Module::from_json`, not here), so
        // `dist_obj` is set directly rather than inferred from `D_op`.
        let module = module_with_component(&[("D_op", true)], &[("dist_obj", true), ("src_disclosed", false)], vec!["GPL-2.0-only"]);

        let result = check_module(&kernel, &stack, &kb, &module, None);
        match &result["test"]["GPL-2.0-only"] {
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
            "Licenses": { "L1": {} },
            "Rules": [
                { "key": "R1", "type": "violation", "setting": [["Component.a"]], "require": [["Component.x"]] },
                { "key": "R2", "type": "violation", "setting": [["Component.b"]], "require": [["Component.y"]] }
            ]
        }"#;
        let ctx = kernel::build_context(&EngineConfig::default());
        let (kernel, kb) = engine_for(&ctx, json);
        let stack = Stack::new(&kernel);
        let module = module_with_component(&[], &[("a", true), ("b", true), ("x", false), ("y", false)], vec!["L1"]);

        let result = check_module(&kernel, &stack, &kb, &module, None);
        match &result["test"]["L1"] {
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
        let (kernel, kb) = engine_for(&ctx, "{}");
        let stack = Stack::new(&kernel);
        let module = module_with_component(&[], &[], vec!["NoSuchLicense"]);

        let result = check_module(&kernel, &stack, &kb, &module, None);
        assert_eq!(
            result["test"]["NoSuchLicense"],
            CheckResult::Unknown {
                reason: Some(UNKNOWN_LICENSE_REASON.to_string())
            }
        );
    }

    #[test]
    fn s6_variant_obligation() {
        let json = r#"{
            "Licenses": { "L1": { "O1__source": true, "O1__binary": true } },
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
        let (kernel, kb) = engine_for(&ctx, json);
        let stack = Stack::new(&kernel);
        let module = module_with_component(&[("D_op", true)], &[("dist_obj", true)], vec!["L1"]);

        let result = check_module(&kernel, &stack, &kb, &module, None);
        match &result["test"]["L1"] {
            CheckResult::Sat { obligations } => {
                assert!(obligations.contains(&"O1__binary".to_string()));
                assert!(!obligations.contains(&"O1__source".to_string()));
            }
            other => panic!("expected SAT, got {other:?}"),
        }
    }
}
