//! The Knowledge Loader (§4.3): compiles a [`crate::definitions::KnowledgeBaseDef`]
//! into universally-quantified axioms asserted into the [`Kernel`], in the
//! three fixed passes the distilled spec names — Licenses, then
//! Rights/Terms/Obligations, then Rules — and retains the lookup tables
//! (`rules`, `licenses`, `obligation_keys`) the checker needs afterwards.

use indexmap::{IndexMap, IndexSet};
use z3::ast::{Ast, Bool, Dynamic};
use z3::{Context, FuncDecl};

use crate::constraints::{self, Builder, Subjects};
use crate::definitions::{self, KnowledgeBaseDef, LicenseDef};
use crate::kernel::Kernel;
use crate::logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Violation,
    Warning,
    Other,
}

impl RuleKind {
    fn parse(kind: Option<&str>) -> RuleKind {
        match kind {
            Some("violation") => RuleKind::Violation,
            Some("warning") => RuleKind::Warning,
            _ => RuleKind::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleMeta {
    pub key: String,
    pub kind: RuleKind,
}

/// Everything the loader derives from a [`KnowledgeBaseDef`] besides the
/// axioms themselves (those live only in the kernel's solver). This is the
/// read-only state a fork shares with its parent (§5, §9): wrap it in an
/// `Rc`/`Arc` at the call site, not here.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase<'ctx> {
    /// Rule key → metadata, insertion-ordered so assumption vectors and MUS
    /// enumeration are deterministic (§8 Invariant 7).
    pub rules: IndexMap<String, RuleMeta>,
    /// License key → the stable `License` frame constant asserted about at
    /// load time; `subject::Stack::push_license` reuses this exact constant
    /// so `LicenseConstraint` facts line up with the ones just asserted.
    pub licenses: IndexMap<String, Dynamic<'ctx>>,
    /// Obligation keys (plain, or `key__variant` composites), in load order,
    /// used by `checker::extract_obligations`.
    pub obligation_keys: Vec<String>,
}

impl<'ctx> KnowledgeBase<'ctx> {
    pub fn rule_keys(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }
}

/// Compile `defs` into axioms on `kernel` and return the lookup tables the
/// checker needs. Never mutated again after this call (§3 Lifecycle).
pub fn load<'ctx>(kernel: &Kernel<'ctx>, defs: &KnowledgeBaseDef) -> KnowledgeBase<'ctx> {
    let builder = Builder::new(kernel);
    let mut kb = KnowledgeBase::default();

    load_licenses(kernel, defs, &mut kb);
    load_rights_and_terms(kernel, defs);
    load_obligations(kernel, &builder, defs, &mut kb);
    load_rules(kernel, &builder, defs, &mut kb);

    kb
}

fn conjoin<'ctx>(ctx: &'ctx Context, terms: &[Bool<'ctx>]) -> Bool<'ctx> {
    if terms.is_empty() {
        return Bool::from_bool(ctx, true);
    }
    let refs: Vec<&Bool<'ctx>> = terms.iter().collect();
    Bool::and(ctx, &refs)
}

fn constraint_term<'ctx>(
    kernel: &Kernel<'ctx>,
    relation: &FuncDecl<'ctx>,
    subject: &Dynamic<'ctx>,
    key: &str,
) -> Bool<'ctx> {
    let id = kernel.constraint_id(key);
    let kconst = kernel.constraint_const(id);
    relation
        .apply(&[subject as &dyn Ast<'ctx>, &kconst as &dyn Ast<'ctx>])
        .as_bool()
        .expect("*Constraint relations are boolean-valued")
}

// ---------------------------------------------------------------------
// Pass 1: Licenses
// ---------------------------------------------------------------------

/// For each license key and its `{constraint_key: bool | {"value": bool}}`
/// entries, assert `LicenseConstraint(L_const, k) = value` against a fresh
/// `License` constant stable for that key. Any malformed entry drops the
/// whole license (the source's `break`-and-skip, not a per-entry skip),
/// logged at `INFO` (§4.3, §7).
fn load_licenses<'ctx>(kernel: &Kernel<'ctx>, defs: &KnowledgeBaseDef, kb: &mut KnowledgeBase<'ctx>) {
    for (license_key, entries) in &defs.licenses {
        match compile_license_entries(entries) {
            Ok(values) => {
                let l_const = kernel.fresh_const(&kernel.sorts.license);
                for (k, value) in values {
                    let term = constraint_term(kernel, &kernel.relations.license_constraint, &l_const, &k);
                    kernel.assert(&if value { term } else { term.not() }, None);
                }
                kb.licenses.insert(license_key.clone(), l_const);
            }
            Err(bad_key) => logging::log(
                "INFO",
                "knowledge::licenses",
                &format!("skipping license '{license_key}': entry '{bad_key}' is not a bool or {{value: bool}}"),
            ),
        }
    }
}

fn compile_license_entries(entries: &LicenseDef) -> Result<Vec<(String, bool)>, String> {
    let mut out = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        match definitions::bool_or_value_object(v) {
            Some(b) => out.push((k.clone(), b)),
            None => return Err(k.clone()),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------
// Pass 2: Rights, Terms, Obligations
// ---------------------------------------------------------------------

/// Rights and Terms propagate from license to component with no extra
/// condition: `∀ l c. ComponentLicense(c,l) ⟹ ComponentConstraint(c,k) =
/// LicenseConstraint(l,k)`.
fn load_rights_and_terms<'ctx>(kernel: &Kernel<'ctx>, defs: &KnowledgeBaseDef) {
    for key in defs.constraints.rights.keys().chain(defs.constraints.terms.keys()) {
        let l = kernel.bound("l", &kernel.sorts.license.sort);
        let c = kernel.bound("c", &kernel.sorts.component.sort);

        let component_license = constraint_pair(&kernel.relations.component_license, &c, &l);
        let component_constraint = constraint_term(kernel, &kernel.relations.component_constraint, &c, key);
        let license_constraint = constraint_term(kernel, &kernel.relations.license_constraint, &l, key);

        let body = component_license.implies(&component_constraint._eq(&license_constraint));
        let axiom = z3::ast::forall_const(
            kernel.context(),
            &[&l as &dyn Ast, &c as &dyn Ast],
            &[],
            &body,
        );
        kernel.assert(&axiom, None);
    }
}

fn constraint_pair<'ctx>(relation: &FuncDecl<'ctx>, a: &Dynamic<'ctx>, b: &Dynamic<'ctx>) -> Bool<'ctx> {
    relation
        .apply(&[a as &dyn Ast<'ctx>, b as &dyn Ast<'ctx>])
        .as_bool()
        .expect("relation is boolean-valued")
}

/// Obligations (§4.3): with variants, each `k__vk` gets its own composed
/// setting/value axiom; without variants, a single axiom combines
/// `LicenseConstraint(l,k)` with a DNF-compiled setting via the
/// component-only builder (the asymmetry preserved from the source, §9).
fn load_obligations<'ctx>(
    kernel: &Kernel<'ctx>,
    builder: &Builder<'_, 'ctx>,
    defs: &KnowledgeBaseDef,
    kb: &mut KnowledgeBase<'ctx>,
) {
    let variant_clauses: IndexMap<String, Vec<Vec<String>>> = defs
        .constraints
        .variants
        .iter()
        .map(|(vk, vdef)| {
            (
                vk.clone(),
                constraints::parse_clauses(&vdef.setting, &format!("Constraints.Variants.{vk}.setting")),
            )
        })
        .collect();

    for (key, odef) in &defs.constraints.obligations {
        let setting_clauses = constraints::parse_clauses(&odef.setting, &format!("Constraints.Obligations.{key}.setting"));
        let value_clauses = odef
            .value
            .as_ref()
            .map(|v| constraints::parse_clauses(v, &format!("Constraints.Obligations.{key}.value")));

        match &odef.variants {
            Some(variant_overrides) => {
                let mut keys: IndexSet<String> = variant_overrides.keys().cloned().collect();
                keys.extend(variant_clauses.keys().cloned());

                for vk in &keys {
                    load_obligation_variant(
                        kernel,
                        builder,
                        key,
                        vk,
                        &setting_clauses,
                        value_clauses.as_deref(),
                        variant_overrides.get(vk),
                        variant_clauses.get(vk),
                        kb,
                    );
                }
            }
            None => load_obligation_no_variants(kernel, builder, key, &setting_clauses, kb),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn load_obligation_variant<'ctx>(
    kernel: &Kernel<'ctx>,
    builder: &Builder<'_, 'ctx>,
    key: &str,
    variant_key: &str,
    setting_clauses: &[Vec<String>],
    value_clauses: Option<&[Vec<String>]>,
    variant_override: Option<&crate::definitions::ObligationVariantDef>,
    variant_global_clauses: Option<&Vec<Vec<String>>>,
    kb: &mut KnowledgeBase<'ctx>,
) {
    let composite_key = format!("{key}__{variant_key}");
    let ctx = kernel.context();

    let l = kernel.bound("l", &kernel.sorts.license.sort);
    let c = kernel.bound("c", &kernel.sorts.component.sort);
    let subjects = Subjects::defaults(kernel).with_component(&c).with_license(&l);

    let obligation_setting = builder.cnf(setting_clauses, &subjects);
    let svar = variant_global_clauses.map(|cl| builder.cnf(cl, &subjects));
    let custom_setting = variant_override
        .and_then(|vo| vo.setting.as_ref())
        .map(|v| constraints::parse_clauses(v, &format!("Constraints.Obligations.{key}.variants.{variant_key}.setting")))
        .map(|cl| builder.cnf(&cl, &subjects));

    let mut setting_terms = vec![obligation_setting];
    setting_terms.extend(svar);
    setting_terms.extend(custom_setting);
    let setting = conjoin(ctx, &setting_terms);

    let obligation_value = value_clauses.map(|cl| builder.cnf(cl, &subjects));
    let custom_value = variant_override
        .and_then(|vo| vo.value.as_ref())
        .map(|v| constraints::parse_clauses(v, &format!("Constraints.Obligations.{key}.variants.{variant_key}.value")))
        .map(|cl| builder.cnf(&cl, &subjects));

    let license_term = constraint_term(kernel, &kernel.relations.license_constraint, &l, &composite_key);
    let value = match (&obligation_value, &custom_value) {
        (None, None) => license_term.clone(),
        _ => {
            let fragment = conjoin(
                ctx,
                &[
                    obligation_value.unwrap_or_else(|| Bool::from_bool(ctx, true)),
                    custom_value.unwrap_or_else(|| Bool::from_bool(ctx, true)),
                ],
            );
            Bool::or(ctx, &[&license_term, &fragment])
        }
    };

    let component_license = constraint_pair(&kernel.relations.component_license, &c, &l);
    let component_constraint = constraint_term(kernel, &kernel.relations.component_constraint, &c, &composite_key);
    let body = component_license.implies(&component_constraint._eq(&conjoin(ctx, &[setting, value])));
    let axiom = z3::ast::forall_const(ctx, &[&l as &dyn Ast, &c as &dyn Ast], &[], &body);
    kernel.assert(&axiom, None);

    kb.obligation_keys.push(composite_key);
}

fn load_obligation_no_variants<'ctx>(
    kernel: &Kernel<'ctx>,
    builder: &Builder<'_, 'ctx>,
    key: &str,
    setting_clauses: &[Vec<String>],
    kb: &mut KnowledgeBase<'ctx>,
) {
    let ctx = kernel.context();
    let l = kernel.bound("l", &kernel.sorts.license.sort);
    let c = kernel.bound("c", &kernel.sorts.component.sort);

    let license_term = constraint_term(kernel, &kernel.relations.license_constraint, &l, key);
    let value = if setting_clauses.is_empty() {
        license_term.clone()
    } else {
        let setting_dnf = builder.dnf_component_only(setting_clauses, &c);
        Bool::and(ctx, &[&license_term, &setting_dnf])
    };

    let component_license = constraint_pair(&kernel.relations.component_license, &c, &l);
    let component_constraint = constraint_term(kernel, &kernel.relations.component_constraint, &c, key);
    let body = component_license.implies(&component_constraint._eq(&value));
    let axiom = z3::ast::forall_const(ctx, &[&l as &dyn Ast, &c as &dyn Ast], &[], &body);
    kernel.assert(&axiom, None);

    kb.obligation_keys.push(key.to_string());
}

// ---------------------------------------------------------------------
// Pass 3: Rules
// ---------------------------------------------------------------------

/// `∀ m c. (ModuleComponent(m,c) ∧ setting) ⟹ require`, tagged by the rule
/// key so `Kernel::check` can selectively disable it later.
fn load_rules<'ctx>(
    kernel: &Kernel<'ctx>,
    builder: &Builder<'_, 'ctx>,
    defs: &KnowledgeBaseDef,
    kb: &mut KnowledgeBase<'ctx>,
) {
    let ctx = kernel.context();
    for (idx, rule) in defs.rules.iter().enumerate() {
        let key = rule.key.clone().unwrap_or_else(|| format!("rule_{idx}"));

        let setting_clauses = constraints::parse_clauses(&rule.setting, &format!("Rules[{idx}:{key}].setting"));
        let require_clauses = rule
            .require
            .as_ref()
            .map(|v| constraints::parse_clauses(v, &format!("Rules[{idx}:{key}].require")));

        let m = kernel.bound("m", &kernel.sorts.module.sort);
        let c = kernel.bound("c", &kernel.sorts.component.sort);
        let subjects = Subjects::defaults(kernel).with_module(&m).with_component(&c);

        let setting = builder.cnf(&setting_clauses, &subjects);
        let require = match &require_clauses {
            Some(cl) => builder.cnf(cl, &subjects),
            None => Bool::from_bool(ctx, false),
        };

        let module_component = constraint_pair(&kernel.relations.module_component, &m, &c);
        let antecedent = Bool::and(ctx, &[&module_component, &setting]);
        let body = antecedent.implies(&require);
        let axiom = z3::ast::forall_const(ctx, &[&m as &dyn Ast, &c as &dyn Ast], &[], &body);

        kernel.assert(&axiom, Some(&key));

        let kind = RuleKind::parse(rule.kind.as_deref());
        kb.rules.insert(key.clone(), RuleMeta { key, kind });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::kernel::{self, CheckResult, Kernel};

    fn kb_from_json(ctx: &Context, json: &str) -> (Kernel<'_>, KnowledgeBase<'_>) {
        let defs: KnowledgeBaseDef = serde_json::from_str(json).unwrap();
        let kernel = Kernel::new(ctx, &EngineConfig::default());
        let kb = load(&kernel, &defs);
        (kernel, kb)
    }

    #[test]
    fn malformed_license_entry_drops_whole_license() {
        let ctx = kernel::build_context(&EngineConfig::default());
        let (_, kb) = kb_from_json(
            &ctx,
            r#"{ "Licenses": { "Bad": { "T1": "not-a-bool" }, "Good": { "T1": true } } }"#,
        );
        assert!(!kb.licenses.contains_key("Bad"));
        assert!(kb.licenses.contains_key("Good"));
    }

    #[test]
    fn rule_without_key_gets_a_generated_one() {
        let ctx = kernel::build_context(&EngineConfig::default());
        let (_, kb) = kb_from_json(&ctx, r#"{ "Rules": [{ "setting": [], "require": [] }] }"#);
        assert!(kb.rules.contains_key("rule_0"));
    }

    #[test]
    fn trivial_knowledge_base_is_sat_with_no_assumptions() {
        let ctx = kernel::build_context(&EngineConfig::default());
        let (kernel, kb) = kb_from_json(&ctx, "{}");
        assert_eq!(kernel.check(&kb.rule_keys()), CheckResult::Sat);
    }
}
