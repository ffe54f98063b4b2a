//! The Logic Kernel (§4.1): wraps a Z3 solver, declares the domain sorts
//! and uninterpreted relations, and exposes the handful of primitives
//! (`assert`, `push`/`pop`, `check`, `eval_bool`, `fork`) everything else in
//! this crate is built on.
//!
//! Every Z3 value here carries the `'ctx` lifetime of a `Context` the caller
//! builds up front with [`build_context`] and threads through `Kernel::new`
//! explicitly — the same `Config::new()` → `cfg.set_param_value("timeout",
//! …)` → `Context::new(&cfg)` → `Solver::new(&ctx)` chain
//! `logos_verification/src/solver.rs:16-27` uses against the same registry
//! `z3 = "0.12"` this crate depends on, not a thread-local/global context.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use z3::ast::{Ast, Bool, Dynamic, Int};
use z3::{
    Config, Context, DatatypeAccessor, DatatypeBuilder, DatatypeSort, FuncDecl, SatResult, Solver,
    Sort,
};

use crate::config::EngineConfig;

/// Build the `Context` a `Kernel` borrows. The per-engine Z3 timeout is
/// applied at the `Config` level before the context is created, exactly as
/// `logos_verification/src/solver.rs:16-19` does for its own `Verifier`.
pub fn build_context(config: &EngineConfig) -> Context {
    let mut cfg = Config::new();
    cfg.set_param_value("timeout", &config.z3_timeout_ms.to_string());
    Context::new(&cfg)
}

/// Outcome of a `Kernel::check`. `Unknown` carries the solver's own reason
/// string (e.g. a timeout) and is never silently coerced into `Sat`/`Unsat`
/// (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Sat,
    Unsat,
    Unknown(Option<String>),
}

/// The four domain sorts (§3), each a single-constructor `make(id: Int)`
/// datatype so that equality is plain integer equality.
pub struct Sorts<'ctx> {
    pub module: DatatypeSort<'ctx>,
    pub component: DatatypeSort<'ctx>,
    pub license: DatatypeSort<'ctx>,
    pub constraint: DatatypeSort<'ctx>,
}

/// The uninterpreted relations declared once in `Kernel::new` (§3).
pub struct Relations<'ctx> {
    pub module_component: FuncDecl<'ctx>,
    pub component_license: FuncDecl<'ctx>,
    pub module_constraint: FuncDecl<'ctx>,
    pub component_constraint: FuncDecl<'ctx>,
    pub license_constraint: FuncDecl<'ctx>,
}

fn build_sort<'ctx>(ctx: &'ctx Context, name: &str) -> DatatypeSort<'ctx> {
    DatatypeBuilder::new(ctx, name)
        .variant("make", vec![("id", DatatypeAccessor::Sort(Sort::int(ctx)))])
        .finish()
}

fn build_sorts<'ctx>(ctx: &'ctx Context) -> Sorts<'ctx> {
    Sorts {
        module: build_sort(ctx, "Module"),
        component: build_sort(ctx, "Component"),
        license: build_sort(ctx, "License"),
        constraint: build_sort(ctx, "Constraint"),
    }
}

fn build_relations<'ctx>(ctx: &'ctx Context, sorts: &Sorts<'ctx>) -> Relations<'ctx> {
    Relations {
        module_component: FuncDecl::new(
            ctx,
            "ModuleComponent",
            &[&sorts.module.sort, &sorts.component.sort],
            &Sort::bool(ctx),
        ),
        component_license: FuncDecl::new(
            ctx,
            "ComponentLicense",
            &[&sorts.component.sort, &sorts.license.sort],
            &Sort::bool(ctx),
        ),
        module_constraint: FuncDecl::new(
            ctx,
            "ModuleConstraint",
            &[&sorts.module.sort, &sorts.constraint.sort],
            &Sort::bool(ctx),
        ),
        component_constraint: FuncDecl::new(
            ctx,
            "ComponentConstraint",
            &[&sorts.component.sort, &sorts.constraint.sort],
            &Sort::bool(ctx),
        ),
        license_constraint: FuncDecl::new(
            ctx,
            "LicenseConstraint",
            &[&sorts.license.sort, &sorts.constraint.sort],
            &Sort::bool(ctx),
        ),
    }
}

/// Per-`Kernel` constraint id allocator (Design Notes §9): two kernels in
/// the same process never compare ids across contexts, replacing the
/// source's process-global counter.
#[derive(Default)]
pub struct ConstraintIds {
    next: Cell<i32>,
    by_key: RefCell<HashMap<String, i32>>,
}

impl ConstraintIds {
    fn id_for(&self, scope_property: &str) -> i32 {
        if let Some(id) = self.by_key.borrow().get(scope_property) {
            return *id;
        }
        let id = self.next.get();
        self.next.set(id + 1);
        self.by_key
            .borrow_mut()
            .insert(scope_property.to_string(), id);
        id
    }

    fn clone_ids(&self) -> ConstraintIds {
        ConstraintIds {
            next: Cell::new(self.next.get()),
            by_key: RefCell::new(self.by_key.borrow().clone()),
        }
    }
}

/// Canonical Module/Component/License constants used as the free variable
/// of an atom when no real subject is bound in the enclosing axiom (§4.2:
/// "the free variable is a universally-quantified domain constant supplied
/// by the caller or defaulted to a canonical one") — e.g. a `Module.*` atom
/// written inside an obligation's `setting`, which is only ever quantified
/// over `(license, component)`.
pub struct Defaults<'ctx> {
    pub module: Dynamic<'ctx>,
    pub component: Dynamic<'ctx>,
    pub license: Dynamic<'ctx>,
}

fn build_defaults<'ctx>(ctx: &'ctx Context, sorts: &Sorts<'ctx>) -> Defaults<'ctx> {
    let sentinel = Int::from_i64(ctx, -1);
    let make = |sort: &DatatypeSort<'ctx>| {
        sort.variants[0]
            .constructor
            .apply(&[&sentinel as &dyn Ast<'ctx>])
    };
    Defaults {
        module: make(&sorts.module),
        component: make(&sorts.component),
        license: make(&sorts.license),
    }
}

pub struct Kernel<'ctx> {
    ctx: &'ctx Context,
    solver: Solver<'ctx>,
    pub sorts: Rc<Sorts<'ctx>>,
    pub relations: Rc<Relations<'ctx>>,
    pub defaults: Rc<Defaults<'ctx>>,
    ids: ConstraintIds,
    next_subject_id: Cell<i64>,
    timeout_ms: u64,
}

impl<'ctx> Kernel<'ctx> {
    pub fn new(ctx: &'ctx Context, config: &EngineConfig) -> Self {
        let sorts = build_sorts(ctx);
        let relations = build_relations(ctx, &sorts);
        let defaults = build_defaults(ctx, &sorts);
        Kernel {
            ctx,
            solver: Solver::new(ctx),
            sorts: Rc::new(sorts),
            relations: Rc::new(relations),
            defaults: Rc::new(defaults),
            ids: ConstraintIds::default(),
            next_subject_id: Cell::new(0),
            timeout_ms: config.z3_timeout_ms,
        }
    }

    /// The `Context` this kernel's terms and solver were built against —
    /// callers building their own `Bool`/`Dynamic` values (the Constraint
    /// Builder, the Knowledge Loader, the MUS Enumerator) thread it back
    /// through here rather than opening a second one.
    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }

    /// Stable per-engine id for a `Scope.Property` constraint key (§3
    /// Invariants).
    pub fn constraint_id(&self, scope_property: &str) -> i32 {
        self.ids.id_for(scope_property)
    }

    /// A frame/datatype constant `sort.make(id)` with a fresh id, used when
    /// pushing a concrete Module/Component/License onto the subject stack,
    /// or when allocating the `Constraint` constant for a given id.
    pub fn fresh_const(&self, sort: &DatatypeSort<'ctx>) -> Dynamic<'ctx> {
        let id = self.next_subject_id.get();
        self.next_subject_id.set(id + 1);
        let int_id = Int::from_i64(self.ctx, id);
        sort.variants[0]
            .constructor
            .apply(&[&int_id as &dyn Ast<'ctx>])
    }

    /// The `Constraint` datatype constant for a stable constraint id.
    pub fn constraint_const(&self, id: i32) -> Dynamic<'ctx> {
        let int_id = Int::from_i64(self.ctx, id as i64);
        self.sorts.constraint.variants[0]
            .constructor
            .apply(&[&int_id as &dyn Ast<'ctx>])
    }

    /// A fresh, genuinely atomic constant of `sort` suitable for binding in
    /// `z3::ast::forall_const` — unlike `fresh_const`/`constraint_const`,
    /// which build `make(id)` application terms for naming frame/constraint
    /// values, a quantifier needs an opaque 0-arity constant to abstract
    /// over. `name` is only a debugging prefix; `Dynamic::fresh_const`
    /// uniquifies it, so reusing the same prefix across axioms never causes
    /// accidental variable capture.
    pub fn bound(&self, name: &str, sort: &Sort<'ctx>) -> Dynamic<'ctx> {
        Dynamic::fresh_const(self.ctx, name, sort)
    }

    /// Assert `fact`, or (when `tag` is given) `tag ⟹ fact` where `tag` is
    /// a boolean constant named after the tag string. Tags collide-by-name
    /// with rule ids by design (§4.1), which is exactly what lets
    /// `check(assumptions)` selectively disable a rule later.
    pub fn assert(&self, fact: &Bool<'ctx>, tag: Option<&str>) {
        match tag {
            Some(name) => {
                let tag_var = Bool::new_const(self.ctx, name);
                self.solver.assert(&tag_var.implies(fact));
            }
            None => self.solver.assert(fact),
        }
    }

    pub fn push(&self) {
        self.solver.push();
    }

    pub fn pop(&self) {
        self.solver.pop(1);
    }

    /// Check satisfiability under the given rule-tag assumption vector.
    pub fn check(&self, assumptions: &[String]) -> CheckResult {
        let bools: Vec<Bool<'ctx>> = assumptions
            .iter()
            .map(|t| Bool::new_const(self.ctx, t.as_str()))
            .collect();
        match self.solver.check_assumptions(&bools) {
            SatResult::Sat => CheckResult::Sat,
            SatResult::Unsat => CheckResult::Unsat,
            SatResult::Unknown => CheckResult::Unknown(self.solver.get_reason_unknown()),
        }
    }

    /// Complete the current model for `term`, defaulting to `false` when
    /// the model leaves it unassigned.
    pub fn eval_bool(&self, term: &Bool<'ctx>) -> bool {
        self.solver
            .get_model()
            .and_then(|model| model.eval(term, true))
            .and_then(|b| b.as_bool())
            .unwrap_or(false)
    }

    /// An independent `Kernel` sharing the current assumption-free
    /// assertions: a fresh `Solver` on the same `Context`, re-asserting
    /// every clause already on the parent's solver. Sorts and relations are
    /// shared read-only (`Rc`, per Design Notes §9); the constraint-id table
    /// is copied so the fork can allocate independently without racing the
    /// parent (§5).
    pub fn fork(&self) -> Kernel<'ctx> {
        let solver = Solver::new(self.ctx);
        for assertion in self.solver.get_assertions() {
            solver.assert(&assertion);
        }
        Kernel {
            ctx: self.ctx,
            solver,
            sorts: Rc::clone(&self.sorts),
            relations: Rc::clone(&self.relations),
            defaults: Rc::clone(&self.defaults),
            ids: self.ids.clone_ids(),
            next_subject_id: Cell::new(self.next_subject_id.get()),
            timeout_ms: self.timeout_ms,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}
