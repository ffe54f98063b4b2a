//! The Subject Stack (§4.4): push/pop frames representing the module under
//! test, its current component, and current license, each push pairing one
//! `Kernel::push()` with the property-equality facts for that frame.

use std::cell::RefCell;

use z3::ast::{Ast, Dynamic};
use z3::FuncDecl;

use crate::domain::{Component, Module};
use crate::kernel::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Module,
    Component,
    License,
}

/// A subject ready to be pushed, dispatched through [`Pushable`] (§9 Design
/// Notes: "model as a tagged variant... plus a `Pushable` capability").
pub enum Subject<'a, 'ctx> {
    Module(&'a Module),
    Component(&'a Component),
    License(&'a Dynamic<'ctx>),
}

pub trait Pushable<'ctx> {
    fn push_into(&self, stack: &Stack<'_, 'ctx>);
}

impl<'a, 'ctx> Pushable<'ctx> for Subject<'a, 'ctx> {
    fn push_into(&self, stack: &Stack<'_, 'ctx>) {
        match self {
            Subject::Module(m) => stack.push_module(m),
            Subject::Component(c) => stack.push_component(c),
            Subject::License(l) => stack.push_license(l),
        }
    }
}

/// Three LIFO stacks of frame constants. Interior-mutable (`RefCell`) so a
/// `&Stack` can be shared by nested [`ScopeGuard`]s without the exclusive
/// borrow one would need for `&mut self` push/pop — this engine is
/// single-threaded and synchronous (§5), so there's no race to guard
/// against, only nested lexical scopes.
pub struct Stack<'k, 'ctx> {
    kernel: &'k Kernel<'ctx>,
    modules: RefCell<Vec<Dynamic<'ctx>>>,
    components: RefCell<Vec<Dynamic<'ctx>>>,
    licenses: RefCell<Vec<Dynamic<'ctx>>>,
}

impl<'k, 'ctx> Stack<'k, 'ctx> {
    pub fn new(kernel: &'k Kernel<'ctx>) -> Stack<'k, 'ctx> {
        Stack {
            kernel,
            modules: RefCell::new(Vec::new()),
            components: RefCell::new(Vec::new()),
            licenses: RefCell::new(Vec::new()),
        }
    }

    /// Push a `Module` frame: one `Kernel::push()`, then `ModuleConstraint(M,
    /// k) = value` for every property the module actually carries (an unset
    /// property is simply never asserted, which is exactly "default false"
    /// under model completion in `Kernel::eval_bool`).
    pub fn push_module(&self, module: &Module) {
        self.kernel.push();
        let m_const = self.kernel.fresh_const(&self.kernel.sorts.module);
        for (key, value) in &module.properties {
            assert_property(self.kernel, &self.kernel.relations.module_constraint, &m_const, "Module", key, *value);
        }
        self.modules.borrow_mut().push(m_const);
    }

    /// Push a `Component` frame: property facts as above, plus
    /// `ModuleComponent(M_top, C)` when a module frame is active.
    pub fn push_component(&self, component: &Component) {
        self.kernel.push();
        let c_const = self.kernel.fresh_const(&self.kernel.sorts.component);
        for (key, value) in &component.properties {
            assert_property(self.kernel, &self.kernel.relations.component_constraint, &c_const, "Component", key, *value);
        }
        if let Some(m_const) = self.modules.borrow().last() {
            let term = self
                .kernel
                .relations
                .module_component
                .apply(&[m_const as &dyn Ast<'ctx>, &c_const as &dyn Ast<'ctx>])
                .as_bool()
                .expect("ModuleComponent is boolean-valued");
            self.kernel.assert(&term, None);
        }
        self.components.borrow_mut().push(c_const);
    }

    /// Push a `License` frame: `ComponentLicense(C_top, license_const)` when
    /// a component frame is active. `license_const` is the stable constant
    /// the knowledge loader allocated for this license key, not a fresh one
    /// — reusing it is what ties this frame to the `LicenseConstraint` facts
    /// asserted at load time.
    pub fn push_license(&self, license_const: &Dynamic<'ctx>) {
        self.kernel.push();
        if let Some(c_const) = self.components.borrow().last() {
            let term = self
                .kernel
                .relations
                .component_license
                .apply(&[c_const as &dyn Ast<'ctx>, license_const as &dyn Ast<'ctx>])
                .as_bool()
                .expect("ComponentLicense is boolean-valued");
            self.kernel.assert(&term, None);
        }
        self.licenses.borrow_mut().push(license_const.clone());
    }

    /// Pop exactly the stack named by `kind` plus one `Kernel::pop()`.
    /// Popping the wrong kind, or an empty stack, is stack misuse (§7):
    /// undefined behaviour in the source, an assertion here.
    pub fn pop(&self, kind: SubjectKind) {
        let popped = match kind {
            SubjectKind::Module => self.modules.borrow_mut().pop(),
            SubjectKind::Component => self.components.borrow_mut().pop(),
            SubjectKind::License => self.licenses.borrow_mut().pop(),
        };
        debug_assert!(popped.is_some(), "pop({kind:?}) called on an empty stack");
        self.kernel.pop();
    }

    pub fn current_component(&self) -> Option<Dynamic<'ctx>> {
        self.components.borrow().last().cloned()
    }
}

fn assert_property<'ctx>(
    kernel: &Kernel<'ctx>,
    relation: &FuncDecl<'ctx>,
    subject: &Dynamic<'ctx>,
    scope: &str,
    key: &str,
    value: bool,
) {
    let id = kernel.constraint_id(&format!("{scope}.{key}"));
    let kconst = kernel.constraint_const(id);
    let term = relation
        .apply(&[subject as &dyn Ast<'ctx>, &kconst as &dyn Ast<'ctx>])
        .as_bool()
        .expect("*Constraint relations are boolean-valued");
    kernel.assert(&if value { term } else { term.not() }, None);
}

/// RAII guard: pops `kind` off `stack` on drop, including on early return via
/// `?` — the Rust-native mechanism for §5's "every push is paired with a pop
/// on every exit path" that doesn't depend on callers remembering to clean
/// up.
pub struct ScopeGuard<'s, 'k, 'ctx> {
    stack: &'s Stack<'k, 'ctx>,
    kind: SubjectKind,
}

impl<'s, 'k, 'ctx> ScopeGuard<'s, 'k, 'ctx> {
    pub fn new(stack: &'s Stack<'k, 'ctx>, kind: SubjectKind) -> ScopeGuard<'s, 'k, 'ctx> {
        ScopeGuard { stack, kind }
    }
}

impl<'s, 'k, 'ctx> Drop for ScopeGuard<'s, 'k, 'ctx> {
    fn drop(&mut self) {
        self.stack.pop(self.kind);
    }
}
