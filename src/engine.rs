//! Top-level entry point: owns a [`Kernel`] loaded once from a knowledge
//! base, and drives fresh [`Stack`]s through the [`checker`] for each
//! `check_module`/`check_component` call (§3 Lifecycle: "built once... then
//! repeatedly used in a transient push/check/pop cycle").
//!
//! An `Engine<'ctx>` borrows its `z3::Context` rather than owning it — the
//! caller builds one up front with `kernel::build_context` and keeps it
//! alive for as long as the engine (and any of its forks) are in use, the
//! same explicit-context-ownership convention
//! `logos_verification/src/solver.rs` uses for its own `Verifier`/
//! `VerificationContext` pair.

use std::rc::Rc;

use crate::checker::{self, ComponentResult, ModuleResult};
use crate::config::EngineConfig;
use crate::definitions::KnowledgeBaseDef;
use crate::domain::{Component, Module};
use crate::kernel::Kernel;
use crate::knowledge::{self, KnowledgeBase};
use crate::subject::Stack;

pub struct Engine<'ctx> {
    kernel: Kernel<'ctx>,
    knowledge: Rc<KnowledgeBase<'ctx>>,
}

impl<'ctx> Engine<'ctx> {
    /// Build an engine from configuration and a parsed knowledge base,
    /// compiling every license/constraint/obligation/rule axiom into the
    /// kernel exactly once. `ctx` must outlive the returned `Engine`.
    pub fn new(ctx: &'ctx z3::Context, config: &EngineConfig, defs: &KnowledgeBaseDef) -> Engine<'ctx> {
        let kernel = Kernel::new(ctx, config);
        let knowledge = Rc::new(knowledge::load(&kernel, defs));
        Engine { kernel, knowledge }
    }

    pub fn knowledge(&self) -> &KnowledgeBase<'ctx> {
        &self.knowledge
    }

    pub fn check_module(&self, module: &Module, components: Option<&[String]>) -> ModuleResult {
        let stack = Stack::new(&self.kernel);
        checker::check_module(&self.kernel, &stack, &self.knowledge, module, components)
    }

    pub fn check_component(&self, component: &Component, licenses: Option<&[String]>) -> ComponentResult {
        let stack = Stack::new(&self.kernel);
        checker::check_component(&self.kernel, &stack, &self.knowledge, component, licenses)
    }

    /// An independent engine sharing this one's read-only knowledge (§5,
    /// §9): `Kernel::fork()` gives it its own solver over the same
    /// `Context`, while the `Rc<KnowledgeBase>` (rule/license/obligation
    /// tables) is cloned, not recompiled. Forked engines may be driven from
    /// separate threads with no synchronization, but never touch the
    /// parent's `Kernel` while a fork built from it is active unless the
    /// caller enforces exclusion.
    pub fn fork(&self) -> Engine<'ctx> {
        Engine {
            kernel: self.kernel.fork(),
            knowledge: Rc::clone(&self.knowledge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::CheckResult;
    use crate::kernel;
    use std::collections::BTreeMap;

    fn trivial_module() -> Module {
        let mut components = BTreeMap::new();
        components.insert(
            "test".to_string(),
            Component {
                key: "test".to_string(),
                properties: BTreeMap::new(),
                licenses: vec!["L1".to_string()],
            },
        );
        Module {
            key: "m".to_string(),
            properties: BTreeMap::new(),
            components,
        }
    }

    #[test]
    fn fork_shares_knowledge_and_is_independent() {
        let defs: KnowledgeBaseDef = serde_json::from_str(r#"{ "Licenses": { "L1": {} } }"#).unwrap();
        let ctx = kernel::build_context(&EngineConfig::default());
        let engine = Engine::new(&ctx, &EngineConfig::default(), &defs);
        let forked = engine.fork();

        let a = engine.check_module(&trivial_module(), None);
        let b = forked.check_module(&trivial_module(), None);
        assert_eq!(a, b);
        assert_eq!(a["test"]["L1"], CheckResult::Sat { obligations: vec![] });
    }
}
