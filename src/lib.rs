#![cfg_attr(test, allow(warnings))]

pub mod checker; // Assumption-driven SAT/UNSAT checking and obligation extraction
pub mod config; // Shared configuration loader
pub mod constraints; // CNF/DNF clause compilation and the small expression grammar
pub mod definitions; // Knowledge-base JSON model, Includes merge and glob expansion
pub mod domain; // Module/Component subject types and dist_obj/dist_src derivation
pub mod engine; // Top-level facade tying the kernel and knowledge base together
pub mod error;
pub mod kernel; // Z3 sorts, relations, and the push/pop/check primitives
pub mod knowledge; // Compiles a KnowledgeBaseDef into kernel axioms
pub mod logging; // File-based logging (avoids stdio interference)
pub mod mus; // MARCO: Minimal Unsatisfiable Subset / Maximal Satisfiable Subset enumeration
pub mod subject; // The module/component/license push/pop stack

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
