//! The Constraint Builder (§4.2): compiles dotted-key atoms, CNF/DNF
//! declarative forms, and the small textual expression grammar into Z3
//! terms over the kernel's relations.

use z3::ast::{Ast, Bool, Dynamic};
use z3::Context;

use crate::kernel::Kernel;
use crate::logging;

/// The scope a dotted-key atom is qualified by. `License` is only produced
/// by the expression grammar (§9 Design Notes) — CNF/DNF atoms default to
/// `Component` when no dot is present, mirroring the source's
/// `__makeComponentCnstr` default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Module,
    Component,
    License,
}

/// A parsed dotted-key atom: `[!]Scope.Property`, or a bare `Property`
/// (defaulting to `Component`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub negated: bool,
    pub scope: Scope,
    pub property: String,
}

impl Atom {
    pub fn parse(key: &str) -> Atom {
        let (negated, rest) = match key.strip_prefix('!') {
            Some(r) => (true, r),
            None => (false, key),
        };

        match rest.split_once('.') {
            Some(("Module", prop)) => Atom {
                negated,
                scope: Scope::Module,
                property: prop.to_string(),
            },
            Some(("Component", prop)) => Atom {
                negated,
                scope: Scope::Component,
                property: prop.to_string(),
            },
            Some(("License", prop)) => Atom {
                negated,
                scope: Scope::License,
                property: prop.to_string(),
            },
            _ => Atom {
                negated,
                scope: Scope::Component,
                property: rest.to_string(),
            },
        }
    }

    pub fn scope_property(&self) -> String {
        format!("{}.{}", scope_name(self.scope), self.property)
    }
}

fn scope_name(scope: Scope) -> &'static str {
    match scope {
        Scope::Module => "Module",
        Scope::Component => "Component",
        Scope::License => "License",
    }
}

/// A bound subject constant for each scope an atom might reference, used to
/// build atom terms against either the universally-quantified axiom
/// variables (`knowledge.rs`) or the current subject-stack frame
/// (`subject.rs`).
/// Every field is always populated — when an axiom doesn't quantify over a
/// given scope (e.g. an obligation's `(license, component)` axiom has no
/// `module`), the un-quantified slot falls back to `Kernel::defaults`, per
/// §4.2's "defaulted to a canonical one".
#[derive(Debug, Clone)]
pub struct Subjects<'a, 'ctx> {
    pub module: &'a Dynamic<'ctx>,
    pub component: &'a Dynamic<'ctx>,
    pub license: &'a Dynamic<'ctx>,
}

impl<'a, 'ctx> Subjects<'a, 'ctx> {
    pub fn defaults(kernel: &'a Kernel<'ctx>) -> Subjects<'a, 'ctx> {
        Subjects {
            module: &kernel.defaults.module,
            component: &kernel.defaults.component,
            license: &kernel.defaults.license,
        }
    }

    pub fn with_component(mut self, c: &'a Dynamic<'ctx>) -> Subjects<'a, 'ctx> {
        self.component = c;
        self
    }

    pub fn with_module(mut self, m: &'a Dynamic<'ctx>) -> Subjects<'a, 'ctx> {
        self.module = m;
        self
    }

    pub fn with_license(mut self, l: &'a Dynamic<'ctx>) -> Subjects<'a, 'ctx> {
        self.license = l;
        self
    }
}

pub struct Builder<'k, 'ctx> {
    kernel: &'k Kernel<'ctx>,
}

impl<'k, 'ctx> Builder<'k, 'ctx> {
    pub fn new(kernel: &'k Kernel<'ctx>) -> Builder<'k, 'ctx> {
        Builder { kernel }
    }

    /// Scope-dispatching atom term: `ModuleConstraint(m, k)` /
    /// `ComponentConstraint(c, k)` / `LicenseConstraint(l, k)`, negated if
    /// the atom carries a leading `!`.
    pub fn atom_term(&self, atom: &Atom, subjects: &Subjects<'_, 'ctx>) -> Bool<'ctx> {
        let id = self.kernel.constraint_id(&atom.scope_property());
        let k = self.kernel.constraint_const(id);
        let term = match atom.scope {
            Scope::Module => self.kernel.relations.module_constraint.apply(&[
                subjects.module as &dyn Ast<'ctx>,
                &k as &dyn Ast<'ctx>,
            ]),
            Scope::Component => self.kernel.relations.component_constraint.apply(&[
                subjects.component as &dyn Ast<'ctx>,
                &k as &dyn Ast<'ctx>,
            ]),
            Scope::License => self.kernel.relations.license_constraint.apply(&[
                subjects.license as &dyn Ast<'ctx>,
                &k as &dyn Ast<'ctx>,
            ]),
        };
        let b = term.as_bool().expect("*Constraint relations are boolean-valued");
        if atom.negated {
            b.not()
        } else {
            b
        }
    }

    /// Builds the atom term unconditionally against the `Component` scope,
    /// regardless of the atom's own declared scope — used only by the
    /// no-variants obligation-setting branch of the knowledge loader,
    /// preserving the asymmetry documented in Design Notes §9.
    pub fn component_atom_term(&self, atom: &Atom, component: &Dynamic<'ctx>) -> Bool<'ctx> {
        let key = format!("Component.{}", atom.property);
        let id = self.kernel.constraint_id(&key);
        let k = self.kernel.constraint_const(id);
        let term = self
            .kernel
            .relations
            .component_constraint
            .apply(&[component as &dyn Ast<'ctx>, &k as &dyn Ast<'ctx>]);
        let b = term.as_bool().expect("ComponentConstraint is boolean-valued");
        if atom.negated {
            b.not()
        } else {
            b
        }
    }

    /// `[[a,b],[c]]` → `(a∨b)∧c`. An empty clause list is vacuously `true`;
    /// a malformed shape is a definition-error warning, treated as empty
    /// (true), and the invalid entries are simply skipped.
    pub fn cnf(&self, clauses: &[Vec<String>], subjects: &Subjects<'_, 'ctx>) -> Bool<'ctx> {
        if clauses.is_empty() {
            return Bool::from_bool(self.kernel.context(), true);
        }
        let conjuncts: Vec<Bool<'ctx>> = clauses
            .iter()
            .map(|clause| self.disjunction(clause, subjects))
            .collect();
        and_all(self.kernel.context(), &conjuncts)
    }

    /// `[[a,b],[c]]` → `(a∧b)∨c`. An empty clause list is vacuously `false`
    /// (an empty disjunction), matching the source's `Or([])` semantics.
    pub fn dnf(&self, clauses: &[Vec<String>], subjects: &Subjects<'_, 'ctx>) -> Bool<'ctx> {
        if clauses.is_empty() {
            return Bool::from_bool(self.kernel.context(), false);
        }
        let disjuncts: Vec<Bool<'ctx>> = clauses
            .iter()
            .map(|clause| self.conjunction(clause, subjects))
            .collect();
        or_all(self.kernel.context(), &disjuncts)
    }

    /// `dnf`, but every atom is built against `Component` scope unconditionally
    /// via [`Builder::component_atom_term`], ignoring the atom's own declared
    /// scope prefix. Used only by the knowledge loader's no-variants
    /// obligation-setting branch, preserving the source's asymmetry (§9 Design
    /// Notes): the with-variants branch dispatches on scope, this one never
    /// does.
    pub fn dnf_component_only(&self, clauses: &[Vec<String>], component: &Dynamic<'ctx>) -> Bool<'ctx> {
        if clauses.is_empty() {
            return Bool::from_bool(self.kernel.context(), false);
        }
        let disjuncts: Vec<Bool<'ctx>> = clauses
            .iter()
            .map(|clause| {
                let terms: Vec<Bool<'ctx>> = clause
                    .iter()
                    .map(|a| self.component_atom_term(&Atom::parse(a), component))
                    .collect();
                and_all(self.kernel.context(), &terms)
            })
            .collect();
        or_all(self.kernel.context(), &disjuncts)
    }

    fn disjunction(&self, atoms: &[String], subjects: &Subjects<'_, 'ctx>) -> Bool<'ctx> {
        let terms: Vec<Bool<'ctx>> = atoms
            .iter()
            .map(|a| self.atom_term(&Atom::parse(a), subjects))
            .collect();
        or_all(self.kernel.context(), &terms)
    }

    fn conjunction(&self, atoms: &[String], subjects: &Subjects<'_, 'ctx>) -> Bool<'ctx> {
        let terms: Vec<Bool<'ctx>> = atoms
            .iter()
            .map(|a| self.atom_term(&Atom::parse(a), subjects))
            .collect();
        and_all(self.kernel.context(), &terms)
    }

    pub fn parse_expr(&self, text: &str) -> Result<Expr, String> {
        Expr::parse(text)
    }

    pub fn eval_expr(&self, expr: &Expr, subjects: &Subjects<'_, 'ctx>) -> Bool<'ctx> {
        expr.eval(self, subjects)
    }
}

fn and_all<'ctx>(ctx: &'ctx Context, terms: &[Bool<'ctx>]) -> Bool<'ctx> {
    let refs: Vec<&Bool<'ctx>> = terms.iter().collect();
    Bool::and(ctx, &refs)
}

fn or_all<'ctx>(ctx: &'ctx Context, terms: &[Bool<'ctx>]) -> Bool<'ctx> {
    let refs: Vec<&Bool<'ctx>> = terms.iter().collect();
    Bool::or(ctx, &refs)
}

/// Parse a `list[list[str]]` CNF/DNF value from the wire format (§6). A
/// shape mismatch (non-array, non-string atom) is reported at `component`
/// and treated as empty, per §4.2's error policy — the caller decides
/// whether empty means `true` (CNF) or `false` (DNF).
pub fn parse_clauses(value: &serde_json::Value, component: &str) -> Vec<Vec<String>> {
    let Some(outer) = value.as_array() else {
        if !value.is_null() {
            logging::log(
                "WARNING",
                component,
                "CNF/DNF value is not a list; treating as empty",
            );
        }
        return Vec::new();
    };

    let mut clauses = Vec::new();
    for clause in outer {
        let Some(inner) = clause.as_array() else {
            logging::log(
                "WARNING",
                component,
                "CNF/DNF clause is not a list; skipping clause",
            );
            continue;
        };
        let mut atoms = Vec::new();
        for atom in inner {
            match atom.as_str() {
                Some(s) => atoms.push(s.to_string()),
                None => logging::log(
                    "WARNING",
                    component,
                    "CNF/DNF atom is not a string; skipping atom",
                ),
            }
        }
        clauses.push(atoms);
    }
    clauses
}

/// The textual expression grammar (§4.2): `and`, `or`, `not`, `implies`,
/// `if-then-else`, `true`/`false`, and dotted-key atoms. A single
/// recursive-descent AST, per Design Notes §9, replacing the
/// parser/transformer-class split of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    True,
    False,
    Atom(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    IfThenElse(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn parse(text: &str) -> Result<Expr, String> {
        let tokens = tokenize(text);
        let mut parser = ExprParser { tokens, pos: 0 };
        let expr = parser.parse_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(format!("unexpected trailing input at token {}", parser.pos));
        }
        Ok(expr)
    }

    pub fn eval<'k, 'ctx>(&self, builder: &Builder<'k, 'ctx>, subjects: &Subjects<'_, 'ctx>) -> Bool<'ctx> {
        match self {
            Expr::True => Bool::from_bool(builder.kernel.context(), true),
            Expr::False => Bool::from_bool(builder.kernel.context(), false),
            Expr::Atom(key) => builder.atom_term(&Atom::parse(key), subjects),
            Expr::Not(inner) => inner.eval(builder, subjects).not(),
            Expr::And(a, b) => Bool::and(
                builder.kernel.context(),
                &[&a.eval(builder, subjects), &b.eval(builder, subjects)],
            ),
            Expr::Or(a, b) => Bool::or(
                builder.kernel.context(),
                &[&a.eval(builder, subjects), &b.eval(builder, subjects)],
            ),
            Expr::Implies(a, b) => a.eval(builder, subjects).implies(&b.eval(builder, subjects)),
            Expr::IfThenElse(c, t, f) => c
                .eval(builder, subjects)
                .ite(&t.eval(builder, subjects), &f.eval(builder, subjects)),
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '(' || c == ')' {
            tokens.push(c.to_string());
            chars.next();
        } else {
            let mut tok = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '(' || c == ')' {
                    break;
                }
                tok.push(c);
                chars.next();
            }
            tokens.push(tok);
        }
    }
    tokens
}

struct ExprParser {
    tokens: Vec<String>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn advance(&mut self) -> Option<String> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &str) -> Result<(), String> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(format!("expected '{expected}', found '{t}'")),
            None => Err(format!("expected '{expected}', found end of input")),
        }
    }

    /// `implies` is the lowest-precedence binary operator, right-associative.
    fn parse_expr(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_or()?;
        if self.peek() == Some("implies") {
            self.advance();
            let rhs = self.parse_expr()?;
            return Ok(Expr::Implies(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some("or") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some("and") {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some("not") {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(tok) if tok == "(" => {
                if self.peek() == Some("if") {
                    self.advance();
                    let cond = self.parse_expr()?;
                    self.expect("then")?;
                    let then_branch = self.parse_expr()?;
                    self.expect("else")?;
                    let else_branch = self.parse_expr()?;
                    self.expect(")")?;
                    Ok(Expr::IfThenElse(
                        Box::new(cond),
                        Box::new(then_branch),
                        Box::new(else_branch),
                    ))
                } else {
                    let inner = self.parse_expr()?;
                    self.expect(")")?;
                    Ok(inner)
                }
            }
            Some(tok) if tok == "true" => Ok(Expr::True),
            Some(tok) if tok == "false" => Ok(Expr::False),
            Some(tok) => Ok(Expr::Atom(tok)),
            None => Err("unexpected end of input".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_parse_defaults_to_component_scope() {
        let a = Atom::parse("dist_obj");
        assert_eq!(a.scope, Scope::Component);
        assert!(!a.negated);
    }

    #[test]
    fn atom_parse_handles_negation_and_module_scope() {
        let a = Atom::parse("!Module.D_op");
        assert!(a.negated);
        assert_eq!(a.scope, Scope::Module);
        assert_eq!(a.property, "D_op");
    }

    #[test]
    fn parse_clauses_reports_non_list_as_empty() {
        let v = serde_json::json!("not-a-list");
        let clauses = parse_clauses(&v, "test");
        assert!(clauses.is_empty());
    }

    #[test]
    fn parse_clauses_skips_non_string_atoms() {
        let v = serde_json::json!([["Component.dist_obj", 5]]);
        let clauses = parse_clauses(&v, "test");
        assert_eq!(clauses, vec![vec!["Component.dist_obj".to_string()]]);
    }

    #[test]
    fn expr_grammar_parses_implies_and_ite() {
        let e = Expr::parse("Component.dist_obj implies (if Component.dist_src then true else false)")
            .unwrap();
        match e {
            Expr::Implies(lhs, rhs) => {
                assert_eq!(*lhs, Expr::Atom("Component.dist_obj".to_string()));
                assert!(matches!(*rhs, Expr::IfThenElse(..)));
            }
            other => panic!("expected Implies, got {other:?}"),
        }
    }

    #[test]
    fn expr_grammar_rejects_trailing_garbage() {
        assert!(Expr::parse("true false").is_err());
    }
}
