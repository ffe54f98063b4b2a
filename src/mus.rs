//! The MUS Enumerator — MARCO (§4.6): enumerates all Minimal Unsatisfiable
//! Subsets (and, as a side effect of the algorithm, Maximal Satisfiable
//! Subsets) of a tagged set of soft assumptions against the kernel's hard
//! constraints.
//!
//! `MapSolver` is a second, independent `z3::Solver` over plain `Bool`
//! variables indexed by tag position, built on the same `Context` as the
//! kernel it enumerates over — it never touches the kernel's relation
//! sorts, exactly mirroring the source's use of a fresh `z3.Solver()` for
//! the map (§4.6).

use z3::ast::{Ast, Bool};
use z3::{Context, SatResult, Solver};

use crate::kernel::{CheckResult, Kernel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    Mus,
    Mss,
}

/// Enumerate every MUS and MSS of `tags` against `kernel`'s current hard
/// constraints. Grow/shrink try tags in index order, so the result is
/// deterministic for a given `tags` ordering (§4.6, §8 testable property).
pub fn enumerate<'ctx>(kernel: &Kernel<'ctx>, tags: &[String]) -> Vec<(SetKind, Vec<String>)> {
    let n = tags.len();
    let ctx = kernel.context();
    let map_solver = Solver::new(ctx);
    let map_vars: Vec<Bool<'ctx>> = (0..n)
        .map(|i| Bool::new_const(ctx, format!("__marco_map_{i}")))
        .collect();

    let mut results = Vec::new();

    while let Some(seed) = next_seed(&map_solver, &map_vars) {
        let seed_tags = active_tags(tags, &seed);

        match kernel.check(&seed_tags) {
            CheckResult::Unsat => {
                let mus = shrink_to_mus(kernel, tags, &seed);
                block_up(ctx, &map_solver, &map_vars, &mus);
                results.push((SetKind::Mus, active_tags(tags, &mus)));
            }
            CheckResult::Sat | CheckResult::Unknown(_) => {
                let mss = grow_to_mss(kernel, tags, &seed);
                block_down(ctx, &map_solver, &map_vars, &mss);
                results.push((SetKind::Mss, active_tags(tags, &mss)));
            }
        }
    }

    results
}

fn next_seed<'ctx>(map_solver: &Solver<'ctx>, map_vars: &[Bool<'ctx>]) -> Option<Vec<bool>> {
    match map_solver.check() {
        SatResult::Sat => {
            let model = map_solver.get_model()?;
            Some(
                map_vars
                    .iter()
                    .map(|v| model.eval(v, true).and_then(|b| b.as_bool()).unwrap_or(false))
                    .collect(),
            )
        }
        _ => None,
    }
}

fn active_tags(tags: &[String], mask: &[bool]) -> Vec<String> {
    tags.iter()
        .zip(mask.iter())
        .filter(|(_, &included)| included)
        .map(|(t, _)| t.clone())
        .collect()
}

/// Extend a SAT seed to a Maximal Satisfiable Subset by trying to add each
/// currently-excluded tag, in index order, keeping the addition only if the
/// kernel still reports SAT.
fn grow_to_mss<'ctx>(kernel: &Kernel<'ctx>, tags: &[String], seed: &[bool]) -> Vec<bool> {
    let mut current = seed.to_vec();
    for i in 0..tags.len() {
        if current[i] {
            continue;
        }
        current[i] = true;
        if !matches!(kernel.check(&active_tags(tags, &current)), CheckResult::Sat) {
            current[i] = false;
        }
    }
    current
}

/// Shrink an UNSAT seed to a Minimal Unsatisfiable Subset by trying to
/// remove each included tag, in index order, keeping the removal only if
/// the kernel still reports UNSAT.
fn shrink_to_mus<'ctx>(kernel: &Kernel<'ctx>, tags: &[String], seed: &[bool]) -> Vec<bool> {
    let mut current = seed.to_vec();
    for i in 0..tags.len() {
        if !current[i] {
            continue;
        }
        current[i] = false;
        if !matches!(kernel.check(&active_tags(tags, &current)), CheckResult::Unsat) {
            current[i] = true;
        }
    }
    current
}

/// No subset of a reported MSS is worth exploring again: require at least
/// one tag outside it to be included in any future seed.
fn block_down<'ctx>(ctx: &'ctx Context, map_solver: &Solver<'ctx>, map_vars: &[Bool<'ctx>], mss: &[bool]) {
    let outside: Vec<Bool<'ctx>> = map_vars
        .iter()
        .zip(mss.iter())
        .filter(|(_, &included)| !included)
        .map(|(v, _)| v.clone())
        .collect();
    assert_non_universal(ctx, map_solver, &outside);
}

/// No superset of a reported MUS is worth exploring again: require at least
/// one tag inside it to be excluded from any future seed.
fn block_up<'ctx>(ctx: &'ctx Context, map_solver: &Solver<'ctx>, map_vars: &[Bool<'ctx>], mus: &[bool]) {
    let inside: Vec<Bool<'ctx>> = map_vars
        .iter()
        .zip(mus.iter())
        .filter(|(_, &included)| included)
        .map(|(v, _)| v.not())
        .collect();
    assert_non_universal(ctx, map_solver, &inside);
}

fn assert_non_universal<'ctx>(ctx: &'ctx Context, map_solver: &Solver<'ctx>, disjuncts: &[Bool<'ctx>]) {
    if disjuncts.is_empty() {
        // The blocked set spans every tag: no future seed can avoid it.
        map_solver.assert(&Bool::from_bool(ctx, false));
        return;
    }
    let refs: Vec<&Bool<'ctx>> = disjuncts.iter().collect();
    map_solver.assert(&Bool::or(ctx, &refs));
}
