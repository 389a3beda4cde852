//! Hands whatever equations survive the ordering and ODE phases to the
//! algebraic solver, or short-circuits if there is nothing left to solve
//! for.

use std::collections::HashMap;

use lse_core::{Evaluator, Expression, UnitConverter, VariableStore};
use lse_solve::{AlgebraicConfig, Solution};

use crate::expr_util::collect_variables;

/// The outcome of Phase G.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No unknowns remained; every equation was checked directly against
    /// the store. `true` if all of them held within tolerance.
    NoUnknowns { consistent: bool },
    /// More unknowns remained than equations to pin them down.
    Underspecified { equations: usize, unknowns: usize },
    /// The solver ran; see [`Solution::status`] for convergence.
    Solved(Solution),
}

/// Runs the algebraic phase over `equations`. Solver progress events are
/// not surfaced through the orchestrator's own `Observer`; callers that
/// need iteration-level detail can call [`lse_solve::solve_algebraic`]
/// directly instead.
pub fn run<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    equations: &[(Expression, Expression)],
    config: &AlgebraicConfig,
) -> Outcome {
    let unknowns = collect_unresolved_unknowns(equations, store);

    if unknowns.is_empty() {
        return Outcome::NoUnknowns { consistent: all_equations_hold(store, units, equations) };
    }

    if equations.len() < unknowns.len() {
        return Outcome::Underspecified {
            equations: equations.len(),
            unknowns: unknowns.len(),
        };
    }

    let guesses = HashMap::new();
    let solution = lse_solve::solve_algebraic(store, units, equations, &unknowns, config, &guesses, &mut ());
    Outcome::Solved(solution)
}

fn collect_unresolved_unknowns(
    equations: &[(Expression, Expression)],
    store: &VariableStore,
) -> Vec<String> {
    let mut names = Vec::new();
    for (lhs, rhs) in equations {
        collect_variables(lhs, &mut names);
        collect_variables(rhs, &mut names);
    }
    names.retain(|name| !store.is_explicit(name) && !store.is_solved(name));
    names.sort_by_key(|name| name.to_ascii_lowercase());
    names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    names
}

/// Every equation is evaluated with the current (fully-known) store and
/// accepted if both sides agree within `1e-2`.
fn all_equations_hold<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    equations: &[(Expression, Expression)],
) -> bool {
    equations.iter().all(|(lhs, rhs)| {
        let mut evaluator = Evaluator::new(store, units, true);
        match (evaluator.evaluate(lhs), evaluator.evaluate(rhs)) {
            (Ok(l), Ok(r)) => (l - r).abs() <= 1e-2,
            _ => false,
        }
    })
}
