//! Orders candidate assignments by data dependency and executes each as
//! soon as its right-hand side is fully known. These two phases are
//! implemented as a single fixed-point loop rather than a separate
//! topological sort followed by a separate execution pass: "pick any node
//! whose dependencies are all known, evaluate it, repeat" produces the
//! same result as an explicit Kahn's-algorithm ordering, and a pass that
//! makes no progress identifies exactly the cyclic remainder to demote to
//! the algebraic solver.

use lse_core::{Evaluator, Expression, UnitConverter, VariableStore};

use crate::error::OrchestratorError;
use crate::event::OrchestratorEvent;
use crate::expr_util::collect_variables;
use lse_solve::Observer;

/// Orders and executes `candidates`, writing each resolved name to
/// `store` as `Explicit`. Names that never become fully known (because
/// they form a dependency cycle, or depend on a name no other statement
/// defines) are returned as algebraic equations (`Variable(name) = rhs`)
/// for the algebraic phase to pick up instead.
///
/// # Errors
///
/// Returns [`OrchestratorError::RedefinitionConflict`] the moment an
/// ordered assignment computes a value that disagrees with an existing
/// `Explicit` value by more than relative `1e-6` and the name isn't a
/// `_check`/`_error`-suffixed consistency probe.
pub fn resolve<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    mut candidates: Vec<(String, Expression)>,
    observer: &mut impl Observer<OrchestratorEvent>,
) -> Result<Vec<(Expression, Expression)>, OrchestratorError> {
    loop {
        let mut progressed = false;
        let mut remaining = Vec::new();

        for (name, expr) in candidates {
            if !rhs_known(&expr, store) {
                remaining.push((name, expr));
                continue;
            }

            let mut evaluator = Evaluator::new(store, units, true);
            match evaluator.evaluate(&expr) {
                Ok(value) => {
                    assign_checked(store, &name, value, observer)?;
                    progressed = true;
                }
                Err(err) => {
                    observer.observe(&OrchestratorEvent::EvaluationFailed {
                        target: name.clone(),
                        error: err.to_string(),
                    });
                    remaining.push((name, expr));
                }
            }
        }

        candidates = remaining;
        if !progressed || candidates.is_empty() {
            break;
        }
    }

    Ok(candidates
        .into_iter()
        .map(|(name, expr)| {
            observer.observe(&OrchestratorEvent::DemotedToAlgebraic(name.clone()));
            (Expression::Variable(name), expr)
        })
        .collect())
}

fn rhs_known(expr: &Expression, store: &VariableStore) -> bool {
    let mut names = Vec::new();
    collect_variables(expr, &mut names);
    names.iter().all(|name| store.is_explicit(name) || store.is_solved(name))
}

/// Writes `value` to `store` as `Explicit`. If `name` is already
/// `Explicit` with a materially different value, this is a
/// [`OrchestratorError::RedefinitionConflict`] — unless `name` ends in
/// `_check`/`_error`, a convention carved out for consistency-check
/// probes.
fn assign_checked(
    store: &mut VariableStore,
    name: &str,
    value: f64,
    observer: &mut impl Observer<OrchestratorEvent>,
) -> Result<(), OrchestratorError> {
    if store.is_explicit(name) {
        let existing = store.get(name).0;
        let relative_diff = (value - existing).abs() / existing.abs().max(1e-12);
        let is_probe = {
            let lower = name.to_ascii_lowercase();
            lower.ends_with("_check") || lower.ends_with("_error")
        };
        if relative_diff > 1e-6 && !is_probe {
            observer.observe(&OrchestratorEvent::RedefinitionConflict {
                name: name.to_string(),
                existing,
                new: value,
            });
            return Err(OrchestratorError::RedefinitionConflict {
                name: name.to_string(),
                existing,
                new: value,
            });
        }
    }
    store.set_explicit(name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lse_core::ast::BinaryOperator as Op;
    use lse_core::units::NullUnitConverter;
    use lse_core::Expression as E;

    #[test]
    fn resolves_a_chain_regardless_of_source_order() {
        let mut store = VariableStore::new();
        store.set_explicit("a", 2.0);
        let units = NullUnitConverter;
        // c depends on b depends on a, listed out of dependency order.
        let candidates = vec![
            ("c".to_string(), E::binary(Op::Mul, E::var("b"), E::Number(2.0))),
            ("b".to_string(), E::binary(Op::Add, E::var("a"), E::Number(1.0))),
        ];
        let demoted = resolve(&mut store, &units, candidates, &mut ()).unwrap();
        assert!(demoted.is_empty());
        assert_eq!(store.get("b").0, 3.0);
        assert_eq!(store.get("c").0, 6.0);
    }

    #[test]
    fn a_cycle_is_demoted_to_algebraic() {
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let candidates = vec![
            ("x".to_string(), E::binary(Op::Add, E::var("y"), E::Number(1.0))),
            ("y".to_string(), E::binary(Op::Add, E::var("x"), E::Number(1.0))),
        ];
        let demoted = resolve(&mut store, &units, candidates, &mut ()).unwrap();
        assert_eq!(demoted.len(), 2);
    }

    #[test]
    fn redefinition_conflict_is_a_fatal_error_and_leaves_the_store_untouched() {
        let mut store = VariableStore::new();
        store.set_explicit("x", 1.0);
        let units = NullUnitConverter;
        let candidates = vec![("x".to_string(), E::Number(2.0))];
        let mut events = Vec::new();
        let result = resolve(
            &mut store,
            &units,
            candidates,
            &mut |e: &OrchestratorEvent| events.push(e.clone()),
        );
        assert_eq!(store.get("x").0, 1.0);
        assert!(matches!(result, Err(OrchestratorError::RedefinitionConflict { .. })));
        assert!(matches!(events[0], OrchestratorEvent::RedefinitionConflict { .. }));
    }

    #[test]
    fn check_suffixed_names_are_exempt_from_the_conflict_check() {
        let mut store = VariableStore::new();
        store.set_explicit("balance_check", 1.0);
        let units = NullUnitConverter;
        let candidates = vec![("balance_check".to_string(), E::Number(2.0))];
        resolve(&mut store, &units, candidates, &mut ()).unwrap();
        assert_eq!(store.get("balance_check").0, 2.0);
    }
}
