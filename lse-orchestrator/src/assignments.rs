//! Executes `:=` assignments in source order. Unlike the ordering
//! phase's candidates, a later `:=` simply rebinds an earlier one — there
//! is no redefinition check here, since `:=` is by definition an
//! overwrite, not a consistency assertion.

use lse_core::{Evaluator, Expression, UnitConverter, VariableStore};

use crate::event::OrchestratorEvent;
use lse_solve::Observer;

/// Evaluates each `:=` right-hand side in source order and stores it as
/// `Explicit`. A failed evaluation is reported and skipped; it does not
/// abort the phase.
pub fn execute_explicit<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    assignments: &[(String, Expression)],
    observer: &mut impl Observer<OrchestratorEvent>,
) {
    for (name, expr) in assignments {
        let mut evaluator = Evaluator::new(store, units, true);
        match evaluator.evaluate(expr) {
            Ok(value) => store.set_explicit(name, value),
            Err(err) => observer.observe(&OrchestratorEvent::EvaluationFailed {
                target: name.clone(),
                error: err.to_string(),
            }),
        }
    }
}
