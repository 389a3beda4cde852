//! Drives each `INTEGRAL` definition through [`lse_solve::ode`],
//! consuming the state equations that define its derivative out of the
//! algebraic list, and building the `$IntegralTable` output if one was
//! requested.
//!
//! ODE-internal solver progress (`lse_solve::OdeEvent`) is not threaded
//! through the orchestrator's own `Observer`, the same simplification
//! [`crate::algebraic_phase`] makes for the algebraic solver's events.

use std::collections::HashMap;

use lse_core::{Evaluator, Expression, IntegralTable, Provenance, UnitConverter, VariableStore};
use lse_solve::ode::{self, Names, Trajectory};
use lse_solve::OdeConfig;

use crate::directives::IntegralTableDirective;
use crate::error::OrchestratorError;
use crate::expr_util::{as_variable_name, mentions};
use crate::partition::IntegralDefinition;

/// Runs every `INTEGRAL` definition in `definitions`, removing the state
/// equations each one consumes from `algebraic`, and returns the
/// `$IntegralTable` output if the directive named this integration's
/// independent variable.
///
/// # Errors
///
/// Returns [`OrchestratorError`] if an `INTEGRAL` argument is malformed or
/// the integration itself fails (derivative isolation, evaluator errors).
pub fn run<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    definitions: &[IntegralDefinition],
    algebraic: &mut Vec<(Expression, Expression)>,
    auto_step: &OdeConfig,
    table_directive: Option<&IntegralTableDirective>,
    assignment_lookup: &HashMap<String, Expression>,
) -> Result<Option<IntegralTable>, OrchestratorError> {
    let mut table = None;

    for definition in definitions {
        let (dydt_name, t_name, lower, upper, step) = read_args(store, units, definition)?;

        let y_initial = initial_value(store, &definition.y, lower);

        let state_equations = extract_state_equations(algebraic, &dydt_name);
        let names = Names { dydt: &dydt_name, y: &definition.y, t: &t_name };

        let outcome = ode::integrate(
            store,
            units,
            &state_equations,
            names,
            lower,
            y_initial,
            upper,
            step,
            auto_step,
            &mut (),
        )?;

        if let Some(directive) = table_directive {
            if directive.independent.eq_ignore_ascii_case(&t_name) {
                table = Some(build_table(
                    store,
                    units,
                    directive,
                    &outcome.trajectory,
                    names,
                    assignment_lookup,
                ));
            }
        }
    }

    Ok(table)
}

fn read_args<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    definition: &IntegralDefinition,
) -> Result<(String, String, f64, f64, Option<f64>), OrchestratorError> {
    let dydt_name = as_variable_name(&definition.args[0]).ok_or_else(|| OrchestratorError::MalformedIntegral {
        y: definition.y.clone(),
        detail: "first INTEGRAL argument must be the derivative variable".to_string(),
    })?;
    let t_name = as_variable_name(&definition.args[1]).ok_or_else(|| OrchestratorError::MalformedIntegral {
        y: definition.y.clone(),
        detail: "second INTEGRAL argument must be the independent variable".to_string(),
    })?;

    let mut evaluator = Evaluator::new(store, units, true);
    let lower = evaluator.evaluate(&definition.args[2])?;
    let upper = evaluator.evaluate(&definition.args[3])?;
    let step = if definition.args.len() > 4 {
        Some(evaluator.evaluate(&definition.args[4])?)
    } else {
        None
    };

    Ok((dydt_name, t_name, lower, upper, step))
}

/// The dependent variable's starting value: whatever is already
/// `Explicit`, else `0.0` if integration starts at `t=0` (the common
/// "initial condition is the origin" case), else the store's own
/// auto-vivified default.
fn initial_value(store: &mut VariableStore, y: &str, lower: f64) -> f64 {
    if store.is_explicit(y) {
        return store.get(y).0;
    }
    if lower == 0.0 {
        store.set_explicit(y, 0.0);
        return 0.0;
    }
    store.get(y).0
}

/// Removes every equation mentioning `dydt` from `algebraic` and returns
/// them as this integration's state equations.
fn extract_state_equations(
    algebraic: &mut Vec<(Expression, Expression)>,
    dydt: &str,
) -> Vec<(Expression, Expression)> {
    let mut consumed = Vec::new();
    let mut kept = Vec::new();
    for pair in algebraic.drain(..) {
        if mentions(&pair.0, dydt) || mentions(&pair.1, dydt) {
            consumed.push(pair);
        } else {
            kept.push(pair);
        }
    }
    *algebraic = kept;
    consumed
}

fn build_table<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    directive: &IntegralTableDirective,
    raw_trajectory: &Trajectory,
    names: Names,
    assignment_lookup: &HashMap<String, Expression>,
) -> IntegralTable {
    let trajectory = match directive.step {
        Some(delta) if delta > 0.0 => raw_trajectory.resample(delta),
        _ => raw_trajectory.clone(),
    };

    let mut table = IntegralTable::new();
    table.push_column(names.t.to_string(), trajectory.times.clone());
    table.push_column(names.y.to_string(), trajectory.values.clone());

    for column in &directive.columns {
        if column.eq_ignore_ascii_case(names.t) || column.eq_ignore_ascii_case(names.y) {
            continue;
        }
        let values = sample_column(store, units, column, &trajectory, names, assignment_lookup);
        table.push_column(column.clone(), values);
    }

    table
}

/// Evaluates `column`'s defining expression (found in `assignment_lookup`)
/// at every sampled `(t, y)` pair, temporarily rebinding `names.t`/`names.y`
/// for each sample. If no defining expression is known, the column is
/// filled with the store's current value for `column`, repeated.
fn sample_column<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    column: &str,
    trajectory: &Trajectory,
    names: Names,
    assignment_lookup: &HashMap<String, Expression>,
) -> Vec<f64> {
    let Some(expr) = assignment_lookup.get(&column.to_ascii_lowercase()) else {
        let (value, _) = store.get(column);
        return vec![value; trajectory.times.len()];
    };

    let mut values = Vec::with_capacity(trajectory.times.len());
    for (&t_sample, &y_sample) in trajectory.times.iter().zip(&trajectory.values) {
        let t_backup = backup(store, names.t);
        let y_backup = backup(store, names.y);

        store.set_explicit(names.t, t_sample);
        store.set_explicit(names.y, y_sample);

        let mut evaluator = Evaluator::new(store, units, false);
        values.push(evaluator.evaluate(expr).unwrap_or(f64::NAN));

        restore(store, names.t, t_backup);
        restore(store, names.y, y_backup);
    }
    values
}

struct Backup {
    value: f64,
    provenance: Provenance,
}

fn backup(store: &mut VariableStore, name: &str) -> Backup {
    let (value, _) = store.get(name);
    let provenance = store.provenance(name).unwrap_or(Provenance::Default);
    Backup { value, provenance }
}

fn restore(store: &mut VariableStore, name: &str, saved: Backup) {
    match saved.provenance {
        Provenance::Solved => store.set_solved(name, saved.value),
        Provenance::Explicit | Provenance::Guess | Provenance::Default => {
            store.set_explicit(name, saved.value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lse_core::ast::BinaryOperator as Op;
    use lse_core::units::NullUnitConverter;
    use lse_core::Expression as E;

    fn definition() -> IntegralDefinition {
        IntegralDefinition {
            y: "y".to_string(),
            args: vec![E::var("dydt"), E::var("t"), E::Number(0.0), E::Number(1.0)],
        }
    }

    #[test]
    fn runs_a_direct_derivative_and_consumes_its_equation() {
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let mut algebraic = vec![(E::var("dydt"), E::Number(1.0))];
        let lookup = HashMap::new();

        let table = run(
            &mut store,
            &units,
            &[definition()],
            &mut algebraic,
            &OdeConfig::default(),
            None,
            &lookup,
        )
        .unwrap();

        assert!(table.is_none());
        assert!(algebraic.is_empty());
        assert!(store.is_solved("y"));
    }

    #[test]
    fn builds_table_with_a_side_column_sampled_at_each_point() {
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let mut algebraic = vec![(E::var("dydt"), E::Number(1.0))];
        let mut lookup = HashMap::new();
        // y_doubled := 2*y, re-evaluated at each (t, y) sample.
        lookup.insert("y_doubled".to_string(), E::binary(Op::Mul, E::Number(2.0), E::var("y")));

        let directive = IntegralTableDirective {
            independent: "t".to_string(),
            step: Some(0.5),
            columns: vec!["y".to_string(), "y_doubled".to_string()],
        };

        let table = run(
            &mut store,
            &units,
            &[definition()],
            &mut algebraic,
            &OdeConfig::default(),
            Some(&directive),
            &lookup,
        )
        .unwrap()
        .expect("table requested");

        assert_eq!(table.columns, vec!["t".to_string(), "y".to_string(), "y_doubled".to_string()]);
        let y_col = &table.data[1];
        let doubled_col = &table.data[2];
        for (y, doubled) in y_col.iter().zip(doubled_col) {
            assert!((doubled - 2.0 * y).abs() < 1e-9);
        }
    }

    #[test]
    fn malformed_integral_argument_is_reported() {
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let mut algebraic = Vec::new();
        let bad = IntegralDefinition {
            y: "y".to_string(),
            args: vec![E::Number(1.0), E::var("t"), E::Number(0.0), E::Number(1.0)],
        };
        let result = run(&mut store, &units, &[bad], &mut algebraic, &OdeConfig::default(), None, &HashMap::new());
        assert!(matches!(result, Err(OrchestratorError::MalformedIntegral { .. })));
    }
}
