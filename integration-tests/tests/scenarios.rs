//! End-to-end scenarios: hand-built `.lse` ASTs driven through
//! `lse_orchestrator::run`, covering each branch of its final `Status`.

use approx::assert_relative_eq;

use lse_core::ast::BinaryOperator as Op;
use lse_core::units::NullUnitConverter;
use lse_core::{Expression as E, Program, Statement, VariableStore};
use lse_orchestrator::{run, Status};
use lse_solve::AlgebraicConfig;

fn explicit(var: &str, value: f64) -> Statement {
    Statement::Assignment { var: var.to_string(), expr: E::Number(value) }
}

fn equation(lhs: E, rhs: E) -> Statement {
    Statement::Equation { lhs, rhs }
}

/// A heat exchanger: `Q_dot = m_dot * CP * DeltaT`, `T_hot = T_cold + DeltaT * Eff`.
#[test]
fn heat_exchanger_converges_to_the_expected_temperatures() {
    let program = Program::new(vec![
        explicit("T_cold", 20.0),
        explicit("Eff", 0.85),
        explicit("CP", 4.18),
        explicit("m_dot", 2.0),
        explicit("Q_dot", 200.0),
        equation(
            E::var("Q_dot"),
            E::binary(Op::Mul, E::binary(Op::Mul, E::var("m_dot"), E::var("CP")), E::var("DeltaT")),
        ),
        equation(
            E::var("T_hot"),
            E::binary(Op::Add, E::var("T_cold"), E::binary(Op::Mul, E::var("DeltaT"), E::var("Eff"))),
        ),
    ]);

    let mut store = VariableStore::new();
    let units = NullUnitConverter;
    let result = run(&mut store, &units, &program, &AlgebraicConfig::default(), &mut ());

    assert_eq!(result.status, Status::Converged);
    assert_relative_eq!(store.get("DeltaT").0, 23.9234, epsilon = 1e-3);
    assert_relative_eq!(store.get("T_hot").0, 40.3349, epsilon = 1e-3);
}

/// A pendulum: period, swing height, and peak speed solved simultaneously
/// from the bob's amplitude and length, exercising `SIN`/`COS`/`SQRT`.
#[test]
fn pendulum_system_solves_with_builtin_functions() {
    const PI: f64 = std::f64::consts::PI;
    let program = Program::new(vec![
        explicit("theta_rad", 15.0 * PI / 180.0),
        explicit("L", 1.0),
        explicit("g", 9.81),
        equation(
            E::var("T"),
            E::binary(
                Op::Mul,
                E::binary(Op::Mul, E::Number(2.0), E::Number(PI)),
                E::call("SQRT", vec![E::binary(Op::Div, E::var("L"), E::var("g"))]),
            ),
        ),
        equation(
            E::var("h"),
            E::binary(
                Op::Mul,
                E::var("L"),
                E::binary(Op::Sub, E::Number(1.0), E::call("COS", vec![E::var("theta_rad")])),
            ),
        ),
        equation(
            E::binary(Op::Pow, E::var("v_max"), E::Number(2.0)),
            E::binary(Op::Mul, E::binary(Op::Mul, E::Number(2.0), E::var("g")), E::var("h")),
        ),
    ]);

    let mut store = VariableStore::new();
    let units = NullUnitConverter;
    let result = run(&mut store, &units, &program, &AlgebraicConfig::default(), &mut ());

    assert_eq!(result.status, Status::Converged);
    assert_relative_eq!(store.get("h").0, 0.034074, epsilon = 1e-4);
    assert_relative_eq!(store.get("T").0, 2.00544, epsilon = 1e-3);
    assert_relative_eq!(store.get("v_max").0, 0.817646, epsilon = 1e-3);
}

/// `dy/dt = -2t - 4ty`, `y(0) = 1`, integrated to `t = 2.5`, with a
/// `$IntegralTable` side column carrying the closed-form solution
/// `y = -1/2 + (y0 + 1/2) * exp(-2t^2)` for comparison.
#[test]
fn ode_scenario_matches_the_closed_form_solution_and_builds_a_table() {
    let dydt_rhs = E::binary(
        Op::Sub,
        E::binary(Op::Mul, E::Number(-2.0), E::var("t")),
        E::binary(Op::Mul, E::binary(Op::Mul, E::Number(4.0), E::var("t")), E::var("y")),
    );
    let y_analytical_rhs = E::binary(
        Op::Add,
        E::Number(-0.5),
        E::binary(
            Op::Mul,
            E::Number(1.5),
            E::call("EXP", vec![E::binary(Op::Mul, E::binary(Op::Mul, E::Number(-2.0), E::var("t")), E::var("t"))]),
        ),
    );

    let program = Program::new(vec![
        Statement::Directive("IntegralTable t, y, y_analytical".to_string()),
        explicit("y", 1.0),
        Statement::Assignment { var: "y_analytical".to_string(), expr: y_analytical_rhs },
        equation(E::var("dydt"), dydt_rhs),
        equation(E::var("y"), E::call("INTEGRAL", vec![E::var("dydt"), E::var("t"), E::Number(0.0), E::Number(2.5)])),
    ]);

    let mut store = VariableStore::new();
    let units = NullUnitConverter;
    let result = run(&mut store, &units, &program, &AlgebraicConfig::default(), &mut ());

    assert_eq!(result.status, Status::Consistent);
    assert_relative_eq!(store.get("y").0, -0.5, epsilon = 5e-4);

    let table = result.table.expect("$IntegralTable directive requested a table");
    assert_eq!(table.columns, vec!["t".to_string(), "y".to_string(), "y_analytical".to_string()]);
    assert!(table.row_count() >= 5);

    let y_col = &table.data[1];
    let analytical_col = &table.data[2];
    for (y, analytical) in y_col.iter().zip(analytical_col) {
        assert_relative_eq!(y, analytical, epsilon = 1e-3);
    }
}

/// One equation, two unknowns: the algebraic phase can't pin both down.
#[test]
fn underspecified_system_is_reported_without_a_partial_solve() {
    let program = Program::new(vec![equation(E::binary(Op::Add, E::var("x"), E::var("y")), E::Number(10.0))]);

    let mut store = VariableStore::new();
    let units = NullUnitConverter;
    let result = run(&mut store, &units, &program, &AlgebraicConfig::default(), &mut ());

    assert_eq!(result.status, Status::Underspecified);
}

/// An explicit assignment followed by an equation that disagrees with it
/// by more than the 1e-6 relative threshold: a redefinition conflict.
#[test]
fn conflicting_redefinition_is_an_evaluation_error() {
    let program = Program::new(vec![explicit("a", 1.0), equation(E::var("a"), E::Number(2.0))]);

    let mut store = VariableStore::new();
    let units = NullUnitConverter;
    let result = run(&mut store, &units, &program, &AlgebraicConfig::default(), &mut ());

    assert_eq!(result.status, Status::EvaluationError);
    assert_relative_eq!(store.get("a").0, 1.0);
}

/// Three explicit values checked against a `Pow`-based consistency
/// equation (a Pythagorean triple) that holds exactly.
#[test]
fn pythagorean_consistency_check_is_consistent() {
    let program = Program::new(vec![
        explicit("x", 3.0),
        explicit("y", 4.0),
        explicit("hyp", 5.0),
        equation(
            E::binary(Op::Pow, E::var("hyp"), E::Number(2.0)),
            E::binary(
                Op::Add,
                E::binary(Op::Pow, E::var("x"), E::Number(2.0)),
                E::binary(Op::Pow, E::var("y"), E::Number(2.0)),
            ),
        ),
    ]);

    let mut store = VariableStore::new();
    let units = NullUnitConverter;
    let result = run(&mut store, &units, &program, &AlgebraicConfig::default(), &mut ());

    assert_eq!(result.status, Status::Consistent);
}
