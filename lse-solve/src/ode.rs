//! Couples a Runge-Kutta driver to a per-step algebraic sub-solve that
//! determines the derivative from an implicit state equation.
//!
//! The derivative-isolation ladder in [`isolate_derivative`] tries four
//! increasingly general strategies, from most to least specific:
//! a direct `dydt = ...` equation, `dydt + other = ...`, `coef*dydt + other
//! = ...`, and finally a nested call into [`crate::algebraic`] with `dydt`
//! forced as the single unknown. The nested solve runs with its own small
//! iteration/tolerance budget (50 iterations, `1e-4`) to keep per-step cost
//! bounded; this fallback is inherently degenerate when the coefficient
//! itself depends on `dydt`.

use std::collections::HashMap;

use thiserror::Error;

use lse_core::{BinaryOperator, EvalError, Evaluator, Expression, Provenance, UnitConverter, VariableStore};

use crate::algebraic;
use crate::observer::Observer;

/// Errors raised while integrating an ODE.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Ladder step (c) isolated a zero coefficient for `dydt`.
    #[error("division by zero isolating the derivative")]
    DivisionByZero,
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// The three names the integrator and its per-step solve need: the
/// derivative, the dependent variable, and the independent variable.
#[derive(Debug, Clone, Copy)]
pub struct Names<'a> {
    pub dydt: &'a str,
    pub y: &'a str,
    pub t: &'a str,
}

/// A set of equations that implicitly define `dydt`; lives in the
/// algebraic list until consumed by an `INTEGRAL` definition.
pub type StateEquations = [(Expression, Expression)];

/// Adaptive-step controls, set by the `$IntegralAutoStep` directive.
///
/// Defaults:
/// `min=5, max=2000, reduce=1e-1, increase=1e-3`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub vary: bool,
    pub min_steps: usize,
    pub max_steps: usize,
    pub reduce: f64,
    pub increase: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vary: true,
            min_steps: 5,
            max_steps: 2000,
            reduce: 1e-1,
            increase: 1e-3,
        }
    }
}

impl Config {
    /// # Errors
    ///
    /// Returns a reason string if `min_steps` is zero, `max_steps` is below
    /// `min_steps`, or `reduce`/`increase` are negative or non-finite.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.min_steps == 0 {
            return Err("min_steps must be at least 1");
        }
        if self.max_steps < self.min_steps {
            return Err("max_steps must be >= min_steps");
        }
        if !self.reduce.is_finite() || self.reduce <= 0.0 {
            return Err("reduce must be finite and positive");
        }
        if !self.increase.is_finite() || self.increase < 0.0 {
            return Err("increase must be finite and non-negative");
        }
        Ok(())
    }
}

/// Progress events emitted while integrating.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An adaptive step was accepted.
    Step { t: f64, y: f64, h: f64 },
    /// An adaptive step was rejected and `h` halved for retry.
    StepRejected { t: f64, h: f64, relative_error: f64 },
    /// `max_steps` was reached before `t_hi`; the best-effort result is
    /// still returned.
    StepLimitExceeded { steps_taken: usize },
}

/// The sampled `(t, y)` output of an ODE solve.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl Trajectory {
    /// Linearly interpolates this trajectory onto a uniform grid
    /// `t_lo, t_lo+step, ..., t_hi`. If the last uniform grid point is
    /// further than a small relative epsilon from `t_hi`, `t_hi` is
    /// appended explicitly.
    #[must_use]
    pub fn resample(&self, step: f64) -> Trajectory {
        if step <= 0.0 || self.times.len() < 2 {
            return self.clone();
        }
        let t_lo = self.times[0];
        let t_hi = *self.times.last().expect("checked len >= 2");

        let mut times = Vec::new();
        let mut values = Vec::new();
        let mut t = t_lo;
        while t <= t_hi {
            times.push(t);
            values.push(interpolate(&self.times, &self.values, t));
            t += step;
        }

        let epsilon = step.abs() * 1e-6;
        match times.last() {
            Some(&last) if (t_hi - last).abs() > epsilon => {
                times.push(t_hi);
                values.push(*self.values.last().expect("checked len >= 2"));
            }
            _ => {}
        }

        Trajectory { times, values }
    }
}

fn interpolate(times: &[f64], values: &[f64], t: f64) -> f64 {
    let idx = match times.iter().position(|&probe| probe >= t) {
        Some(0) => return values[0],
        Some(i) => i,
        None => return *values.last().expect("non-empty"),
    };
    let (t0, t1) = (times[idx - 1], times[idx]);
    let (v0, v1) = (values[idx - 1], values[idx]);
    if (t1 - t0).abs() < f64::EPSILON {
        return v1;
    }
    let frac = (t - t0) / (t1 - t0);
    v0 + frac * (v1 - v0)
}

/// The result of [`integrate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub trajectory: Trajectory,
    pub y_final: f64,
    /// True if `max_steps` was reached before `t_hi` in adaptive mode.
    pub step_limit_exceeded: bool,
}

/// Advances `names.y` from `t_lo` to `t_hi` using the implicit derivative
/// defined by `state_equations`.
///
/// `fixed_step` selects the driver: `Some(h)` runs the fixed-step Heun/RK2
/// scheme with step `h`; `None` runs the adaptive RK4-with-Euler-error
/// scheme controlled by `config`. Writes `names.t`/`names.y` to `store` as
/// it goes and records the converged `y(t_hi)` as `Solved` on return.
///
/// # Errors
///
/// Returns [`Error`] if the per-step derivative isolation fails (a zero
/// coefficient in ladder step (c), or an evaluator error in any of the
/// state equations).
pub fn integrate<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    state_equations: &StateEquations,
    names: Names,
    t_lo: f64,
    y_initial: f64,
    t_hi: f64,
    fixed_step: Option<f64>,
    config: &Config,
    observer: &mut impl Observer<Event>,
) -> Result<Outcome, Error> {
    store.set_explicit(names.t, t_lo);
    store.set_explicit(names.y, y_initial);

    if t_hi == t_lo {
        store.set_solved(names.y, y_initial);
        return Ok(Outcome {
            trajectory: Trajectory {
                times: vec![t_lo],
                values: vec![y_initial],
            },
            y_final: y_initial,
            step_limit_exceeded: false,
        });
    }

    let outcome = match fixed_step {
        Some(h_fix) if h_fix > 0.0 => {
            fixed_step_heun(store, units, state_equations, names, t_lo, y_initial, t_hi, h_fix)?
        }
        _ => adaptive_rk4(store, units, state_equations, names, t_lo, y_initial, t_hi, config, observer)?,
    };

    store.set_explicit(names.t, t_hi);
    store.set_solved(names.y, outcome.y_final);

    Ok(outcome)
}

/// `N = max(1, ceil((t_hi - t_lo) / h_fix))` steps of equal width
/// `h = (t_hi - t_lo) / N`, each a Heun/RK2 predictor-corrector step.
#[allow(clippy::too_many_arguments)]
fn fixed_step_heun<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    state_equations: &StateEquations,
    names: Names,
    t_lo: f64,
    y_initial: f64,
    t_hi: f64,
    h_fix: f64,
) -> Result<Outcome, Error> {
    let steps = (((t_hi - t_lo) / h_fix).ceil() as usize).max(1);
    let h = (t_hi - t_lo) / steps as f64;

    let mut t = t_lo;
    let mut y = y_initial;
    let mut times = Vec::with_capacity(steps + 1);
    let mut values = Vec::with_capacity(steps + 1);
    times.push(t);
    values.push(y);

    for _ in 0..steps {
        let k1 = slope(store, units, state_equations, names, t, y)?;
        let y_predictor = y + h * k1;
        let k2 = slope(store, units, state_equations, names, t + h, y_predictor)?;
        y += h * (k1 + k2) / 2.0;
        t += h;
        times.push(t);
        values.push(y);
    }

    Ok(Outcome {
        trajectory: Trajectory { times, values },
        y_final: y,
        step_limit_exceeded: false,
    })
}

/// Adaptive RK4 with an embedded Euler estimate for step-size control.
///
/// Initial `h = (t_hi - t_lo) / min_steps`; halved when the relative error
/// exceeds `reduce` and `h` is still above the `max_steps` floor, grown by
/// `1.5x` when the relative error is below `increase` and `h` is still
/// below the `min_steps` ceiling. Assumes `t_hi > t_lo` (the `t_lo == t_hi`
/// case is handled by the caller before this is reached).
#[allow(clippy::too_many_arguments)]
fn adaptive_rk4<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    state_equations: &StateEquations,
    names: Names,
    t_lo: f64,
    y_initial: f64,
    t_hi: f64,
    config: &Config,
    observer: &mut impl Observer<Event>,
) -> Result<Outcome, Error> {
    let span = t_hi - t_lo;
    let mut h = span / config.min_steps as f64;
    let min_h = span / config.max_steps as f64;
    let max_h = span / config.min_steps as f64;

    let mut t = t_lo;
    let mut y = y_initial;
    let mut times = vec![t];
    let mut values = vec![y];
    let mut steps_taken = 0usize;
    let mut step_limit_exceeded = false;
    let mut took_a_step = false;

    while t < t_hi {
        if steps_taken >= config.max_steps {
            step_limit_exceeded = true;
            observer.observe(&Event::StepLimitExceeded { steps_taken });
            break;
        }
        if t + h > t_hi {
            h = t_hi - t;
        }

        let k1 = slope(store, units, state_equations, names, t, y)?;
        let k2 = slope(store, units, state_equations, names, t + h / 2.0, y + h * k1 / 2.0)?;
        let k3 = slope(store, units, state_equations, names, t + h / 2.0, y + h * k2 / 2.0)?;
        let k4 = slope(store, units, state_equations, names, t + h, y + h * k3)?;
        let y_rk4 = y + h * (k1 + 2.0 * k2 + 2.0 * k3 + k4) / 6.0;
        let y_low = y + h * k1;
        let e_rel = (y_rk4 - y_low).abs() / y_rk4.abs().max(1e-9);

        if config.vary && e_rel > config.reduce && h.abs() > min_h.abs() && took_a_step {
            h /= 2.0;
            observer.observe(&Event::StepRejected { t, h, relative_error: e_rel });
            continue;
        }

        t += h;
        y = y_rk4;
        times.push(t);
        values.push(y);
        steps_taken += 1;
        took_a_step = true;
        observer.observe(&Event::Step { t, y, h });

        if config.vary && e_rel < config.increase && h.abs() < max_h.abs() {
            h *= 1.5;
        }
    }

    if *times.last().expect("at least t_lo pushed") < t_hi {
        times.push(t_hi);
        values.push(y);
    }

    Ok(Outcome {
        trajectory: Trajectory { times, values },
        y_final: y,
        step_limit_exceeded,
    })
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

/// Writes `t'`/`y'` to the store, isolates `dydt` from `state_equations`,
/// then restores `t`/`y` to their pre-call values.
///
/// This does *not* use [`VariableStore::snapshot`]/`restore`: that
/// mechanism supports exactly one active recording, and ladder step (d)
/// may itself open one for a nested algebraic solve. A plain
/// read-before/write-after backup composes safely instead.
fn slope<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    state_equations: &StateEquations,
    names: Names,
    t_prime: f64,
    y_prime: f64,
) -> Result<f64, Error> {
    let t_backup = backup(store, names.t);
    let y_backup = backup(store, names.y);

    store.set_explicit(names.t, t_prime);
    store.set_explicit(names.y, y_prime);

    let result = isolate_derivative(store, units, state_equations, names.dydt);

    restore(store, names.t, t_backup);
    restore(store, names.y, y_backup);

    result
}

/// Tries, in order: (a) `dydt = rhs`, (b) `dydt + other = rhs`, (c)
/// `coef*dydt + other = rhs`, (d) a nested algebraic solve forcing `dydt`
/// as the sole unknown.
fn isolate_derivative<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    state_equations: &StateEquations,
    dydt: &str,
) -> Result<f64, Error> {
    for (lhs, rhs) in state_equations {
        if is_variable(lhs, dydt) {
            let mut evaluator = Evaluator::new(store, units, true);
            return Ok(evaluator.evaluate(rhs)?);
        }
    }

    for (lhs, rhs) in state_equations {
        let Expression::BinaryOp { op: BinaryOperator::Add, left, right } = lhs else {
            continue;
        };
        let other = if is_variable(left, dydt) {
            right
        } else if is_variable(right, dydt) {
            left
        } else {
            continue;
        };
        let mut evaluator = Evaluator::new(store, units, true);
        let rhs_value = evaluator.evaluate(rhs)?;
        let other_value = evaluator.evaluate(other)?;
        return Ok(rhs_value - other_value);
    }

    for (lhs, rhs) in state_equations {
        let Expression::BinaryOp { op: BinaryOperator::Add, left, right } = lhs else {
            continue;
        };
        let Some((coef, other)) = mul_coef_of_dydt(left, right, dydt) else {
            continue;
        };
        let mut evaluator = Evaluator::new(store, units, true);
        let rhs_value = evaluator.evaluate(rhs)?;
        let other_value = evaluator.evaluate(other)?;
        let coef_value = evaluator.evaluate(coef)?;
        if coef_value == 0.0 {
            return Err(Error::DivisionByZero);
        }
        return Ok((rhs_value - other_value) / coef_value);
    }

    nested_solve(store, units, state_equations, dydt)
}

fn is_variable(expr: &Expression, name: &str) -> bool {
    matches!(expr, Expression::Variable(n) if n.eq_ignore_ascii_case(name))
}

/// If `left` or `right` is `coef * Variable(dydt)` (in either operand
/// order), returns `(coef, the other addend)`.
fn mul_coef_of_dydt<'e>(
    left: &'e Expression,
    right: &'e Expression,
    dydt: &str,
) -> Option<(&'e Expression, &'e Expression)> {
    if let Expression::BinaryOp { op: BinaryOperator::Mul, left: a, right: b } = left {
        if is_variable(b, dydt) {
            return Some((a, right));
        }
        if is_variable(a, dydt) {
            return Some((b, right));
        }
    }
    if let Expression::BinaryOp { op: BinaryOperator::Mul, left: a, right: b } = right {
        if is_variable(b, dydt) {
            return Some((a, left));
        }
        if is_variable(a, dydt) {
            return Some((b, left));
        }
    }
    None
}

/// Ladder step (d): `dydt` is the sole forced unknown of a small,
/// tightly-budgeted algebraic solve (50 iterations, tolerance `1e-4`).
fn nested_solve<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    state_equations: &StateEquations,
    dydt: &str,
) -> Result<f64, Error> {
    let config = algebraic::Config {
        algorithm: algebraic::Algorithm::NelderMead,
        max_iterations: 50,
        tolerance: 1e-4,
        reporting_tolerance: 1e-4,
    };
    let unknowns = vec![dydt.to_string()];
    let guesses = HashMap::new();
    let solution = algebraic::solve(store, units, state_equations, &unknowns, &config, &guesses, &mut ());
    Ok(solution.x.first().copied().unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lse_core::ast::BinaryOperator as Op;
    use lse_core::units::NullUnitConverter;
    use lse_core::Expression as E;
    use lse_core::VariableStore;

    fn names() -> Names<'static> {
        Names { dydt: "dydt", y: "y", t: "t" }
    }

    #[test]
    fn t_lo_equals_t_hi_returns_single_row() {
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let equations: Vec<(Expression, Expression)> = Vec::new();
        let outcome = integrate(
            &mut store,
            &units,
            &equations,
            names(),
            1.0,
            2.0,
            1.0,
            None,
            &Config::default(),
            &mut (),
        )
        .unwrap();
        assert_eq!(outcome.trajectory.times, vec![1.0]);
        assert_eq!(outcome.trajectory.values, vec![2.0]);
    }

    #[test]
    fn fixed_step_with_oversized_step_still_takes_one_step() {
        // dydt = 1, so y(t) = y0 + t; one oversized step should still land
        // near the exact answer.
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let equations = vec![(E::var("dydt"), E::Number(1.0))];
        let outcome = integrate(
            &mut store,
            &units,
            &equations,
            names(),
            0.0,
            0.0,
            1.0,
            Some(10.0),
            &Config::default(),
            &mut (),
        )
        .unwrap();
        assert_eq!(outcome.trajectory.times.len(), 2);
        assert_relative_eq!(outcome.y_final, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn direct_dydt_equation_matches_analytical_exponential() {
        // dydt = y, y(0) = 1  =>  y(t) = e^t
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let equations = vec![(E::var("dydt"), E::var("y"))];
        let outcome = integrate(
            &mut store,
            &units,
            &equations,
            names(),
            0.0,
            1.0,
            1.0,
            None,
            &Config { min_steps: 50, max_steps: 5000, ..Config::default() },
            &mut (),
        )
        .unwrap();
        assert_relative_eq!(outcome.y_final, std::f64::consts::E, epsilon = 1e-3);
    }

    #[test]
    fn additive_form_isolates_via_ladder_step_b() {
        // dydt + 4*t*y = -2*t, y(0) = 1
        // analytical: y(t) = -0.5 + 1.5 * exp(-2*t^2)
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let lhs = E::binary(Op::Add, E::var("dydt"), E::binary(Op::Mul, E::binary(Op::Mul, E::Number(4.0), E::var("t")), E::var("y")));
        let rhs = E::binary(Op::Mul, E::Number(-2.0), E::var("t"));
        let equations = vec![(lhs, rhs)];

        let config = Config { vary: true, min_steps: 5, max_steps: 2000, reduce: 1e-1, increase: 1e-3 };
        let outcome = integrate(&mut store, &units, &equations, names(), 0.0, 1.0, 2.5, None, &config, &mut ()).unwrap();

        let analytical = -0.5 + 1.5 * (-2.0f64 * 2.5 * 2.5).exp();
        assert_relative_eq!(outcome.y_final, analytical, epsilon = 5e-3);
    }

    #[test]
    fn coefficient_form_isolates_via_ladder_step_c() {
        // 2*dydt + y = 0, y(0) = 2  =>  y(t) = 2*exp(-t/2)
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let lhs = E::binary(Op::Add, E::binary(Op::Mul, E::Number(2.0), E::var("dydt")), E::var("y"));
        let rhs = E::Number(0.0);
        let equations = vec![(lhs, rhs)];

        let outcome = integrate(
            &mut store,
            &units,
            &equations,
            names(),
            0.0,
            2.0,
            2.0,
            None,
            &Config { min_steps: 50, max_steps: 5000, ..Config::default() },
            &mut (),
        )
        .unwrap();
        let analytical = 2.0 * (-1.0f64).exp();
        assert_relative_eq!(outcome.y_final, analytical, epsilon = 1e-3);
    }

    #[test]
    fn zero_coefficient_in_ladder_step_c_is_division_by_zero() {
        let mut store = VariableStore::new();
        store.set_explicit("c", 0.0);
        let units = NullUnitConverter;
        let lhs = E::binary(Op::Add, E::binary(Op::Mul, E::var("c"), E::var("dydt")), E::var("y"));
        let rhs = E::Number(0.0);
        let equations = vec![(lhs, rhs)];

        let result = integrate(&mut store, &units, &equations, names(), 0.0, 1.0, 1.0, None, &Config::default(), &mut ());
        assert_eq!(result, Err(Error::DivisionByZero));
    }

    #[test]
    fn nested_solve_handles_an_equation_with_no_closed_form_isolation() {
        // dydt^2 = 4 (algebraic-only isolation), constant derivative +/-2.
        let mut store = VariableStore::new();
        store.set_guess("dydt", 2.0);
        let units = NullUnitConverter;
        let lhs = E::binary(Op::Pow, E::var("dydt"), E::Number(2.0));
        let rhs = E::Number(4.0);
        let equations = vec![(lhs, rhs)];

        let outcome = integrate(
            &mut store,
            &units,
            &equations,
            names(),
            0.0,
            0.0,
            1.0,
            Some(0.25),
            &Config::default(),
            &mut (),
        )
        .unwrap();
        assert_relative_eq!(outcome.y_final, 2.0, epsilon = 1e-2);
    }

    #[test]
    fn step_limit_exceeded_reports_best_effort_result() {
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let equations = vec![(E::var("dydt"), E::Number(1.0))];
        let config = Config { vary: true, min_steps: 5, max_steps: 2, reduce: 1e-12, increase: 0.0, ..Config::default() };
        let outcome = integrate(&mut store, &units, &equations, names(), 0.0, 0.0, 1.0, None, &config, &mut ()).unwrap();
        assert!(outcome.step_limit_exceeded);
        assert_eq!(*outcome.trajectory.times.last().unwrap(), 1.0);
    }

    #[test]
    fn resample_produces_uniform_grid_ending_at_t_hi() {
        let trajectory = Trajectory {
            times: vec![0.0, 0.37, 1.0],
            values: vec![0.0, 0.37, 1.0],
        };
        let resampled = trajectory.resample(0.25);
        assert_eq!(*resampled.times.first().unwrap(), 0.0);
        assert_eq!(*resampled.times.last().unwrap(), 1.0);
        for window in resampled.times.windows(2).take(resampled.times.len().saturating_sub(2)) {
            assert_relative_eq!(window[1] - window[0], 0.25, epsilon = 1e-9);
        }
    }

    #[test]
    fn integrator_records_final_y_as_solved() {
        let mut store = VariableStore::new();
        let units = NullUnitConverter;
        let equations = vec![(E::var("dydt"), E::Number(1.0))];
        integrate(&mut store, &units, &equations, names(), 0.0, 0.0, 1.0, Some(0.5), &Config::default(), &mut ()).unwrap();
        assert!(store.is_solved("y"));
        assert_relative_eq!(store.get("y").0, 1.0, epsilon = 1e-9);
    }
}
