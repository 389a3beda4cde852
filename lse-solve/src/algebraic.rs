//! The algebraic solver: derivative-free nonlinear least squares over a
//! residual vector, with stateful backup/restore of variable values
//! across trial evaluations.
//!
//! Nelder-Mead is the required default; Levenberg-Marquardt is attempted
//! when selected and falls back to Nelder-Mead (with a logged warning) if
//! its normal-equation solve can't be carried to convergence.

use std::collections::HashMap;

use lse_core::{Evaluator, Expression, UnitConverter, VariableStore};

use crate::linalg;
use crate::observer::Observer;

/// Which optimization algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    NelderMead,
    LevenbergMarquardt,
}

/// Tunables for [`solve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub algorithm: Algorithm,
    pub max_iterations: usize,
    /// Nelder-Mead termination tolerance (simplex size / best objective).
    pub tolerance: f64,
    /// Residual-norm threshold below which a solve is reported `Converged`.
    pub reporting_tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::NelderMead,
            max_iterations: 1000,
            tolerance: 1e-6,
            reporting_tolerance: 1e-2,
        }
    }
}

impl Config {
    /// Validates that every numeric tunable is finite and non-negative.
    ///
    /// # Errors
    ///
    /// Returns a reason string if a tunable is negative or non-finite.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err("tolerance must be finite and non-negative");
        }
        if !self.reporting_tolerance.is_finite() || self.reporting_tolerance < 0.0 {
            return Err("reporting_tolerance must be finite and non-negative");
        }
        Ok(())
    }
}

/// Whether a solve converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Converged,
    NotConverged,
}

/// The result of [`solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: Status,
    /// The unknown values, in the same (sorted) order the solver used.
    pub x: Vec<f64>,
    /// `||r(x)||` at the reported point.
    pub residual_norm: f64,
    pub iterations: usize,
}

/// Progress events emitted during a solve.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Emitted roughly every 10 iterations.
    Progress { iteration: usize, best_objective: f64 },
    /// Levenberg-Marquardt could not be carried to convergence; falling
    /// back to Nelder-Mead.
    LevenbergMarquardtFallback { reason: String },
}

/// Finds a variable assignment minimizing the sum of squared residuals of
/// `equations` over `unknowns`.
///
/// `initial_guesses` lets the caller override the store's own guess/value
/// for a given unknown (matched case-insensitively); any unknown not
/// present there falls back to the store's guess, then its current value,
/// then `1.0`.
///
/// On convergence, every unknown is written to `store` via
/// [`VariableStore::set_solved`]. On failure, `store` is left exactly as
/// it was on entry (every trial restores its own perturbation).
pub fn solve<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    equations: &[(Expression, Expression)],
    unknowns: &[String],
    config: &Config,
    initial_guesses: &HashMap<String, f64>,
    observer: &mut impl Observer<Event>,
) -> Solution {
    let mut names: Vec<String> = unknowns.to_vec();
    names.sort_by_key(|s| s.to_ascii_lowercase());

    if names.is_empty() {
        return Solution {
            status: Status::Converged,
            x: Vec::new(),
            residual_norm: 0.0,
            iterations: 0,
        };
    }

    let x0: Vec<f64> = names
        .iter()
        .map(|name| initial_value(name, initial_guesses, store))
        .collect();

    let mut objective_fn = |x: &[f64]| -> f64 {
        objective(&residuals_at(store, units, equations, &names, x))
    };

    let (mut x_star, mut iterations) = match config.algorithm {
        Algorithm::NelderMead => {
            let (x, _, iters) = nelder_mead(&x0, config, &mut objective_fn, observer);
            (x, iters)
        }
        Algorithm::LevenbergMarquardt => {
            match levenberg_marquardt(&x0, config, &mut objective_fn) {
                Some((x, iters)) => (x, iters),
                None => {
                    observer.observe(&Event::LevenbergMarquardtFallback {
                        reason: "normal-equation solve did not converge".to_string(),
                    });
                    let (x, _, iters) = nelder_mead(&x0, config, &mut objective_fn, observer);
                    (x, iters)
                }
            }
        }
    };

    let final_residuals = residuals_at(store, units, equations, &names, &x_star);
    let residual_norm = l2_norm(&final_residuals);

    if residual_norm.is_finite() && residual_norm <= config.reporting_tolerance {
        let token = store.snapshot();
        for (name, &value) in names.iter().zip(&x_star) {
            store.set_solved(name, value);
        }
        store.commit(token);
        Solution {
            status: Status::Converged,
            x: x_star,
            residual_norm,
            iterations,
        }
    } else {
        if iterations == 0 {
            iterations = config.max_iterations;
        }
        x_star.shrink_to_fit();
        Solution {
            status: Status::NotConverged,
            x: x_star,
            residual_norm,
            iterations,
        }
    }
}

fn initial_value(
    name: &str,
    initial_guesses: &HashMap<String, f64>,
    store: &mut VariableStore,
) -> f64 {
    if let Some((_, &value)) = initial_guesses
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
    {
        return value;
    }
    if store.has(name) {
        return store.get(name).0;
    }
    store.get_guess(name, 1.0)
}

fn residuals_at<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    equations: &[(Expression, Expression)],
    names: &[String],
    x: &[f64],
) -> Vec<f64> {
    let token = store.snapshot();
    for (name, &value) in names.iter().zip(x) {
        store.set_solved(name, value);
    }

    let mut residuals = Vec::with_capacity(equations.len());
    {
        let mut evaluator = Evaluator::new(store, units, true);
        for (lhs, rhs) in equations {
            match (evaluator.evaluate(lhs), evaluator.evaluate(rhs)) {
                (Ok(l), Ok(r)) => residuals.push(l - r),
                _ => {
                    residuals = vec![f64::NAN; equations.len()];
                    break;
                }
            }
        }
    }
    store.restore(token);
    residuals
}

/// `Σ rᵢ²`, or `f64::MAX` if any residual is `NaN` so the optimizer can
/// reject the point without propagating `NaN` through its own arithmetic.
fn objective(residuals: &[f64]) -> f64 {
    if residuals.iter().any(|r| r.is_nan()) {
        return f64::MAX;
    }
    residuals.iter().map(|r| r * r).sum()
}

fn l2_norm(residuals: &[f64]) -> f64 {
    if residuals.iter().any(|r| r.is_nan()) {
        return f64::NAN;
    }
    residuals.iter().map(|r| r * r).sum::<f64>().sqrt()
}

struct Point {
    x: Vec<f64>,
    f: f64,
}

/// Classical Nelder-Mead simplex minimization.
///
/// Reflection `α = 1.0`, expansion `γ = 2.0`, contraction `ρ = 0.5`,
/// shrink `σ = 0.5`. The initial simplex perturbs each coordinate by 10%
/// (minimum absolute `0.1` when the coordinate is zero). Terminates when
/// either the maximum pairwise vertex distance or the best objective
/// value drops below `config.tolerance`, or `config.max_iterations` is
/// reached.
fn nelder_mead(
    x0: &[f64],
    config: &Config,
    objective_fn: &mut impl FnMut(&[f64]) -> f64,
    observer: &mut impl Observer<Event>,
) -> (Vec<f64>, f64, usize) {
    const ALPHA: f64 = 1.0;
    const GAMMA: f64 = 2.0;
    const RHO: f64 = 0.5;
    const SIGMA: f64 = 0.5;

    let n = x0.len();
    let mut simplex: Vec<Point> = Vec::with_capacity(n + 1);
    simplex.push(Point {
        x: x0.to_vec(),
        f: objective_fn(x0),
    });
    for i in 0..n {
        let mut xi = x0.to_vec();
        let delta = if xi[i] == 0.0 { 0.1 } else { xi[i].abs() * 0.1 };
        xi[i] += delta;
        let f = objective_fn(&xi);
        simplex.push(Point { x: xi, f });
    }

    simplex.sort_by(|a, b| a.f.total_cmp(&b.f));
    if config.max_iterations == 0 {
        return (simplex[0].x.clone(), simplex[0].f, 0);
    }

    let mut iterations = 0;
    for iter in 1..=config.max_iterations {
        iterations = iter;
        simplex.sort_by(|a, b| a.f.total_cmp(&b.f));

        if max_pairwise_distance(&simplex) < config.tolerance || simplex[0].f < config.tolerance {
            break;
        }

        if iter % 10 == 0 {
            observer.observe(&Event::Progress {
                iteration: iter,
                best_objective: simplex[0].f,
            });
        }

        let worst = n;
        let centroid = centroid_excluding(&simplex, worst);

        let reflected_x = step(&centroid, &simplex[worst].x, -ALPHA);
        let reflected_f = objective_fn(&reflected_x);

        if reflected_f < simplex[0].f {
            let expanded_x = step(&centroid, &reflected_x, GAMMA);
            let expanded_f = objective_fn(&expanded_x);
            if expanded_f < reflected_f {
                simplex[worst] = Point { x: expanded_x, f: expanded_f };
            } else {
                simplex[worst] = Point { x: reflected_x, f: reflected_f };
            }
        } else if reflected_f <= simplex[n - 1].f {
            simplex[worst] = Point { x: reflected_x, f: reflected_f };
        } else if reflected_f <= simplex[worst].f {
            // outside contraction
            let contracted_x = step(&centroid, &reflected_x, -RHO);
            let contracted_f = objective_fn(&contracted_x);
            if contracted_f <= reflected_f {
                simplex[worst] = Point { x: contracted_x, f: contracted_f };
            } else {
                shrink(&mut simplex, SIGMA, objective_fn);
            }
        } else {
            // inside contraction
            let contracted_x = step(&centroid, &simplex[worst].x, -RHO);
            let contracted_f = objective_fn(&contracted_x);
            if contracted_f < simplex[worst].f {
                simplex[worst] = Point { x: contracted_x, f: contracted_f };
            } else {
                shrink(&mut simplex, SIGMA, objective_fn);
            }
        }
    }

    simplex.sort_by(|a, b| a.f.total_cmp(&b.f));
    (simplex[0].x.clone(), simplex[0].f, iterations)
}

/// `centroid + factor * (centroid - point)`.
fn step(centroid: &[f64], point: &[f64], factor: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(point)
        .map(|(&c, &p)| c + factor * (c - p))
        .collect()
}

fn centroid_excluding(simplex: &[Point], exclude: usize) -> Vec<f64> {
    let n = simplex[0].x.len();
    let mut centroid = vec![0.0; n];
    let mut count = 0usize;
    for (i, point) in simplex.iter().enumerate() {
        if i == exclude {
            continue;
        }
        for (c, &xi) in centroid.iter_mut().zip(&point.x) {
            *c += xi;
        }
        count += 1;
    }
    for c in &mut centroid {
        *c /= count as f64;
    }
    centroid
}

fn max_pairwise_distance(simplex: &[Point]) -> f64 {
    let mut max_dist = 0.0;
    for i in 0..simplex.len() {
        for j in (i + 1)..simplex.len() {
            let dist: f64 = simplex[i]
                .x
                .iter()
                .zip(&simplex[j].x)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            max_dist = f64::max(max_dist, dist);
        }
    }
    max_dist
}

fn shrink(simplex: &mut [Point], sigma: f64, objective_fn: &mut impl FnMut(&[f64]) -> f64) {
    let best_x = simplex[0].x.clone();
    for point in simplex.iter_mut().skip(1) {
        for (xi, &bi) in point.x.iter_mut().zip(&best_x) {
            *xi = bi + sigma * (*xi - bi);
        }
        point.f = objective_fn(&point.x);
    }
}

/// Gauss-Newton with Levenberg-Marquardt damping and a finite-difference
/// Jacobian. Returns `None` if the damped normal equations become
/// singular, signaling the caller to fall back to Nelder-Mead.
fn levenberg_marquardt(
    x0: &[f64],
    config: &Config,
    objective_fn: &mut impl FnMut(&[f64]) -> f64,
) -> Option<(Vec<f64>, usize)> {
    let n = x0.len();
    let mut x = x0.to_vec();
    let mut lambda = 1e-3;
    let mut current_f = objective_fn(&x);

    for iter in 1..=config.max_iterations.max(1) {
        if current_f < config.tolerance {
            return Some((x, iter));
        }

        let jacobian = finite_difference_jacobian(&x, objective_fn);
        let gradient: Vec<f64> = jacobian.clone();
        let mut hessian_approx = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                hessian_approx[i][j] = gradient[i] * gradient[j];
            }
            hessian_approx[i][i] += lambda * hessian_approx[i][i].max(1e-12);
        }
        let rhs: Vec<f64> = gradient.iter().map(|g| -g * current_f.sqrt().max(1e-12)).collect();

        let delta = match linalg::solve(hessian_approx, rhs) {
            Ok(d) => d,
            Err(_) => {
                lambda *= 10.0;
                if lambda > 1e12 {
                    return None;
                }
                continue;
            }
        };

        let trial_x: Vec<f64> = x.iter().zip(&delta).map(|(xi, di)| xi + di).collect();
        let trial_f = objective_fn(&trial_x);

        if trial_f.is_finite() && trial_f < current_f {
            x = trial_x;
            current_f = trial_f;
            lambda = (lambda / 10.0).max(1e-12);
            if max_abs(&delta) < config.tolerance {
                return Some((x, iter));
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                return None;
            }
        }
    }

    Some((x, config.max_iterations))
}

fn finite_difference_jacobian(x: &[f64], objective_fn: &mut impl FnMut(&[f64]) -> f64) -> Vec<f64> {
    let base = objective_fn(x);
    x.iter()
        .enumerate()
        .map(|(i, &xi)| {
            let h = 1e-6 * xi.abs().max(1.0);
            let mut perturbed = x.to_vec();
            perturbed[i] = xi + h;
            (objective_fn(&perturbed) - base) / h
        })
        .collect()
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, &v| f64::max(acc, v.abs()))
}
