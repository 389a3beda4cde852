//! Drives a parsed `.lse` program through its phases: partitioning,
//! directive processing, explicit assignment, dependency-ordered
//! assignment, ODE integration, algebraic solving, and plot emission.
//!
//! Each phase is its own module; [`run`] threads the
//! [`lse_core::VariableStore`] and an [`Observer`] for diagnostics through
//! all of them in order.

pub mod algebraic_phase;
pub mod assignments;
pub mod directives;
pub mod error;
pub mod event;
mod expr_util;
pub mod log;
pub mod ode_phase;
pub mod ordering;
pub mod partition;
pub mod plot_phase;
mod format;

use std::collections::HashMap;

use lse_core::{Expression, IntegralTable, Program, UnitConverter, VariableEntry, VariableReport, VariableStore};
use lse_plot::PlotEvent;
use lse_solve::{AlgebraicConfig, Observer};

pub use error::OrchestratorError;
pub use event::OrchestratorEvent;
pub use format::{significant, table_value};

/// The outcome category of a run.
///
/// `ParseError` is intentionally absent: the core never constructs one,
/// only ever consuming an already-built [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The algebraic solver converged within its reporting tolerance.
    Converged,
    /// No unknowns remained and every equation held within tolerance.
    Consistent,
    /// No unknowns remained but at least one equation did not hold.
    Inconsistent,
    /// The algebraic solver ran out of iterations without converging.
    NotConverged,
    /// More unknowns remained than equations to pin them down.
    Underspecified,
    /// An orchestrator-level error (a redefinition conflict, a malformed
    /// `INTEGRAL` definition, an ODE derivative-isolation failure) ended
    /// the phase that raised it; this status still carries whatever
    /// report and table the earlier phases produced -- a failed algebraic
    /// solve still returns the partial store and integral table.
    EvaluationError,
}

/// Everything [`run`] produces.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub status: Status,
    pub report: VariableReport,
    pub table: Option<IntegralTable>,
    pub plots: Vec<PlotEvent>,
}

/// Runs `program` to completion against `store`, using `units` for any
/// `CONVERT`/`CONVERTTEMP` calls and `algebraic_config` to tune the final
/// algebraic solve. Diagnostics from every phase are reported to
/// `observer` (pass `&mut ()` for none, or a [`log::LineLogger`] for
/// plain-text output).
pub fn run<U: UnitConverter>(
    store: &mut VariableStore,
    units: &U,
    program: &Program,
    algebraic_config: &AlgebraicConfig,
    observer: &mut impl Observer<OrchestratorEvent>,
) -> RunResult {
    observer.observe(&OrchestratorEvent::PhaseEntered("partition"));
    let partitioned = partition::partition(program);

    let assignment_lookup = build_assignment_lookup(&partitioned);

    observer.observe(&OrchestratorEvent::PhaseEntered("directives"));
    let directives = directives::process(&partitioned.directives, observer);

    observer.observe(&OrchestratorEvent::PhaseEntered("explicit_assignments"));
    assignments::execute_explicit(store, units, &partitioned.explicit_assignments, observer);

    observer.observe(&OrchestratorEvent::PhaseEntered("ordering"));
    let mut algebraic = partitioned.algebraic;
    let mut phase_error = None;
    match ordering::resolve(store, units, partitioned.candidate_assignments, observer) {
        Ok(demoted) => algebraic.extend(demoted),
        Err(err) => {
            // Ordered-assignment execution terminates on the first
            // redefinition conflict; later, independent phases still run
            // on whatever the store already holds.
            observer.observe(&OrchestratorEvent::EvaluationFailed {
                target: "ordering".to_string(),
                error: err.to_string(),
            });
            phase_error = Some(err);
        }
    }

    observer.observe(&OrchestratorEvent::PhaseEntered("ode"));
    let table = match ode_phase::run(
        store,
        units,
        &partitioned.integral_definitions,
        &mut algebraic,
        &directives.auto_step,
        directives.integral_table.as_ref(),
        &assignment_lookup,
    ) {
        Ok(table) => table,
        Err(err) => {
            observer.observe(&OrchestratorEvent::EvaluationFailed {
                target: "ODE".to_string(),
                error: err.to_string(),
            });
            phase_error.get_or_insert(err);
            None
        }
    };

    observer.observe(&OrchestratorEvent::PhaseEntered("algebraic"));
    let (algebraic_status, _solution) = match algebraic_phase::run(store, units, &algebraic, algebraic_config) {
        algebraic_phase::Outcome::NoUnknowns { consistent: true } => (Status::Consistent, None),
        algebraic_phase::Outcome::NoUnknowns { consistent: false } => (Status::Inconsistent, None),
        algebraic_phase::Outcome::Underspecified { .. } => (Status::Underspecified, None),
        algebraic_phase::Outcome::Solved(solution) => {
            let status = match solution.status {
                lse_solve::Status::Converged => Status::Converged,
                lse_solve::Status::NotConverged => Status::NotConverged,
            };
            (status, Some(solution))
        }
    };
    // An earlier orchestrator-level error (ordering or ODE) takes
    // precedence over whatever the algebraic phase concluded, since that
    // phase ran over an incomplete equation set.
    let status = if phase_error.is_some() { Status::EvaluationError } else { algebraic_status };

    observer.observe(&OrchestratorEvent::PhaseEntered("plots"));
    let plots = plot_phase::run(&partitioned.plots, table.as_ref());

    let report = build_report(store);

    RunResult { status, report, table, plots }
}

fn build_assignment_lookup(partitioned: &partition::Partitioned) -> HashMap<String, Expression> {
    let mut lookup = HashMap::new();
    for (name, expr) in &partitioned.explicit_assignments {
        lookup.insert(name.to_ascii_lowercase(), expr.clone());
    }
    for (name, expr) in &partitioned.candidate_assignments {
        lookup.insert(name.to_ascii_lowercase(), expr.clone());
    }
    lookup
}

fn build_report(store: &mut VariableStore) -> VariableReport {
    let names: Vec<String> = store.iter_names().map(str::to_string).collect();
    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let (value, _) = store.get(&name);
        let display = store.display_name(&name).unwrap_or(&name).to_string();
        let unit = store.get_unit(&name);
        let provenance = store.provenance(&name).unwrap_or(lse_core::Provenance::Default);
        entries.push(VariableEntry { name: display, value, unit, provenance });
    }
    VariableReport { entries }
}
