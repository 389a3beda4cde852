//! Sorts a program's statements into the buckets the later phases
//! consume.

use lse_core::{Expression, Program, Statement};

use crate::expr_util::as_variable_name;

/// An `INTEGRAL(dydt, t, lower, upper[, step])` definition, normalized so
/// `y` is always the dependent variable regardless of which side of an
/// `Equation` the call appeared on.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegralDefinition {
    pub y: String,
    pub args: Vec<Expression>,
}

/// The statements of a program, sorted into the buckets Phases B–H act on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partitioned {
    pub directives: Vec<String>,
    pub plots: Vec<String>,
    pub integral_definitions: Vec<IntegralDefinition>,
    /// `:=` assignments, in source order.
    pub explicit_assignments: Vec<(String, Expression)>,
    /// `Variable = rhs` equations: candidates for Phase C's dependency
    /// ordering before falling back to the algebraic solver.
    pub candidate_assignments: Vec<(String, Expression)>,
    /// Equations that are not simple `Variable = rhs` forms, handled
    /// directly by the algebraic phase.
    pub algebraic: Vec<(Expression, Expression)>,
}

/// Sorts `program`'s statements into their phase buckets.
#[must_use]
pub fn partition(program: &Program) -> Partitioned {
    let mut out = Partitioned::default();

    for statement in &program.statements {
        match statement {
            Statement::Directive(text) => out.directives.push(text.clone()),
            Statement::PlotCommand(text) => out.plots.push(text.clone()),
            Statement::Assignment { var, expr } => {
                if let Some(args) = expr.as_call("INTEGRAL") {
                    out.integral_definitions.push(IntegralDefinition {
                        y: var.clone(),
                        args: args.to_vec(),
                    });
                } else {
                    out.explicit_assignments.push((var.clone(), expr.clone()));
                }
            }
            Statement::Equation { lhs, rhs } => partition_equation(lhs, rhs, &mut out),
        }
    }

    out
}

fn partition_equation(lhs: &Expression, rhs: &Expression, out: &mut Partitioned) {
    if let Some(args) = lhs.as_call("INTEGRAL") {
        if let Some(y) = as_variable_name(rhs) {
            out.integral_definitions
                .push(IntegralDefinition { y, args: args.to_vec() });
            return;
        }
    }
    if let Some(args) = rhs.as_call("INTEGRAL") {
        if let Some(y) = as_variable_name(lhs) {
            out.integral_definitions
                .push(IntegralDefinition { y, args: args.to_vec() });
            return;
        }
    }

    if let Expression::Variable(name) = lhs {
        out.candidate_assignments.push((name.clone(), rhs.clone()));
    } else {
        out.algebraic.push((lhs.clone(), rhs.clone()));
    }
}
