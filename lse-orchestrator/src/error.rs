//! Errors the orchestrator itself can raise, layered over the ones its
//! dependencies raise.

use thiserror::Error;

use lse_core::EvalError;
use lse_solve::OdeError;

/// Errors raised while running a program through the orchestrator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestratorError {
    /// Fewer equations than unknowns remained for the algebraic phase.
    #[error("underspecified system: {equations} equation(s) for {unknowns} unknown(s)")]
    Underspecified { equations: usize, unknowns: usize },

    /// A name already `Explicit` was assigned a materially different value
    /// by an ordered candidate assignment, and its name doesn't end in
    /// `_check`/`_error` (the convention the ordering phase carves out
    /// for consistency-check probes).
    #[error(
        "'{name}' was redefined: existing {existing}, new {new} (relative difference exceeds 1e-6)"
    )]
    RedefinitionConflict { name: String, existing: f64, new: f64 },

    /// An `INTEGRAL(...)` call's first two arguments weren't bare
    /// variable references, so the derivative/independent-variable names
    /// couldn't be determined.
    #[error("malformed INTEGRAL definition for '{y}': {detail}")]
    MalformedIntegral { y: String, detail: String },

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Ode(#[from] OdeError),
}
