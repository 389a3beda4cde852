//! Diagnostic events the orchestrator emits per phase, following the same
//! injected-`Observer`-sink pattern `lse-solve` uses instead of a logging
//! crate.

/// A diagnostic emitted while running a program through the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    /// A phase (`"partition"`, `"ordering"`, `"ode"`, ...) started.
    PhaseEntered(&'static str),
    /// A `$`-directive line didn't match a known directive keyword.
    DirectiveIgnored(String),
    /// A candidate assignment's right-hand side never became fully known
    /// during Phase C's fixed-point pass, so it was demoted to the
    /// algebraic equation list.
    DemotedToAlgebraic(String),
    /// Phase E found a materially different re-assignment of an already
    /// `Explicit` name.
    RedefinitionConflict { name: String, existing: f64, new: f64 },
    /// Evaluating an expression failed; the target (a variable name, or a
    /// descriptive tag like `"ODE"`) names what was being computed.
    EvaluationFailed { target: String, error: String },
}
