//! Numerical solvers for the LibreSolvE equation-solving core.
//!
//! Splits the data model (`lse-core`) from the algorithms that operate on
//! it: [`algebraic`] is the derivative-free nonlinear least-squares solver,
//! [`ode`] couples a Runge-Kutta driver to a per-step algebraic sub-solve,
//! [`linalg`] is the small dense linear solve Levenberg-Marquardt needs,
//! and [`observer`] is the instrumentation hook both solvers report
//! progress through.

pub mod algebraic;
pub mod linalg;
pub mod observer;
pub mod ode;

pub use algebraic::{
    solve as solve_algebraic, Algorithm, Config as AlgebraicConfig, Event as AlgebraicEvent,
    Solution, Status,
};
pub use observer::Observer;
pub use ode::{
    integrate, Config as OdeConfig, Error as OdeError, Event as OdeEvent, Outcome as OdeOutcome,
    StateEquations, Trajectory,
};
