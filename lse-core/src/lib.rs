//! Data model and expression evaluator for the LibreSolvE equation-solving core.
//!
//! This crate is the dependency-free foundation the rest of the workspace
//! builds on: an immutable AST (`ast`), the authoritative variable store
//! (`store`), a pure expression evaluator (`eval`), and the built-in
//! function registry (`functions`).

pub mod ast;
pub mod eval;
pub mod functions;
pub mod report;
pub mod store;
pub mod units;

pub use ast::{BinaryOperator, Expression, Program, Statement};
pub use eval::{EvalError, EvalOutcome, Evaluator};
pub use report::{IntegralTable, VariableEntry, VariableReport};
pub use store::{Provenance, Snapshot, VariableStore};
pub use units::{NullUnitConverter, UnitConverter, UnitError};
