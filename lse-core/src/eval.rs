//! A pure (except for auto-vivifying unknown variables) function from
//! `(expression, store)` to a real number.
//!
//! The evaluator mutates the store only the way [`VariableStore::get`]
//! already does; it never hides that behind a mutable flag read off the
//! evaluator object, instead returning an explicit fallback record the
//! caller can inspect.

use thiserror::Error;

use crate::ast::{BinaryOperator, Expression};
use crate::functions::{self, FunctionError};
use crate::store::VariableStore;
use crate::units::{UnitConverter, UnitError};

/// Errors raised while evaluating an expression.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    /// Strict-mode variable access fell back to guess/default.
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error(transparent)]
    Unit(#[from] UnitError),

    /// `INTEGRAL` was encountered during plain expression evaluation; it
    /// must instead be recognized and diverted by the orchestrator.
    #[error("INTEGRAL may only appear as the right-hand side of an assignment or equation")]
    InvalidUse,
}

/// The value and fallback bookkeeping from one tracked evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalOutcome {
    pub value: f64,
    /// True if any variable lookup during this evaluation fell back to a
    /// guess or default value.
    pub fell_back: bool,
    /// How many variable lookups fell back.
    pub fallback_count: u32,
}

/// Evaluates [`Expression`]s against a [`VariableStore`].
///
/// In strict mode (used by the algebraic solver for residual evaluation),
/// a fallback lookup raises [`EvalError::UnknownIdentifier`] instead of
/// returning a default. Non-strict mode (used by the orchestrator for
/// dependency analysis) returns the default/guess and records the
/// fallback instead.
pub struct Evaluator<'a, U> {
    store: &'a mut VariableStore,
    units: &'a U,
    strict: bool,
    fallback_flag: bool,
    fallback_count: u32,
}

impl<'a, U: UnitConverter> Evaluator<'a, U> {
    pub fn new(store: &'a mut VariableStore, units: &'a U, strict: bool) -> Self {
        Self {
            store,
            units,
            strict,
            fallback_flag: false,
            fallback_count: 0,
        }
    }

    /// Resets the fallback flag and count. Callers evaluating several
    /// expressions with the same evaluator should call this before each
    /// evaluation whose fallback status they care about.
    pub fn reset(&mut self) {
        self.fallback_flag = false;
        self.fallback_count = 0;
    }

    #[must_use]
    pub fn fell_back(&self) -> bool {
        self.fallback_flag
    }

    #[must_use]
    pub fn fallback_count(&self) -> u32 {
        self.fallback_count
    }

    /// Resets fallback tracking, evaluates `expr`, and returns the value
    /// bundled with the fallback bookkeeping for that single evaluation.
    ///
    /// # Errors
    ///
    /// See [`Self::evaluate`].
    pub fn evaluate_tracked(&mut self, expr: &Expression) -> Result<EvalOutcome, EvalError> {
        self.reset();
        let value = self.evaluate(expr)?;
        Ok(EvalOutcome {
            value,
            fell_back: self.fell_back(),
            fallback_count: self.fallback_count(),
        })
    }

    /// Evaluates `expr` to a real number.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] on division by zero, strict-mode fallback,
    /// malformed `CONVERT`/`CONVERTTEMP` arguments, unit incompatibility,
    /// unknown/mis-arity/out-of-domain function calls, a bare
    /// `INTEGRAL(...)`, or a string literal used where a number is
    /// expected.
    pub fn evaluate(&mut self, expr: &Expression) -> Result<f64, EvalError> {
        match expr {
            Expression::Number(n) => Ok(*n),
            Expression::StringLiteral(s) => Err(EvalError::TypeMismatch(format!(
                "string literal '{s}' used where a number was expected"
            ))),
            Expression::Variable(name) => {
                let (value, fell_back) = self.store.get(name);
                if fell_back {
                    if self.strict {
                        return Err(EvalError::UnknownIdentifier(name.clone()));
                    }
                    self.fallback_flag = true;
                    self.fallback_count += 1;
                }
                Ok(value)
            }
            Expression::BinaryOp { op, left, right } => self.evaluate_binary(*op, left, right),
            Expression::FunctionCall { name, args } => self.evaluate_call(name, args),
        }
    }

    fn evaluate_binary(
        &mut self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
    ) -> Result<f64, EvalError> {
        let l = self.evaluate(left)?;
        let r = self.evaluate(right)?;
        match op {
            BinaryOperator::Add => Ok(l + r),
            BinaryOperator::Sub => Ok(l - r),
            BinaryOperator::Mul => Ok(l * r),
            BinaryOperator::Div => {
                if r == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(l / r)
                }
            }
            BinaryOperator::Pow => Ok(l.powf(r)),
        }
    }

    fn evaluate_call(&mut self, name: &str, args: &[Expression]) -> Result<f64, EvalError> {
        if name.eq_ignore_ascii_case("INTEGRAL") {
            return Err(EvalError::InvalidUse);
        }
        if name.eq_ignore_ascii_case("CONVERT") {
            return self.evaluate_convert(name, args);
        }
        if name.eq_ignore_ascii_case("CONVERTTEMP") {
            return self.evaluate_convert_temp(name, args);
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate(arg)?);
        }
        functions::call(name, &values).map_err(EvalError::from)
    }

    fn evaluate_convert(&mut self, name: &str, args: &[Expression]) -> Result<f64, EvalError> {
        if args.len() != 2 {
            return Err(EvalError::from(FunctionError::ArityMismatch {
                name: name.to_string(),
                expected: functions::Arity::Exact(2),
                got: args.len(),
            }));
        }
        let from = string_literal(name, &args[0])?;
        let to = string_literal(name, &args[1])?;
        Ok(self.units.factor(from, to)?)
    }

    fn evaluate_convert_temp(
        &mut self,
        name: &str,
        args: &[Expression],
    ) -> Result<f64, EvalError> {
        if args.len() != 3 {
            return Err(EvalError::from(FunctionError::ArityMismatch {
                name: name.to_string(),
                expected: functions::Arity::Exact(3),
                got: args.len(),
            }));
        }
        let from = string_literal(name, &args[0])?;
        let to = string_literal(name, &args[1])?;
        let value = self.evaluate(&args[2])?;
        Ok(self.units.convert_temperature(from, to, value)?)
    }
}

fn string_literal<'e>(fn_name: &str, expr: &'e Expression) -> Result<&'e str, EvalError> {
    match expr {
        Expression::StringLiteral(s) => Ok(s.as_str()),
        _ => Err(EvalError::TypeMismatch(format!(
            "'{fn_name}' requires a string literal argument"
        ))),
    }
}
