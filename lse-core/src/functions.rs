//! The built-in function registry.
//!
//! A small fixed dispatch table rather than a string-keyed map of boxed
//! closures, since the built-in set is closed at compile time -- a
//! separate, user-extensible map can sit in front of this one once
//! user-defined functions are added, but nothing in this crate needs that
//! yet.

use thiserror::Error;

/// How many arguments a built-in accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    #[must_use]
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Self::Exact(k) => n == k,
            Self::Range(lo, hi) => (lo..=hi).contains(&n),
            Self::AtLeast(lo) => n >= lo,
        }
    }
}

/// Errors raised while dispatching or evaluating a built-in function.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FunctionError {
    #[error("unknown function '{0}'")]
    Unknown(String),
    #[error("'{name}' expects {expected:?} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: Arity,
        got: usize,
    },
    #[error("'{name}' is not defined for the given argument(s)")]
    DomainError { name: String },
}

/// Looks up a built-in by name (case-insensitive) and evaluates it.
///
/// # Errors
///
/// Returns [`FunctionError::Unknown`] if no built-in matches `name`,
/// [`FunctionError::ArityMismatch`] if `args` has the wrong length, or
/// [`FunctionError::DomainError`] if the arguments are out of the
/// function's domain (e.g. `LOG` of a non-positive number).
pub fn call(name: &str, args: &[f64]) -> Result<f64, FunctionError> {
    let entry = lookup(name).ok_or_else(|| FunctionError::Unknown(name.to_string()))?;
    if !entry.arity.accepts(args.len()) {
        return Err(FunctionError::ArityMismatch {
            name: name.to_string(),
            expected: entry.arity,
            got: args.len(),
        });
    }
    (entry.eval)(name, args)
}

/// True if `name` names a built-in (case-insensitive). Used by the
/// evaluator to distinguish built-ins from the reserved `INTEGRAL` name
/// and from `CONVERT`/`CONVERTTEMP`, which have structural argument
/// requirements handled outside this registry.
#[must_use]
pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

struct Entry {
    arity: Arity,
    eval: fn(&str, &[f64]) -> Result<f64, FunctionError>,
}

fn domain_err(name: &str) -> FunctionError {
    FunctionError::DomainError {
        name: name.to_string(),
    }
}

fn lookup(name: &str) -> Option<Entry> {
    let table: &[(&str, Entry)] = &[
        ("SIN", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].sin()) }),
        ("COS", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].cos()) }),
        ("TAN", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].tan()) }),
        ("ASIN", Entry { arity: Arity::Exact(1), eval: |n, a| {
            if (-1.0..=1.0).contains(&a[0]) { Ok(a[0].asin()) } else { Err(domain_err(n)) }
        } }),
        ("ACOS", Entry { arity: Arity::Exact(1), eval: |n, a| {
            if (-1.0..=1.0).contains(&a[0]) { Ok(a[0].acos()) } else { Err(domain_err(n)) }
        } }),
        ("ATAN", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].atan()) }),
        ("ATAN2", Entry { arity: Arity::Exact(2), eval: |_, a| Ok(a[0].atan2(a[1])) }),
        ("SINH", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].sinh()) }),
        ("COSH", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].cosh()) }),
        ("TANH", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].tanh()) }),
        ("EXP", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].exp()) }),
        ("LOG", Entry { arity: Arity::Exact(1), eval: |n, a| {
            if a[0] > 0.0 { Ok(a[0].ln()) } else { Err(domain_err(n)) }
        } }),
        ("LN", Entry { arity: Arity::Exact(1), eval: |n, a| {
            if a[0] > 0.0 { Ok(a[0].ln()) } else { Err(domain_err(n)) }
        } }),
        ("LOG10", Entry { arity: Arity::Exact(1), eval: |n, a| {
            if a[0] > 0.0 { Ok(a[0].log10()) } else { Err(domain_err(n)) }
        } }),
        ("SQRT", Entry { arity: Arity::Exact(1), eval: |n, a| {
            if a[0] >= 0.0 { Ok(a[0].sqrt()) } else { Err(domain_err(n)) }
        } }),
        ("POW", Entry { arity: Arity::Exact(2), eval: |_, a| Ok(a[0].powf(a[1])) }),
        ("ABS", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].abs()) }),
        ("CEIL", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].ceil()) }),
        ("FLOOR", Entry { arity: Arity::Exact(1), eval: |_, a| Ok(a[0].floor()) }),
        ("ROUND", Entry { arity: Arity::Range(1, 2), eval: |_, a| {
            if a.len() == 1 {
                Ok(a[0].round())
            } else {
                let factor = 10f64.powf(a[1]);
                Ok((a[0] * factor).round() / factor)
            }
        } }),
        ("MIN", Entry { arity: Arity::AtLeast(2), eval: |_, a| {
            Ok(a.iter().copied().fold(f64::INFINITY, f64::min))
        } }),
        ("MAX", Entry { arity: Arity::AtLeast(2), eval: |_, a| {
            Ok(a.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        } }),
        ("IF", Entry { arity: Arity::Exact(3), eval: |_, a| {
            Ok(if a[0] != 0.0 { a[1] } else { a[2] })
        } }),
    ];

    table
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, e)| Entry { arity: e.arity, eval: e.eval })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn dispatch_is_case_insensitive() {
        assert_relative_eq!(call("sqrt", &[4.0]).unwrap(), 2.0);
        assert_relative_eq!(call("SQRT", &[4.0]).unwrap(), 2.0);
    }

    #[test]
    fn unknown_function_errors() {
        assert!(matches!(call("bogus", &[1.0]), Err(FunctionError::Unknown(_))));
    }

    #[test]
    fn arity_mismatch_errors() {
        assert!(matches!(
            call("sin", &[1.0, 2.0]),
            Err(FunctionError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn min_max_accept_variadic_args() {
        assert_relative_eq!(call("min", &[3.0, 1.0, 2.0]).unwrap(), 1.0);
        assert_relative_eq!(call("max", &[3.0, 1.0, 2.0]).unwrap(), 3.0);
    }

    #[test]
    fn round_accepts_one_or_two_args() {
        assert_relative_eq!(call("round", &[3.456]).unwrap(), 3.0);
        assert_relative_eq!(call("round", &[3.456, 1.0]).unwrap(), 3.5);
    }

    #[test]
    fn if_selects_branch_by_nonzero_condition() {
        assert_relative_eq!(call("if", &[1.0, 10.0, 20.0]).unwrap(), 10.0);
        assert_relative_eq!(call("if", &[0.0, 10.0, 20.0]).unwrap(), 20.0);
    }

    #[test]
    fn domain_errors_on_log_of_nonpositive() {
        assert!(matches!(call("log", &[-1.0]), Err(FunctionError::DomainError { .. })));
    }
}
