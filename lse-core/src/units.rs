//! The contract this crate needs from the (out-of-scope) unit subsystem.
//!
//! The real unit-string parser and the `CONVERT`/`CONVERTTEMP` conversion
//! math live outside this crate entirely; the evaluator only needs
//! something implementing [`UnitConverter`] to dispatch those two
//! built-ins to.

use thiserror::Error;

/// Errors a [`UnitConverter`] implementation can raise.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnitError {
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("units '{from}' and '{to}' are not of the same kind")]
    Incompatible { from: String, to: String },
}

/// Converts between unit strings, injected into the evaluator.
///
/// `CONVERT` and `CONVERTTEMP` are the only two built-ins that call into
/// this trait; every other function is pure arithmetic the evaluator
/// handles itself.
pub trait UnitConverter {
    /// Returns the multiplicative factor that converts a value expressed
    /// in `from` to one expressed in `to`.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError`] if either unit is unknown or the units are not
    /// of the same kind.
    fn factor(&self, from: &str, to: &str) -> Result<f64, UnitError>;

    /// Converts a temperature `value` expressed in `from` into `to`,
    /// applying whatever additive offset the unit kind requires (a plain
    /// multiplicative [`Self::factor`] is not sufficient for temperatures).
    ///
    /// # Errors
    ///
    /// Returns [`UnitError`] if either unit is unknown or not a
    /// temperature unit.
    fn convert_temperature(&self, from: &str, to: &str, value: f64) -> Result<f64, UnitError>;
}

/// A [`UnitConverter`] that knows no units; every call fails.
///
/// This is the crate's zero-dependency default so it compiles and is
/// testable without a real unit database; a production front end supplies
/// its own converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullUnitConverter;

impl UnitConverter for NullUnitConverter {
    fn factor(&self, from: &str, to: &str) -> Result<f64, UnitError> {
        Err(UnitError::Incompatible {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    fn convert_temperature(&self, from: &str, to: &str, _value: f64) -> Result<f64, UnitError> {
        Err(UnitError::Incompatible {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
