//! Output contract types: what a caller gets back after a run, independent
//! of how it was computed. Owned here (rather than in the orchestrator) so
//! a consumer can depend on the shape without depending on the phases that
//! produce it.

use crate::store::Provenance;

/// One resolved variable: its display name, value, optional unit
/// annotation, and the provenance that won per I2.
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct VariableEntry {
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
    pub provenance: Provenance,
}

/// The full set of resolved variables after a run, in store insertion
/// order.
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableReport {
    pub entries: Vec<VariableEntry>,
}

/// A column-oriented table of samples produced by an `INTEGRAL` solve and
/// projected through a `$IntegralTable` directive.
///
/// `columns[i]` names `data[i]`; every column has the same length.
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntegralTable {
    pub columns: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

impl IntegralTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.push(name.into());
        self.data.push(values);
    }

    /// The number of sampled rows, taken from the first column (`0` if the
    /// table has no columns yet).
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }
}
