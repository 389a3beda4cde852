//! The structured plot-data contract emitted per `PLOT` statement.
//!
//! Rendering (SVG/PNG, a GUI plot widget) is explicitly out of scope here;
//! this crate only carries the data a renderer would need: one
//! `{ settings, series }` event per `PLOT` statement. Subscribers receive
//! one [`PlotEvent`] per `PLOT` statement, emitted synchronously and in
//! source order after the algebraic solve completes.

#[cfg_attr(feature = "serde-derive", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSettings {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub show_grid: bool,
    pub show_legend: bool,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            title: String::new(),
            x_label: String::new(),
            y_label: String::new(),
            show_grid: true,
            show_legend: true,
        }
    }
}

/// One plotted series: a name, an optional color hint, and its `(x, y)`
/// sample arrays (drawn from integral-table columns).
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub name: String,
    pub color: Option<String>,
    pub x_values: Vec<f64>,
    pub y_values: Vec<f64>,
}

impl Series {
    #[must_use]
    pub fn new(name: impl Into<String>, x_values: Vec<f64>, y_values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            color: None,
            x_values,
            y_values,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// The structured payload emitted for one `PLOT` statement.
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlotEvent {
    pub settings: PlotSettings,
    pub series: Vec<Series>,
}
