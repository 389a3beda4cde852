//! Turns each `PLOT` statement's unparsed payload into a structured
//! [`lse_plot::PlotEvent`] against the current integral table.
//!
//! The payload grammar is a comma-separated list of `key=value` settings
//! (`title=`, `xlabel=`, `ylabel=`) and bare column names to plot against
//! the table's independent column — the minimal projection a renderer
//! needs, matching `lse_plot::PlotEvent`'s `{ settings, series }` shape.

use lse_core::IntegralTable;
use lse_plot::{PlotEvent, PlotSettings, Series};

/// Builds one [`PlotEvent`] per `PLOT` statement, in source order. Plot
/// statements are silently skipped if no integral table was produced
/// (there is nothing to project against).
#[must_use]
pub fn run(plot_commands: &[String], table: Option<&IntegralTable>) -> Vec<PlotEvent> {
    let Some(table) = table else {
        return Vec::new();
    };
    plot_commands.iter().map(|text| build_event(text, table)).collect()
}

fn build_event(text: &str, table: &IntegralTable) -> PlotEvent {
    let mut settings = PlotSettings::default();
    let mut series = Vec::new();
    let x_values = table.data.first().cloned().unwrap_or_default();

    for token in text.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if let Some((key, value)) = token.split_once('=') {
            apply_setting(&mut settings, key.trim(), value.trim());
            continue;
        }
        if let Some(index) = table.columns.iter().position(|c| c.eq_ignore_ascii_case(token)) {
            series.push(Series::new(table.columns[index].clone(), x_values.clone(), table.data[index].clone()));
        }
    }

    PlotEvent { settings, series }
}

fn apply_setting(settings: &mut PlotSettings, key: &str, value: &str) {
    match key.to_ascii_lowercase().as_str() {
        "title" => settings.title = value.to_string(),
        "xlabel" | "x_label" => settings.x_label = value.to_string(),
        "ylabel" | "y_label" => settings.y_label = value.to_string(),
        _ => {}
    }
}
