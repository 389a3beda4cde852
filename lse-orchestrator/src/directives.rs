//! Parses `$IntegralTable` and `$IntegralAutoStep` directive payloads;
//! anything else is reported and ignored -- unrecognized directives are
//! diagnostics, not errors.

use lse_solve::{Observer, OdeConfig};

use crate::event::OrchestratorEvent;

/// The parsed `$IntegralTable` directive, if one was present.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegralTableDirective {
    /// The independent variable column (`t` in `$IntegralTable t, y`).
    pub independent: String,
    /// The optional resampling step (`t:0.01` in `$IntegralTable t:0.01, y`).
    pub step: Option<f64>,
    /// The side columns to project alongside `independent` and the
    /// integrated variable itself.
    pub columns: Vec<String>,
}

/// The directive-derived configuration handed to Phase F.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Directives {
    pub integral_table: Option<IntegralTableDirective>,
    pub auto_step: OdeConfig,
}

/// Parses `directive_texts` (each the unparsed payload of one `$`-line)
/// into [`Directives`], reporting anything unrecognized.
pub fn process(
    directive_texts: &[String],
    observer: &mut impl Observer<OrchestratorEvent>,
) -> Directives {
    let mut integral_table = None;
    let mut auto_step = OdeConfig::default();

    for text in directive_texts {
        let trimmed = text.trim();
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let keyword = parts.next().unwrap_or("").trim();
        let rest = parts.next().unwrap_or("").trim();

        if keyword.eq_ignore_ascii_case("IntegralTable") {
            integral_table = Some(parse_integral_table(rest));
        } else if keyword.eq_ignore_ascii_case("IntegralAutoStep") {
            auto_step = parse_auto_step(rest, auto_step);
        } else {
            observer.observe(&OrchestratorEvent::DirectiveIgnored(text.clone()));
        }
    }

    Directives { integral_table, auto_step }
}

fn parse_integral_table(rest: &str) -> IntegralTableDirective {
    let mut fields = rest.split(',').map(str::trim);
    let first = fields.next().unwrap_or_default();

    let (independent, step) = match first.split_once(':') {
        Some((name, step_text)) => (name.trim().to_string(), step_text.trim().parse::<f64>().ok()),
        None => (first.to_string(), None),
    };

    let columns = fields.filter(|s| !s.is_empty()).map(str::to_string).collect();
    IntegralTableDirective { independent, step, columns }
}

fn parse_auto_step(rest: &str, mut config: OdeConfig) -> OdeConfig {
    for token in rest.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "vary" => config.vary = value != "0" && !value.eq_ignore_ascii_case("false"),
            "min" => {
                if let Ok(v) = value.parse() {
                    config.min_steps = v;
                }
            }
            "max" => {
                if let Ok(v) = value.parse() {
                    config.max_steps = v;
                }
            }
            "reduce" => {
                if let Ok(v) = value.parse() {
                    config.reduce = v;
                }
            }
            "increase" => {
                if let Ok(v) = value.parse() {
                    config.increase = v;
                }
            }
            _ => {}
        }
    }
    config
}
