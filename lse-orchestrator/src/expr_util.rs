//! Small `Expression`-walking helpers shared by several phases.

use lse_core::Expression;

/// The variable names an expression references, with duplicates kept
/// (callers that need a set dedupe themselves).
pub fn collect_variables(expr: &Expression, out: &mut Vec<String>) {
    match expr {
        Expression::Variable(name) => out.push(name.clone()),
        Expression::Number(_) | Expression::StringLiteral(_) => {}
        Expression::BinaryOp { left, right, .. } => {
            collect_variables(left, out);
            collect_variables(right, out);
        }
        Expression::FunctionCall { args, .. } => {
            for arg in args {
                collect_variables(arg, out);
            }
        }
    }
}

/// True if `expr` references `name` anywhere, matched case-insensitively.
pub fn mentions(expr: &Expression, name: &str) -> bool {
    let mut names = Vec::new();
    collect_variables(expr, &mut names);
    names.iter().any(|n| n.eq_ignore_ascii_case(name))
}

/// `Some(name)` if `expr` is a bare variable reference.
pub fn as_variable_name(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Variable(name) => Some(name.clone()),
        _ => None,
    }
}
