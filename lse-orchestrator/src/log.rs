//! A convenience [`Observer`] that formats [`OrchestratorEvent`]s as plain
//! text lines to an arbitrary [`std::io::Write`] implementer, for callers
//! that want readable diagnostics without pulling in a logging framework.

use std::io::{self, Write};

use lse_solve::Observer;

use crate::event::OrchestratorEvent;
use crate::format::significant;

/// Writes one line per [`OrchestratorEvent`] to `sink`.
pub struct LineLogger<W> {
    sink: W,
}

impl<W: Write> LineLogger<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.sink, "{line}")
    }
}

impl<W: Write> Observer<OrchestratorEvent> for LineLogger<W> {
    fn observe(&mut self, event: &OrchestratorEvent) {
        let line = match event {
            OrchestratorEvent::PhaseEntered(name) => format!("phase: {name}"),
            OrchestratorEvent::DirectiveIgnored(text) => format!("directive ignored: {text}"),
            OrchestratorEvent::DemotedToAlgebraic(name) => {
                format!("'{name}' demoted to the algebraic solver (unresolved dependency or cycle)")
            }
            OrchestratorEvent::RedefinitionConflict { name, existing, new } => format!(
                "redefinition conflict for '{name}': existing {}, new {}",
                significant(*existing),
                significant(*new)
            ),
            OrchestratorEvent::EvaluationFailed { target, error } => {
                format!("evaluation failed for '{target}': {error}")
            }
        };
        // A write failure to the log sink is not a reason to abort the run
        // it is describing.
        let _ = self.write_line(&line);
    }
}
