//! Sink for the diagnostics the position engine returns.

use crate::domain::diagnostic::Diagnostic;

pub trait DiagnosticPort {
    fn emit(&self, diagnostic: &Diagnostic);

    fn emit_all(&self, diagnostics: &[Diagnostic]) {
        for diagnostic in diagnostics {
            self.emit(diagnostic);
        }
    }
}
