//! Forwards engine diagnostics to `tracing`.

use crate::domain::diagnostic::Diagnostic;
use crate::ports::diagnostic_port::DiagnosticPort;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticPort for TracingDiagnostics {
    fn emit(&self, diagnostic: &Diagnostic) {
        let token = diagnostic.token();
        match diagnostic {
            Diagnostic::Armed {
                trail_pct,
                exit_price,
                current_price,
                ..
            } => info!(
                token,
                trail_pct, exit_price, current_price, "trailing take profit armed"
            ),
            Diagnostic::Ratcheted {
                kind,
                trail_pct,
                exit_price,
                current_price,
                ..
            } => info!(
                token,
                kind = %kind,
                trail_pct,
                exit_price,
                current_price,
                "trailing exit moved"
            ),
            Diagnostic::Triggered {
                kind,
                index,
                exit_price,
                current_price,
                ..
            } => info!(
                token,
                kind = %kind,
                index,
                exit_price = ?exit_price,
                current_price,
                "exit condition triggered"
            ),
            Diagnostic::Rescaled { kind, factor, .. } => {
                info!(token, kind = %kind, factor, "exit fractions rescaled")
            }
            Diagnostic::Stale { .. } => warn!(token, "{diagnostic}"),
        }
    }
}
