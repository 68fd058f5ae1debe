//! Diagnostics returned by the position engine.
//!
//! The engine does not log. Operations that would warrant a log line return
//! [`Diagnostic`] values alongside their result; the caller forwards them to a
//! [`DiagnosticPort`](crate::ports::diagnostic_port::DiagnosticPort).

use crate::domain::exit_rule::ExitKind;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

/// An exit-condition index that no longer addresses a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no {kind} exit condition at index {index} ({len} active)")]
pub struct StaleReference {
    pub kind: ExitKind,
    pub index: usize,
    pub len: usize,
}

impl StaleReference {
    pub fn into_diagnostic(self, token: &str, operation: &'static str) -> Diagnostic {
        Diagnostic::Stale {
            token: token.to_string(),
            operation,
            reference: self,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    Armed {
        token: String,
        trail_pct: f64,
        exit_price: f64,
        current_price: f64,
    },
    Ratcheted {
        token: String,
        kind: ExitKind,
        trail_pct: f64,
        exit_price: f64,
        current_price: f64,
    },
    Triggered {
        token: String,
        kind: ExitKind,
        index: usize,
        exit_price: Option<f64>,
        current_price: f64,
    },
    Rescaled {
        token: String,
        kind: ExitKind,
        factor: f64,
    },
    Stale {
        token: String,
        operation: &'static str,
        reference: StaleReference,
    },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::Stale { .. } => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Diagnostic::Armed { token, .. }
            | Diagnostic::Ratcheted { token, .. }
            | Diagnostic::Triggered { token, .. }
            | Diagnostic::Rescaled { token, .. }
            | Diagnostic::Stale { token, .. } => token,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Armed {
                token,
                trail_pct,
                exit_price,
                current_price,
            } => write!(
                f,
                "trailing_take_profit ({trail_pct} trail) armed for {token} at current_price {current_price}, exit_price {exit_price}"
            ),
            Diagnostic::Ratcheted {
                token,
                kind,
                trail_pct,
                exit_price,
                current_price,
            } => write!(
                f,
                "{kind} ({trail_pct} trail) for {token} moved to exit_price {exit_price}, current_price {current_price}"
            ),
            Diagnostic::Triggered {
                token,
                kind,
                index,
                exit_price,
                current_price,
            } => match exit_price {
                Some(exit_price) => write!(
                    f,
                    "{kind}[{index}] triggered for {token} at exit_price {exit_price}, current_price {current_price}"
                ),
                None => write!(
                    f,
                    "{kind}[{index}] triggered for {token}, current_price {current_price}"
                ),
            },
            Diagnostic::Rescaled {
                token,
                kind,
                factor,
            } => write!(
                f,
                "remaining {kind} exit fractions for {token} scaled by {factor} after a confirmed exit"
            ),
            Diagnostic::Stale {
                token,
                operation,
                reference,
            } => write!(f, "{operation} on {token}: {reference}; no action taken"),
        }
    }
}
