#![allow(dead_code)]

use chrono::{DateTime, Utc};
use soltrade::domain::diagnostic::Diagnostic;
use soltrade::domain::error::SoltradeError;
pub use soltrade::domain::ohlcv::OhlcvBar;
use soltrade::domain::position::{ConfirmedExit, MarketPosition, OpenPosition, UpdateOutcome};
use soltrade::ports::data_port::DataPort;
use soltrade::ports::diagnostic_port::DiagnosticPort;
use std::cell::RefCell;
use std::collections::HashMap;

pub const T0: i64 = 1_700_000_000;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, token: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(token.to_string(), bars);
        self
    }

    pub fn with_error(mut self, token: &str, reason: &str) -> Self {
        self.errors.insert(token.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(&self, token: &str, _interval: &str) -> Result<Vec<OhlcvBar>, SoltradeError> {
        if let Some(reason) = self.errors.get(token) {
            return Err(SoltradeError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(token).cloned().unwrap_or_default())
    }

    fn list_tokens(&self, _interval: &str) -> Result<Vec<String>, SoltradeError> {
        let mut tokens: Vec<String> = self.data.keys().cloned().collect();
        tokens.sort();
        Ok(tokens)
    }
}

/// Collects emitted diagnostics for inspection.
#[derive(Default)]
pub struct RecordingDiagnostics {
    pub seen: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticPort for RecordingDiagnostics {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.seen.borrow_mut().push(diagnostic.clone());
    }
}

pub fn ts(offset_secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(T0 + offset_secs, 0).unwrap()
}

pub fn make_bar(offset_secs: i64, close: f64) -> OhlcvBar {
    OhlcvBar {
        timestamp: ts(offset_secs),
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1000.0,
    }
}

/// One bar per minute with the given closes.
pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(i as i64 * 60, close))
        .collect()
}

pub fn open_position(token: &str, price: f64, size: f64) -> MarketPosition {
    MarketPosition::open(OpenPosition {
        token: token.to_string(),
        txid: format!("{token}-open"),
        entry_price: price,
        entry_size: size,
        timestamp: ts(0),
    })
    .unwrap()
}

/// Accepts every triggered rule with generated transaction ids.
pub fn accept_all(outcome: &UpdateOutcome, tag: &str) -> Vec<ConfirmedExit> {
    outcome
        .triggered
        .iter()
        .enumerate()
        .map(|(i, hit)| ConfirmedExit::new(format!("{tag}-{i}"), *hit))
        .collect()
}

pub fn write_csv(dir: &std::path::Path, token: &str, interval: &str, bars: &[OhlcvBar]) {
    let mut content = String::from("unixtime,open,high,low,close,volume\n");
    for bar in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp.timestamp(),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    std::fs::write(dir.join(format!("{token}_{interval}.csv")), content).unwrap();
}
