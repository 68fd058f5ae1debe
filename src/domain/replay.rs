//! Replays one price series through a single position.
//!
//! The position opens at the first sample with the configured default exits,
//! every later sample is an `update`, and each triggered rule is confirmed
//! immediately. The replay ends when the position closes or the series runs out.

use crate::domain::diagnostic::Diagnostic;
use crate::domain::error::SoltradeError;
use crate::domain::position::{
    ConfirmedExit, EntryRecord, ExitRecord, MarketPosition, OpenPosition,
};
use crate::domain::series_table::SeriesTable;
use crate::domain::settings::Settings;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub token: String,
    pub entry: EntryRecord,
    pub exits: Vec<ExitRecord>,
    pub diagnostics: Vec<Diagnostic>,
    /// Samples fed to `update`, the opening sample excluded.
    pub ticks: usize,
    pub closed_at: Option<DateTime<Utc>>,
    pub position: MarketPosition,
}

impl ReplayReport {
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

pub fn replay(
    token: &str,
    table: &SeriesTable,
    alias: &str,
    settings: &Settings,
) -> Result<ReplayReport, SoltradeError> {
    let prices = table.series(alias)?.as_slice();
    let timestamps = table.timestamps();
    let (&first_price, &first_ts) = match (prices.first(), timestamps.first()) {
        (Some(p), Some(t)) => (p, t),
        _ => {
            return Err(SoltradeError::Data {
                reason: format!("no `{alias}` samples to replay for {token}"),
            });
        }
    };

    let mut position = MarketPosition::open(OpenPosition {
        token: token.to_string(),
        txid: format!("{}-{token}-entry", settings.strategy_id),
        entry_price: first_price,
        entry_size: settings.entry_size,
        timestamp: first_ts,
    })?;
    position.add_default_exits(&settings.exits)?;
    let entry = position.entries()[0].clone();

    let mut diagnostics = Vec::new();
    let mut ticks = 0;
    let mut closed_at = None;

    for (i, (&price, &ts)) in prices.iter().zip(timestamps).enumerate().skip(1) {
        ticks += 1;
        let outcome = position.update(price)?;
        diagnostics.extend(outcome.diagnostics);
        if outcome.triggered.is_empty() {
            continue;
        }

        let accepted: Vec<ConfirmedExit> = outcome
            .triggered
            .iter()
            .enumerate()
            .map(|(n, hit)| {
                ConfirmedExit::new(format!("{}-{token}-exit-{i}-{n}", settings.strategy_id), *hit)
            })
            .collect();
        let confirmed = position.confirm(&accepted)?;
        diagnostics.extend(confirmed.diagnostics);

        if confirmed.closed {
            closed_at = Some(ts);
            break;
        }
    }

    Ok(ReplayReport {
        token: token.to_string(),
        entry,
        exits: position.exits().to_vec(),
        diagnostics,
        ticks,
        closed_at,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exit_book::ScanPolicy;
    use crate::domain::exit_rule::ExitKind;
    use crate::domain::settings::ExitDefaults;
    use approx::assert_relative_eq;

    fn table(closes: &[f64]) -> SeriesTable {
        let timestamps = (0..closes.len() as i64)
            .map(|i| DateTime::from_timestamp(1_700_000_000 + i * 60, 0).unwrap())
            .collect();
        SeriesTable::from_columns(timestamps, vec![("close", closes.to_vec())]).unwrap()
    }

    fn settings(exits: ExitDefaults) -> Settings {
        Settings {
            strategy_id: "s1".into(),
            entry_size: 10.0,
            exits,
        }
    }

    #[test]
    fn stop_loss_closes_replay() {
        let report = replay(
            "SOL",
            &table(&[100.0, 99.0, 96.0, 94.0, 120.0]),
            "close",
            &settings(ExitDefaults::default()),
        )
        .unwrap();
        assert!(report.is_closed());
        assert_eq!(report.ticks, 3);
        assert_eq!(report.exits.len(), 1);
        assert_eq!(report.exits[0].kind, ExitKind::StopLoss);
        assert_relative_eq!(report.exits[0].quantity_exited, 10.0);
        assert_eq!(report.entry.txid, "s1-SOL-entry");
        assert_eq!(report.closed_at, Some(table(&[0.0; 4]).timestamps()[3]));
    }

    #[test]
    fn partial_exits_leave_position_open() {
        let exits = ExitDefaults {
            take_profit_pct: 0.1,
            take_profit_exit: 0.5,
            stop_loss_pct: 0.5,
            stop_loss_exit: 0.5,
            scan_policy: ScanPolicy::Partial,
            ..ExitDefaults::default()
        };
        let report = replay(
            "SOL",
            &table(&[100.0, 105.0, 112.0, 108.0]),
            "close",
            &settings(exits),
        )
        .unwrap();
        assert!(!report.is_closed());
        assert_eq!(report.ticks, 3);
        assert_eq!(report.exits.len(), 1);
        assert_relative_eq!(report.position.position_size(), 0.5);
        assert_relative_eq!(report.position.outstanding_size(), 5.0);
    }

    #[test]
    fn unknown_alias_is_an_error() {
        let err = replay(
            "SOL",
            &table(&[1.0]),
            "open",
            &settings(ExitDefaults::default()),
        )
        .unwrap_err();
        assert!(matches!(err, SoltradeError::UnknownSeries { .. }));
    }

    #[test]
    fn empty_series_is_a_data_error() {
        let err = replay(
            "SOL",
            &table(&[]),
            "close",
            &settings(ExitDefaults::default()),
        )
        .unwrap_err();
        assert!(matches!(err, SoltradeError::Data { .. }));
    }
}
