//! Named collection of windowed series sharing one timestamp axis.

use crate::domain::error::SoltradeError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::series::WindowedSeries;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub const OHLCV_ALIASES: [&str; 6] = ["open", "high", "low", "close", "volume", "typical"];

/// A snapshot of aligned series. Built once per refresh and never mutated;
/// a refresh builds a new table.
#[derive(Debug, Clone, Default)]
pub struct SeriesTable {
    timestamps: Vec<DateTime<Utc>>,
    aliases: Vec<String>,
    series: HashMap<String, WindowedSeries>,
}

impl SeriesTable {
    /// Builds a table from `(alias, samples)` columns aligned to `timestamps`.
    pub fn from_columns<S: Into<String>>(
        timestamps: Vec<DateTime<Utc>>,
        columns: Vec<(S, Vec<f64>)>,
    ) -> Result<Self, SoltradeError> {
        let expected = timestamps.len();
        let mut aliases = Vec::with_capacity(columns.len());
        let mut series = HashMap::with_capacity(columns.len());

        for (alias, samples) in columns {
            let alias = alias.into();
            if samples.len() != expected {
                return Err(SoltradeError::SeriesLengthMismatch {
                    alias,
                    len: samples.len(),
                    expected,
                });
            }
            if series.contains_key(&alias) {
                return Err(SoltradeError::AliasMismatch {
                    reason: format!("alias `{alias}` appears more than once"),
                });
            }
            series.insert(alias.clone(), WindowedSeries::new(samples));
            aliases.push(alias);
        }

        Ok(SeriesTable {
            timestamps,
            aliases,
            series,
        })
    }

    /// Like [`SeriesTable::from_columns`], renaming the columns positionally.
    pub fn from_columns_aliased<S: Into<String>>(
        timestamps: Vec<DateTime<Utc>>,
        columns: Vec<(S, Vec<f64>)>,
        aliases: &[&str],
    ) -> Result<Self, SoltradeError> {
        if aliases.len() != columns.len() {
            return Err(SoltradeError::AliasMismatch {
                reason: format!(
                    "{} aliases given for {} columns",
                    aliases.len(),
                    columns.len()
                ),
            });
        }
        let renamed = aliases
            .iter()
            .zip(columns)
            .map(|(alias, (_, samples))| (alias.to_string(), samples))
            .collect();
        Self::from_columns(timestamps, renamed)
    }

    /// Builds `open`, `high`, `low`, `close`, `volume` and `typical` series from bars.
    /// Bars are expected in chronological order.
    pub fn from_bars(bars: &[OhlcvBar]) -> Self {
        let timestamps = bars.iter().map(|b| b.timestamp).collect();
        let columns: Vec<(&str, Vec<f64>)> = vec![
            ("open", bars.iter().map(|b| b.open).collect()),
            ("high", bars.iter().map(|b| b.high).collect()),
            ("low", bars.iter().map(|b| b.low).collect()),
            ("close", bars.iter().map(|b| b.close).collect()),
            ("volume", bars.iter().map(|b| b.volume).collect()),
            ("typical", bars.iter().map(OhlcvBar::typical_price).collect()),
        ];

        let aliases = columns.iter().map(|(a, _)| a.to_string()).collect();
        let series = columns
            .into_iter()
            .map(|(alias, samples)| (alias.to_string(), WindowedSeries::new(samples)))
            .collect();

        SeriesTable {
            timestamps,
            aliases,
            series,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// Aliases in column order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().map(String::as_str)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.series.contains_key(alias)
    }

    pub fn get(&self, alias: &str) -> Option<&WindowedSeries> {
        self.series.get(alias)
    }

    pub fn series(&self, alias: &str) -> Result<&WindowedSeries, SoltradeError> {
        self.get(alias).ok_or_else(|| SoltradeError::UnknownSeries {
            alias: alias.to_string(),
        })
    }

    /// The most recent observation of `alias` with its timestamp.
    pub fn latest(&self, alias: &str) -> Option<(DateTime<Utc>, f64)> {
        let value = self.get(alias)?.latest()?;
        Some((self.latest_timestamp()?, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn axis(n: i64) -> Vec<DateTime<Utc>> {
        (0..n).map(|i| ts(i * 60)).collect()
    }

    #[test]
    fn from_columns_builds_aligned_series() {
        let table = SeriesTable::from_columns(
            axis(3),
            vec![("close", vec![1.0, 2.0, 3.0]), ("volume", vec![10.0, 20.0, 30.0])],
        )
        .unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.aliases().collect::<Vec<_>>(), vec!["close", "volume"]);
        assert_eq!(table.series("close").unwrap().latest(), Some(3.0));
        assert_eq!(table.latest("volume"), Some((ts(120), 30.0)));
    }

    #[test]
    fn from_columns_rejects_length_mismatch() {
        let err = SeriesTable::from_columns(axis(3), vec![("close", vec![1.0, 2.0])]).unwrap_err();
        assert!(matches!(
            err,
            SoltradeError::SeriesLengthMismatch { len: 2, expected: 3, .. }
        ));
    }

    #[test]
    fn from_columns_rejects_duplicate_alias() {
        let err = SeriesTable::from_columns(
            axis(1),
            vec![("close", vec![1.0]), ("close", vec![2.0])],
        )
        .unwrap_err();
        assert!(matches!(err, SoltradeError::AliasMismatch { .. }));
    }

    #[test]
    fn aliased_columns_are_renamed() {
        let table = SeriesTable::from_columns_aliased(
            axis(2),
            vec![("c", vec![1.0, 2.0]), ("v", vec![5.0, 6.0])],
            &["price", "vol"],
        )
        .unwrap();
        assert!(table.contains("price"));
        assert!(table.contains("vol"));
        assert!(!table.contains("c"));
    }

    #[test]
    fn aliased_columns_require_matching_count() {
        let err = SeriesTable::from_columns_aliased(axis(1), vec![("c", vec![1.0])], &["a", "b"])
            .unwrap_err();
        assert!(matches!(err, SoltradeError::AliasMismatch { .. }));
    }

    #[test]
    fn unknown_series_is_an_error() {
        let table = SeriesTable::default();
        assert!(matches!(
            table.series("close"),
            Err(SoltradeError::UnknownSeries { .. })
        ));
        assert_eq!(table.latest("close"), None);
    }

    #[test]
    fn from_bars_produces_ohlcv_aliases() {
        let bars: Vec<OhlcvBar> = (0..4)
            .map(|i| OhlcvBar {
                timestamp: ts(i * 3600),
                open: 10.0 + i as f64,
                high: 12.0 + i as f64,
                low: 9.0 + i as f64,
                close: 11.0 + i as f64,
                volume: 100.0,
            })
            .collect();

        let table = SeriesTable::from_bars(&bars);
        assert_eq!(table.aliases().collect::<Vec<_>>(), OHLCV_ALIASES.to_vec());
        for alias in OHLCV_ALIASES {
            assert_eq!(table.series(alias).unwrap().len(), 4);
        }
        assert_eq!(table.series("close").unwrap().latest(), Some(14.0));
        assert_eq!(table.latest_timestamp(), Some(ts(3 * 3600)));
    }
}
