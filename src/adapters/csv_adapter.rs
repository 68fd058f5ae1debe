//! CSV file market data adapter.
//!
//! Reads `<token>_<interval>.csv` files with the header
//! `unixtime,open,high,low,close,volume`, timestamps in unix seconds.

use crate::domain::error::SoltradeError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::DateTime;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, token: &str, interval: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", token, interval))
    }
}

fn data_err(reason: String) -> SoltradeError {
    SoltradeError::Data { reason }
}

fn parse_column(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, SoltradeError> {
    let raw = record
        .get(index)
        .ok_or_else(|| data_err(format!("missing {} column", name)))?;
    raw.trim()
        .parse()
        .map_err(|e| data_err(format!("invalid {} value `{}`: {}", name, raw, e)))
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(&self, token: &str, interval: &str) -> Result<Vec<OhlcvBar>, SoltradeError> {
        let path = self.csv_path(token, interval);
        let content = fs::read_to_string(&path)
            .map_err(|e| data_err(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| data_err(format!("CSV parse error: {}", e)))?;

            let raw_ts = record
                .get(0)
                .ok_or_else(|| data_err("missing unixtime column".into()))?;
            let secs: i64 = raw_ts
                .trim()
                .parse()
                .map_err(|e| data_err(format!("invalid unixtime `{}`: {}", raw_ts, e)))?;
            let timestamp = DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| data_err(format!("unixtime {} out of range", secs)))?;

            bars.push(OhlcvBar {
                timestamp,
                open: parse_column(&record, 1, "open")?,
                high: parse_column(&record, 2, "high")?,
                low: parse_column(&record, 3, "low")?,
                close: parse_column(&record, 4, "close")?,
                volume: parse_column(&record, 5, "volume")?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    fn list_tokens(&self, interval: &str) -> Result<Vec<String>, SoltradeError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_err(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let suffix = format!("_{}.csv", interval);
        let mut tokens = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| data_err(format!("directory entry error: {}", e)))?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(token) = name_str.strip_suffix(&suffix) {
                if !token.is_empty() {
                    tokens.push(token.to_string());
                }
            }
        }

        tokens.sort();
        Ok(tokens)
    }
}
