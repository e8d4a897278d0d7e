//! CSV file data adapter.
//!
//! Expects a header row `timestamp,open,high,low,close,volume`. Timestamps are
//! either `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or a bare date (taken as
//! midnight).

use crate::domain::error::ConfluenceError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Reads `<base_path>/<symbol>.csv`, or `base_path` itself when it names a file.
pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        if self.base_path.is_file() {
            self.base_path.clone()
        } else {
            self.base_path.join(format!("{}.csv", symbol))
        }
    }
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, ConfluenceError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| ConfluenceError::DataSource {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.deserialize::<CsvRow>().enumerate() {
            let row = result.map_err(|e| ConfluenceError::DataSource {
                reason: format!("{}: row {}: {}", path.display(), line + 1, e),
            })?;
            let timestamp =
                parse_timestamp(&row.timestamp).ok_or_else(|| ConfluenceError::DataSource {
                    reason: format!(
                        "{}: row {}: invalid timestamp '{}'",
                        path.display(),
                        line + 1,
                        row.timestamp
                    ),
                })?;

            bars.push(Bar {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        tracing::debug!(symbol, path = %path.display(), bars = bars.len(), "loaded bars");
        Ok(bars)
    }
}
