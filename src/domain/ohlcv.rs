//! OHLCV bar representation and the shared data-validation contract.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::error::{ConfluenceError, InsufficientData};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Checks a single bar: every field finite and non-negative, high >= low.
    pub fn validate(&self) -> Result<(), ConfluenceError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(self.invalid(format!("{name} is not a finite number")));
            }
            if value < 0.0 {
                return Err(self.invalid(format!("{name} is negative ({value})")));
            }
        }
        if self.high < self.low {
            return Err(self.invalid(format!(
                "high ({}) is below low ({})",
                self.high, self.low
            )));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> ConfluenceError {
        ConfluenceError::DataValidation {
            timestamp: self.timestamp,
            reason,
        }
    }
}

/// Validation every strategy runs before analysing a window.
///
/// Malformed bars are fatal (`DataValidation`). A window shorter than
/// `min_rows` is warm-up and comes back as `InsufficientData`.
pub fn validate_data(window: &[Bar], min_rows: usize) -> Result<(), ConfluenceError> {
    for bar in window {
        bar.validate()?;
    }
    if window.len() < min_rows {
        return Err(InsufficientData::new("window", window.len(), min_rows).into());
    }
    Ok(())
}
