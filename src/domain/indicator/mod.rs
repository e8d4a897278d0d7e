//! Technical indicators over an ordered window of bars.
//!
//! Every indicator returns an `IndicatorSeries` aligned one-to-one with its
//! input: points inside the warm-up period are flagged `valid = false`. An
//! input shorter than the indicator's lookback is an `InsufficientData`
//! error rather than an all-invalid series.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod rsi;
pub mod sma;

pub use atr::calculate_atr;
pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;

use chrono::NaiveDateTime;
use std::fmt;

use super::error::InsufficientData;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Bollinger { upper: f64, middle: f64, lower: f64 },
}

impl IndicatorValue {
    pub fn as_simple(&self) -> Option<f64> {
        match self {
            IndicatorValue::Simple(v) => Some(*v),
            IndicatorValue::Bollinger { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Bollinger { period: usize, std_dev: f64 },
}

impl IndicatorType {
    /// Bars needed before the first valid point.
    pub fn lookback(&self) -> usize {
        match self {
            IndicatorType::Sma(p) | IndicatorType::Ema(p) | IndicatorType::Atr(p) => *p,
            IndicatorType::Rsi(p) => p + 1,
            IndicatorType::Bollinger { period, .. } => *period,
        }
    }

    /// Fails with `InsufficientData` when `have` bars cannot cover the lookback.
    pub fn require(&self, have: usize) -> Result<(), InsufficientData> {
        let need = self.lookback();
        if need == 0 || have < need {
            return Err(InsufficientData::new(self.to_string(), have, need));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// The most recent valid value.
    pub fn last(&self) -> Option<IndicatorValue> {
        self.values.last().filter(|p| p.valid).map(|p| p.value)
    }

    /// The previous and current values, when both are valid.
    pub fn last_two(&self) -> Option<(IndicatorValue, IndicatorValue)> {
        match self.values.as_slice() {
            [.., prev, curr] if prev.valid && curr.valid => Some((prev.value, curr.value)),
            _ => None,
        }
    }

    /// `last_two` for single-valued indicators.
    pub fn last_two_simple(&self) -> Option<(f64, f64)> {
        let (prev, curr) = self.last_two()?;
        Some((prev.as_simple()?, curr.as_simple()?))
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Bollinger { period, std_dev } => {
                write!(f, "BOLLINGER({},{})", period, std_dev)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display() {
        assert_eq!(IndicatorType::Sma(20).to_string(), "SMA(20)");
        assert_eq!(IndicatorType::Rsi(14).to_string(), "RSI(14)");
        let boll = IndicatorType::Bollinger {
            period: 20,
            std_dev: 2.0,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
        let fine = IndicatorType::Bollinger {
            period: 20,
            std_dev: 2.25,
        };
        assert_eq!(fine.to_string(), "BOLLINGER(20,2.25)");
    }

    #[test]
    fn rsi_lookback_includes_first_change() {
        assert_eq!(IndicatorType::Rsi(14).lookback(), 15);
        assert_eq!(IndicatorType::Ema(12).lookback(), 12);
    }

    #[test]
    fn require_rejects_short_and_zero() {
        assert!(IndicatorType::Sma(5).require(5).is_ok());
        let err = IndicatorType::Sma(5).require(4).unwrap_err();
        assert_eq!((err.have, err.need), (4, 5));
        assert!(IndicatorType::Sma(0).require(100).is_err());
    }

    #[test]
    fn last_two_needs_two_valid_points() {
        let bars = test_support::make_bars(&[1.0, 2.0, 3.0]);
        let series = calculate_sma(&bars, 2).unwrap();
        assert_eq!(series.last_two_simple(), Some((1.5, 2.5)));

        let short = calculate_sma(&bars[..2], 2).unwrap();
        assert_eq!(short.last_two_simple(), None);
        assert_eq!(short.last(), Some(IndicatorValue::Simple(1.5)));
    }
}
