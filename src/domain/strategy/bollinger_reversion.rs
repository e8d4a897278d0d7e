//! Bollinger band re-entry.
//!
//! BUY when the close moves back inside from below the lower band, SELL when
//! it moves back inside from above the upper band.

use crate::domain::error::{ConfluenceError, InsufficientData};
use crate::domain::indicator::{calculate_bollinger, IndicatorValue};
use crate::domain::ohlcv::{validate_data, Bar};
use crate::domain::signal::{Direction, Signal};
use crate::domain::strategy::{Strategy, StrategyConfig};

#[derive(Debug, Clone)]
pub struct BollingerReversion {
    id: String,
    period: usize,
    std_dev: f64,
}

impl BollingerReversion {
    pub fn new(id: &str, period: usize, std_dev: f64) -> Result<Self, ConfluenceError> {
        let invalid = |param: &str, reason: String| ConfluenceError::InvalidParameter {
            strategy: id.to_string(),
            param: param.to_string(),
            reason,
        };
        if period == 0 {
            return Err(invalid("period", "period must be positive".into()));
        }
        if !std_dev.is_finite() || std_dev <= 0.0 {
            return Err(invalid("std_dev", format!("{std_dev} must be positive")));
        }
        Ok(BollingerReversion {
            id: id.to_string(),
            period,
            std_dev,
        })
    }

    pub fn from_config(config: &StrategyConfig) -> Result<Self, ConfluenceError> {
        Self::new(
            &config.id,
            config.period("period", 20)?,
            config.param("std_dev", 2.0),
        )
    }
}

fn bands(value: IndicatorValue) -> Option<(f64, f64)> {
    match value {
        IndicatorValue::Bollinger { upper, lower, .. } => Some((upper, lower)),
        IndicatorValue::Simple(_) => None,
    }
}

impl Strategy for BollingerReversion {
    fn id(&self) -> &str {
        &self.id
    }

    fn min_bars(&self) -> usize {
        self.period + 1
    }

    fn analyze(&self, window: &[Bar]) -> Result<Signal, ConfluenceError> {
        validate_data(window, self.min_bars())?;

        let series = calculate_bollinger(window, self.period, self.std_dev)?;
        let missing = || InsufficientData::new(self.id.clone(), window.len(), self.min_bars());
        let (prev, curr) = series.last_two().ok_or_else(missing)?;
        let (prev_upper, prev_lower) = bands(prev).ok_or_else(missing)?;
        let (upper, lower) = bands(curr).ok_or_else(missing)?;

        let n = window.len();
        let prev_close = window[n - 2].close;
        let close = window[n - 1].close;
        let width = upper - lower;

        let (direction, inside) = if prev_close < prev_lower && close >= lower {
            (Direction::Buy, close - lower)
        } else if prev_close > prev_upper && close <= upper {
            (Direction::Sell, upper - close)
        } else {
            return Ok(Signal::hold(&self.id));
        };

        let strength = (width > 0.0).then(|| (inside / width).min(1.0));
        Ok(Signal::new(&self.id, direction, strength))
    }
}
