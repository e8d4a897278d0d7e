//! RSI mean reversion.
//!
//! BUY when RSI climbs back out of the oversold zone (previous <= oversold,
//! current > oversold). SELL when it falls back out of the overbought zone
//! (previous >= overbought, current < overbought).

use crate::domain::error::{ConfluenceError, InsufficientData};
use crate::domain::indicator::calculate_rsi;
use crate::domain::indicator::rsi::DEFAULT_RSI_PERIOD;
use crate::domain::ohlcv::{validate_data, Bar};
use crate::domain::signal::{Direction, Signal};
use crate::domain::strategy::{Strategy, StrategyConfig};

#[derive(Debug, Clone)]
pub struct RsiReversion {
    id: String,
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl RsiReversion {
    pub fn new(id: &str, period: usize, oversold: f64, overbought: f64) -> Result<Self, ConfluenceError> {
        let invalid = |param: &str, reason: String| ConfluenceError::InvalidParameter {
            strategy: id.to_string(),
            param: param.to_string(),
            reason,
        };
        if period == 0 {
            return Err(invalid("period", "period must be positive".into()));
        }
        if !(oversold > 0.0 && oversold < 100.0) {
            return Err(invalid("oversold", format!("{oversold} is outside (0, 100)")));
        }
        if !(overbought > 0.0 && overbought < 100.0) {
            return Err(invalid("overbought", format!("{overbought} is outside (0, 100)")));
        }
        if oversold >= overbought {
            return Err(invalid(
                "oversold",
                format!("oversold {oversold} must be below overbought {overbought}"),
            ));
        }
        Ok(RsiReversion {
            id: id.to_string(),
            period,
            oversold,
            overbought,
        })
    }

    pub fn from_config(config: &StrategyConfig) -> Result<Self, ConfluenceError> {
        Self::new(
            &config.id,
            config.period("period", DEFAULT_RSI_PERIOD)?,
            config.param("oversold", 30.0),
            config.param("overbought", 70.0),
        )
    }
}

impl Strategy for RsiReversion {
    fn id(&self) -> &str {
        &self.id
    }

    fn min_bars(&self) -> usize {
        self.period + 2
    }

    fn analyze(&self, window: &[Bar]) -> Result<Signal, ConfluenceError> {
        validate_data(window, self.min_bars())?;

        let rsi = calculate_rsi(window, self.period)?;
        let (prev, curr) = rsi
            .last_two_simple()
            .ok_or_else(|| InsufficientData::new(self.id.clone(), window.len(), self.min_bars()))?;

        let (direction, threshold) = if prev <= self.oversold && curr > self.oversold {
            (Direction::Buy, self.oversold)
        } else if prev >= self.overbought && curr < self.overbought {
            (Direction::Sell, self.overbought)
        } else {
            return Ok(Signal::hold(&self.id));
        };

        let strength = ((curr - threshold).abs() / threshold).min(1.0);
        Ok(Signal::new(&self.id, direction, Some(strength)))
    }
}
