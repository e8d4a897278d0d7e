//! Moving-average crossover, simple or exponential.
//!
//! BUY when the short average crosses above the long one on this bar (was
//! <= on the previous bar, now >); SELL on the inverse cross; else HOLD.
//! The exponential flavour reacts faster to the same price path.

use crate::domain::error::{ConfluenceError, InsufficientData};
use crate::domain::indicator::{calculate_ema, calculate_sma, IndicatorSeries};
use crate::domain::ohlcv::{validate_data, Bar};
use crate::domain::signal::Signal;
use crate::domain::strategy::{cross, Strategy, StrategyConfig};

/// Gap between the averages, relative to the long one, that counts as full strength.
const FULL_STRENGTH_GAP: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageKind {
    Simple,
    Exponential,
}

#[derive(Debug, Clone)]
pub struct MovingAverageCrossover {
    id: String,
    kind: AverageKind,
    short_period: usize,
    long_period: usize,
}

impl MovingAverageCrossover {
    pub fn new(
        id: &str,
        kind: AverageKind,
        short_period: usize,
        long_period: usize,
    ) -> Result<Self, ConfluenceError> {
        if short_period == 0 || short_period >= long_period {
            return Err(ConfluenceError::InvalidParameter {
                strategy: id.to_string(),
                param: "short_period".into(),
                reason: format!(
                    "short period {} must be positive and below long period {}",
                    short_period, long_period
                ),
            });
        }
        Ok(MovingAverageCrossover {
            id: id.to_string(),
            kind,
            short_period,
            long_period,
        })
    }

    pub fn from_config(config: &StrategyConfig, kind: AverageKind) -> Result<Self, ConfluenceError> {
        let (short_default, long_default) = match kind {
            AverageKind::Simple => (20, 50),
            AverageKind::Exponential => (12, 26),
        };
        Self::new(
            &config.id,
            kind,
            config.period("short_period", short_default)?,
            config.period("long_period", long_default)?,
        )
    }

    fn average(&self, window: &[Bar], period: usize) -> Result<IndicatorSeries, InsufficientData> {
        match self.kind {
            AverageKind::Simple => calculate_sma(window, period),
            AverageKind::Exponential => calculate_ema(window, period),
        }
    }
}

impl Strategy for MovingAverageCrossover {
    fn id(&self) -> &str {
        &self.id
    }

    fn min_bars(&self) -> usize {
        self.long_period + 1
    }

    fn analyze(&self, window: &[Bar]) -> Result<Signal, ConfluenceError> {
        validate_data(window, self.min_bars())?;

        let fast = self.average(window, self.short_period)?;
        let slow = self.average(window, self.long_period)?;
        let missing = || InsufficientData::new(self.id.clone(), window.len(), self.min_bars());
        let (prev_fast, fast_now) = fast.last_two_simple().ok_or_else(missing)?;
        let (prev_slow, slow_now) = slow.last_two_simple().ok_or_else(missing)?;

        let direction = cross(prev_fast, prev_slow, fast_now, slow_now);
        if !direction.is_actionable() {
            return Ok(Signal::hold(&self.id));
        }

        let strength = (slow_now > 0.0)
            .then(|| ((fast_now - slow_now).abs() / slow_now / FULL_STRENGTH_GAP).min(1.0));
        Ok(Signal::new(&self.id, direction, strength))
    }
}
