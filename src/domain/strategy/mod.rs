//! Strategy contract and configuration.
//!
//! A strategy is a pure mapping from a rolling window of bars to a `Signal`.
//! Implementations hold only their immutable parameters; all state lives in
//! the window the engine passes in. Concrete strategies are built from a
//! `StrategyConfig` through the registry in [`registry`].

pub mod bollinger_reversion;
pub mod ma_crossover;
pub mod registry;
pub mod rsi_reversion;

pub use bollinger_reversion::BollingerReversion;
pub use ma_crossover::{AverageKind, MovingAverageCrossover};
pub use registry::{build_enabled, build_strategy, STRATEGY_NAMES};
pub use rsi_reversion::RsiReversion;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::ConfluenceError;
use super::ohlcv::Bar;
use super::signal::{Direction, Signal};

pub trait Strategy: Send + Sync {
    /// Stable identifier used for aggregation weights and trade tagging.
    fn id(&self) -> &str;

    /// Bars needed before `analyze` can produce anything but warm-up.
    fn min_bars(&self) -> usize;

    fn analyze(&self, window: &[Bar]) -> Result<Signal, ConfluenceError>;
}

/// Parameters for one strategy instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Instance label; defaults to `name`.
    pub id: String,
    /// Registry key (`ma_crossover`, `ema_crossover`, `rsi`, `bollinger`).
    pub name: String,
    pub params: BTreeMap<String, f64>,
    pub enabled: bool,
    pub weight: f64,
}

impl StrategyConfig {
    pub fn new(name: &str) -> Self {
        StrategyConfig {
            id: name.to_string(),
            name: name.to_string(),
            params: BTreeMap::new(),
            enabled: true,
            weight: 1.0,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }

    /// A whole, positive period parameter.
    pub fn period(&self, key: &str, default: usize) -> Result<usize, ConfluenceError> {
        let raw = self.param(key, default as f64);
        if !raw.is_finite() || raw < 1.0 || raw.fract() != 0.0 {
            return Err(self.invalid(key, format!("{raw} is not a positive whole number")));
        }
        Ok(raw as usize)
    }

    pub(crate) fn invalid(&self, key: &str, reason: String) -> ConfluenceError {
        ConfluenceError::InvalidParameter {
            strategy: self.id.clone(),
            param: key.to_string(),
            reason,
        }
    }
}

/// Cross detection shared by the crossover strategies: BUY when `fast` was
/// at or below `slow` and is now above it, SELL on the mirror image.
pub(crate) fn cross(prev_fast: f64, prev_slow: f64, fast: f64, slow: f64) -> Direction {
    if prev_fast <= prev_slow && fast > slow {
        Direction::Buy
    } else if prev_fast >= prev_slow && fast < slow {
        Direction::Sell
    } else {
        Direction::Hold
    }
}
