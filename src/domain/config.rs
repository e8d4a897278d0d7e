//! Immutable run configuration, built once and passed by reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::execution::ExecutionConfig;
use super::signal::CooperationPolicy;
use super::sizing::SizingConfig;
use super::strategy::StrategyConfig;

/// Where a trailing-stop exit fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitFill {
    /// The close of the bar that hit the stop.
    #[default]
    Close,
    /// The open of the following bar.
    NextOpen,
}

impl FromStr for ExitFill {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "close" => Ok(ExitFill::Close),
            "next_open" => Ok(ExitFill::NextOpen),
            other => Err(format!("unknown exit fill '{other}' (expected close or next_open)")),
        }
    }
}

impl fmt::Display for ExitFill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitFill::Close => write!(f, "close"),
            ExitFill::NextOpen => write!(f, "next_open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Drawdown fraction that latches the circuit breaker.
    pub max_drawdown_limit: f64,
    pub enable_trailing_stop: bool,
    /// Percent units: 5.0 trails by 5%.
    pub trailing_stop_percent: f64,
    /// Track drawdown without ever latching the breaker.
    pub dry_run: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            max_drawdown_limit: 0.20,
            enable_trailing_stop: false,
            trailing_stop_percent: 5.0,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub symbol: String,
    pub initial_capital: f64,
    pub allow_shorting: bool,
    pub exit_fill: ExitFill,
    /// Close any open position at the last bar of a run.
    pub close_at_end: bool,
    /// Minimum rolling-window length kept by the engine.
    pub window_size: usize,
    pub risk: RiskConfig,
    pub sizing: SizingConfig,
    pub execution: ExecutionConfig,
    /// Annual risk-free rate as a fraction, for Sharpe and Sortino.
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            symbol: "ASSET".to_string(),
            initial_capital: 10_000.0,
            allow_shorting: true,
            exit_fill: ExitFill::Close,
            close_at_end: true,
            window_size: 250,
            risk: RiskConfig::default(),
            sizing: SizingConfig::default(),
            execution: ExecutionConfig::default(),
            risk_free_rate: 0.0,
            periods_per_year: 252.0,
        }
    }
}

/// A named combination of strategies and the policy that joins them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySet {
    pub name: String,
    pub strategies: Vec<StrategyConfig>,
    pub policy: CooperationPolicy,
    /// WEIGHTED only; `None` is half the total weight.
    pub weighted_threshold: Option<f64>,
}

impl StrategySet {
    pub fn new(name: &str, strategies: Vec<StrategyConfig>, policy: CooperationPolicy) -> Self {
        StrategySet {
            name: name.to_string(),
            strategies,
            policy,
            weighted_threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.weighted_threshold = Some(threshold);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Candidates with fewer closed trades are left out of the ranking.
    pub min_trades_for_ranking: usize,
    pub parallel: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            min_trades_for_ranking: 10,
            parallel: true,
        }
    }
}
