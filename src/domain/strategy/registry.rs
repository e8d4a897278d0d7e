//! Builds strategy instances from their configuration.

use std::collections::HashSet;

use crate::domain::error::ConfluenceError;
use crate::domain::strategy::{
    AverageKind, BollingerReversion, MovingAverageCrossover, RsiReversion, Strategy, StrategyConfig,
};

/// Registry keys accepted in `StrategyConfig.name`.
pub const STRATEGY_NAMES: [&str; 4] = ["ma_crossover", "ema_crossover", "rsi", "bollinger"];

pub fn build_strategy(config: &StrategyConfig) -> Result<Box<dyn Strategy>, ConfluenceError> {
    if !config.weight.is_finite() || config.weight < 0.0 {
        return Err(config.invalid("weight", format!("{} must be non-negative", config.weight)));
    }
    let strategy: Box<dyn Strategy> = match config.name.as_str() {
        "ma_crossover" => Box::new(MovingAverageCrossover::from_config(config, AverageKind::Simple)?),
        "ema_crossover" => Box::new(MovingAverageCrossover::from_config(
            config,
            AverageKind::Exponential,
        )?),
        "rsi" => Box::new(RsiReversion::from_config(config)?),
        "bollinger" => Box::new(BollingerReversion::from_config(config)?),
        other => {
            return Err(ConfluenceError::UnknownStrategy {
                name: other.to_string(),
            });
        }
    };
    Ok(strategy)
}

/// Builds every enabled strategy, in configuration order. Instance ids must be unique.
pub fn build_enabled(configs: &[StrategyConfig]) -> Result<Vec<Box<dyn Strategy>>, ConfluenceError> {
    let mut seen = HashSet::new();
    let mut strategies = Vec::new();
    for config in configs.iter().filter(|c| c.enabled) {
        if !seen.insert(config.id.as_str()) {
            return Err(config.invalid("id", format!("duplicate strategy id '{}'", config.id)));
        }
        strategies.push(build_strategy(config)?);
    }
    Ok(strategies)
}
