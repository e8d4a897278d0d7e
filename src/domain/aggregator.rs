//! Combines per-strategy signals into one decision per bar.

use std::collections::BTreeMap;

use super::error::ConfluenceError;
use super::signal::{AggregatedSignal, CooperationPolicy, Direction, Signal};

#[derive(Debug, Clone)]
pub struct SignalAggregator {
    policy: CooperationPolicy,
    weights: BTreeMap<String, f64>,
    threshold: Option<f64>,
}

impl SignalAggregator {
    /// `strategies` lists every enabled strategy id with its weight.
    /// `threshold` only matters for WEIGHTED; `None` means a simple majority
    /// of the total weight.
    pub fn new(
        policy: CooperationPolicy,
        strategies: impl IntoIterator<Item = (String, f64)>,
        threshold: Option<f64>,
    ) -> Self {
        SignalAggregator {
            policy,
            weights: strategies.into_iter().collect(),
            threshold,
        }
    }

    pub fn policy(&self) -> CooperationPolicy {
        self.policy
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn aggregate(&self, signals: &[Signal]) -> Result<AggregatedSignal, ConfluenceError> {
        self.check(signals)?;

        let direction = match self.policy {
            CooperationPolicy::Or => self.any_side(signals),
            CooperationPolicy::And => self.unanimous(signals),
            CooperationPolicy::Weighted => self.weighted_vote(signals),
        };

        let contributors = if direction.is_actionable() {
            signals
                .iter()
                .filter(|s| s.direction == direction)
                .map(|s| s.strategy_id.clone())
                .collect()
        } else {
            Vec::new()
        };

        Ok(AggregatedSignal {
            direction,
            contributors,
            policy: self.policy,
        })
    }

    fn check(&self, signals: &[Signal]) -> Result<(), ConfluenceError> {
        let mut seen = Vec::with_capacity(signals.len());
        for signal in signals {
            if !self.weights.contains_key(&signal.strategy_id) {
                return Err(ConfluenceError::InvalidSignal {
                    reason: format!("signal from unregistered strategy '{}'", signal.strategy_id),
                });
            }
            if seen.contains(&signal.strategy_id.as_str()) {
                return Err(ConfluenceError::InvalidSignal {
                    reason: format!("duplicate signal from '{}'", signal.strategy_id),
                });
            }
            seen.push(signal.strategy_id.as_str());
            if let Some(strength) = signal.strength {
                if !strength.is_finite() || !(0.0..=1.0).contains(&strength) {
                    return Err(ConfluenceError::InvalidSignal {
                        reason: format!(
                            "strength {} from '{}' is outside [0, 1]",
                            strength, signal.strategy_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    // Conflicting BUY and SELL resolve to HOLD.
    fn any_side(&self, signals: &[Signal]) -> Direction {
        let buy = signals.iter().any(|s| s.direction == Direction::Buy);
        let sell = signals.iter().any(|s| s.direction == Direction::Sell);
        match (buy, sell) {
            (true, false) => Direction::Buy,
            (false, true) => Direction::Sell,
            _ => Direction::Hold,
        }
    }

    fn unanimous(&self, signals: &[Signal]) -> Direction {
        if self.weights.is_empty() || signals.len() != self.weights.len() {
            return Direction::Hold;
        }
        let first = signals[0].direction;
        if first.is_actionable() && signals.iter().all(|s| s.direction == first) {
            first
        } else {
            Direction::Hold
        }
    }

    fn weighted_vote(&self, signals: &[Signal]) -> Direction {
        let mut buy = 0.0;
        let mut sell = 0.0;
        for signal in signals {
            let weight = self.weights[&signal.strategy_id];
            match signal.direction {
                Direction::Buy => buy += weight,
                Direction::Sell => sell += weight,
                Direction::Hold => {}
            }
        }

        let threshold = self.threshold.unwrap_or(self.total_weight() / 2.0);
        match (buy > threshold, sell > threshold) {
            (true, false) => Direction::Buy,
            (false, true) => Direction::Sell,
            (true, true) if buy > sell => Direction::Buy,
            (true, true) if sell > buy => Direction::Sell,
            _ => Direction::Hold,
        }
    }
}
