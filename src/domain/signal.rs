//! Strategy signals and the aggregated per-bar decision.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::ConfluenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl Direction {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Direction::Hold)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
            Direction::Hold => write!(f, "HOLD"),
        }
    }
}

impl FromStr for Direction {
    type Err = ConfluenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Direction::Buy),
            "SELL" => Ok(Direction::Sell),
            "HOLD" => Ok(Direction::Hold),
            other => Err(ConfluenceError::InvalidSignal {
                reason: format!("direction '{other}' is not one of BUY, SELL, HOLD"),
            }),
        }
    }
}

/// One strategy's opinion for the current bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_id: String,
    pub direction: Direction,
    pub strength: Option<f64>,
}

impl Signal {
    pub fn hold(strategy_id: &str) -> Self {
        Signal {
            strategy_id: strategy_id.to_string(),
            direction: Direction::Hold,
            strength: None,
        }
    }

    pub fn new(strategy_id: &str, direction: Direction, strength: Option<f64>) -> Self {
        Signal {
            strategy_id: strategy_id.to_string(),
            direction,
            strength: strength.map(|s| s.clamp(0.0, 1.0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CooperationPolicy {
    And,
    #[default]
    Or,
    Weighted,
}

impl fmt::Display for CooperationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CooperationPolicy::And => write!(f, "AND"),
            CooperationPolicy::Or => write!(f, "OR"),
            CooperationPolicy::Weighted => write!(f, "WEIGHTED"),
        }
    }
}

impl FromStr for CooperationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AND" => Ok(CooperationPolicy::And),
            "OR" => Ok(CooperationPolicy::Or),
            "WEIGHTED" => Ok(CooperationPolicy::Weighted),
            other => Err(format!("unknown cooperation policy '{other}' (expected AND, OR or WEIGHTED)")),
        }
    }
}

/// The combined decision for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSignal {
    pub direction: Direction,
    pub contributors: Vec<String>,
    pub policy: CooperationPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parse_round_trip() {
        assert_eq!("buy".parse::<Direction>().unwrap(), Direction::Buy);
        assert_eq!(" SELL ".parse::<Direction>().unwrap(), Direction::Sell);
        assert_eq!(Direction::Hold.to_string(), "HOLD");
    }

    #[test]
    fn direction_outside_set_is_invalid_signal() {
        let err = "SHORT".parse::<Direction>().unwrap_err();
        assert!(matches!(err, ConfluenceError::InvalidSignal { .. }));
    }

    #[test]
    fn only_hold_is_not_actionable() {
        assert!(Direction::Buy.is_actionable());
        assert!(Direction::Sell.is_actionable());
        assert!(!Direction::Hold.is_actionable());
    }

    #[test]
    fn signal_strength_is_clamped() {
        let s = Signal::new("ma", Direction::Buy, Some(3.0));
        assert_eq!(s.strength, Some(1.0));
    }

    #[test]
    fn policy_parse() {
        assert_eq!("weighted".parse::<CooperationPolicy>().unwrap(), CooperationPolicy::Weighted);
        assert!("MAJORITY".parse::<CooperationPolicy>().is_err());
        assert_eq!(CooperationPolicy::default(), CooperationPolicy::Or);
    }

    #[test]
    fn direction_serializes_uppercase() {
        let json = serde_json::to_string(&Direction::Sell).unwrap();
        assert_eq!(json, "\"SELL\"");
    }
}
