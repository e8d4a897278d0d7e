//! Position sizing: fixed fraction of capital, or fractional Kelly once
//! enough closed trades exist.
//!
//! ```text
//! b                = avg_win / avg_loss
//! kelly            = win_rate - (1 - win_rate) / b
//! applied_fraction = clamp(kelly * safety_factor, 0, max_position_pct)
//! ```

use serde::{Deserialize, Serialize};

use super::position::Trade;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Fraction of capital per trade in fixed mode.
    pub position_pct: f64,
    pub enable_kelly: bool,
    /// Safety multiplier on the raw Kelly fraction (0.5 = half Kelly).
    pub kelly_fraction: f64,
    /// Upper bound on the applied fraction in both modes.
    pub max_position_pct: f64,
    /// Closed trades Kelly looks back over.
    pub kelly_lookback: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig {
            position_pct: 0.10,
            enable_kelly: false,
            kelly_fraction: 0.5,
            max_position_pct: 0.25,
            kelly_lookback: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    FixedFraction,
    Kelly,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeDecision {
    pub method: SizingMethod,
    pub fraction: f64,
    pub value: f64,
}

impl SizeDecision {
    pub fn is_zero(&self) -> bool {
        self.value <= 0.0
    }
}

/// Win rate and average win/loss over a set of closed trades, on net P&L.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeStats {
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
}

impl TradeStats {
    pub fn from_trades(trades: &[Trade]) -> TradeStats {
        if trades.is_empty() {
            return TradeStats {
                win_rate: 0.0,
                avg_win: 0.0,
                avg_loss: 0.0,
            };
        }
        let wins: Vec<f64> = trades.iter().filter(|t| t.is_win()).map(|t| t.net_pnl).collect();
        let losses: Vec<f64> = trades
            .iter()
            .filter(|t| t.is_loss())
            .map(|t| t.net_pnl.abs())
            .collect();
        let mean = |xs: &[f64]| {
            if xs.is_empty() {
                0.0
            } else {
                xs.iter().sum::<f64>() / xs.len() as f64
            }
        };
        TradeStats {
            win_rate: wins.len() as f64 / trades.len() as f64,
            avg_win: mean(&wins),
            avg_loss: mean(&losses),
        }
    }
}

/// Raw Kelly fraction. Zero when the payoff ratio is zero or undefined;
/// negative for a negative edge.
pub fn kelly_fraction(win_rate: f64, avg_win: f64, avg_loss: f64) -> f64 {
    if !(avg_loss > 0.0) || !avg_win.is_finite() {
        return 0.0;
    }
    let b = avg_win / avg_loss;
    if !(b > 0.0) {
        return 0.0;
    }
    win_rate - (1.0 - win_rate) / b
}

/// `value` clamped to `[0, cap]`, with NaN treated as 0. `cap` must be >= 0.
fn bounded(value: f64, cap: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, cap)
    }
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        PositionSizer { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Applied fraction for the given closed-trade history.
    pub fn fraction(&self, closed_trades: &[Trade]) -> (SizingMethod, f64) {
        // a negative or NaN cap becomes 0
        let cap = self.config.max_position_pct.max(0.0);
        let lookback = self.config.kelly_lookback;
        if !self.config.enable_kelly || lookback == 0 || closed_trades.len() < lookback {
            return (SizingMethod::FixedFraction, bounded(self.config.position_pct, cap));
        }

        let recent = &closed_trades[closed_trades.len() - lookback..];
        let stats = TradeStats::from_trades(recent);
        let raw = kelly_fraction(stats.win_rate, stats.avg_win, stats.avg_loss);
        let applied = bounded(raw * self.config.kelly_fraction, cap);
        tracing::debug!(
            win_rate = stats.win_rate,
            avg_win = stats.avg_win,
            avg_loss = stats.avg_loss,
            raw,
            applied,
            "kelly sizing"
        );
        (SizingMethod::Kelly, applied)
    }

    /// Capital to commit to the next entry.
    pub fn size(&self, capital: f64, closed_trades: &[Trade]) -> SizeDecision {
        let (method, fraction) = self.fraction(closed_trades);
        SizeDecision {
            method,
            fraction,
            value: (capital * fraction).max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::test_support::{position, ts};
    use crate::domain::position::{ExitReason, Side};
    use approx::assert_relative_eq;

    fn trade(net: f64) -> Trade {
        let pos = position(Side::Long, 1.0, 100.0);
        Trade::close(pos, 100.0 + net, ts(2), 1, 0.0, ExitReason::Signal)
    }

    fn kelly_config() -> SizingConfig {
        SizingConfig {
            enable_kelly: true,
            kelly_lookback: 5,
            ..SizingConfig::default()
        }
    }

    #[test]
    fn kelly_reference_values() {
        let raw = kelly_fraction(0.6, 150.0, 100.0);
        assert_relative_eq!(raw, 0.6 - 0.4 / 1.5, epsilon = 1e-12);
        assert_relative_eq!((raw * 0.5).clamp(0.0, 0.25), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn kelly_degenerate_inputs_are_zero() {
        assert_eq!(kelly_fraction(0.5, 100.0, 0.0), 0.0);
        assert_eq!(kelly_fraction(0.5, 0.0, 100.0), 0.0);
        assert_eq!(kelly_fraction(0.5, 100.0, f64::NAN), 0.0);
    }

    #[test]
    fn zero_win_rate_never_sizes() {
        let sizer = PositionSizer::new(kelly_config());
        let history: Vec<Trade> = (0..5).map(|_| trade(-10.0)).collect();
        let decision = sizer.size(10_000.0, &history);
        assert_eq!(decision.method, SizingMethod::Kelly);
        assert_eq!(decision.value, 0.0);
        assert!(decision.is_zero());
    }

    #[test]
    fn fixed_fraction_until_lookback_filled() {
        let sizer = PositionSizer::new(kelly_config());
        let history: Vec<Trade> = (0..4).map(|_| trade(10.0)).collect();
        let decision = sizer.size(10_000.0, &history);
        assert_eq!(decision.method, SizingMethod::FixedFraction);
        assert_relative_eq!(decision.value, 1_000.0, epsilon = 1e-9);
    }

    #[test]
    fn kelly_uses_only_the_lookback_window() {
        let sizer = PositionSizer::new(kelly_config());
        // old losers fall outside the last five trades: 3 wins of 150, 2 losses of 100
        let mut history: Vec<Trade> = (0..10).map(|_| trade(-50.0)).collect();
        history.extend([trade(150.0), trade(-100.0), trade(150.0), trade(-100.0), trade(150.0)]);
        let decision = sizer.size(10_000.0, &history);
        assert_eq!(decision.method, SizingMethod::Kelly);
        assert_relative_eq!(decision.fraction, 1.0 / 6.0, epsilon = 1e-9);
        assert_relative_eq!(decision.value, 10_000.0 / 6.0, epsilon = 1e-6);
    }

    #[test]
    fn negative_or_nan_cap_sizes_to_zero() {
        for cap in [-0.5, f64::NAN] {
            let sizer = PositionSizer::new(SizingConfig {
                max_position_pct: cap,
                ..kelly_config()
            });
            let (method, fraction) = sizer.fraction(&[]);
            assert_eq!(method, SizingMethod::FixedFraction);
            assert_eq!(fraction, 0.0);

            let history: Vec<Trade> = (0..5).map(|_| trade(10.0)).collect();
            assert_eq!(sizer.fraction(&history), (SizingMethod::Kelly, 0.0));
            assert!(sizer.size(10_000.0, &history).is_zero());
        }
    }

    #[test]
    fn nan_position_pct_sizes_to_zero() {
        let sizer = PositionSizer::new(SizingConfig {
            position_pct: f64::NAN,
            ..SizingConfig::default()
        });
        assert_eq!(sizer.fraction(&[]).1, 0.0);
    }

    #[test]
    fn kelly_capped() {
        let sizer = PositionSizer::new(SizingConfig {
            kelly_fraction: 1.0,
            ..kelly_config()
        });
        let history = vec![trade(300.0), trade(300.0), trade(300.0), trade(300.0), trade(-10.0)];
        let decision = sizer.size(10_000.0, &history);
        assert_relative_eq!(decision.fraction, 0.25);
    }

    #[test]
    fn fixed_fraction_respects_cap() {
        let sizer = PositionSizer::new(SizingConfig {
            position_pct: 0.9,
            ..SizingConfig::default()
        });
        assert_relative_eq!(sizer.size(1_000.0, &[]).value, 250.0);
    }

    #[test]
    fn trade_stats_on_net_pnl() {
        let stats = TradeStats::from_trades(&[trade(20.0), trade(-10.0), trade(0.0), trade(40.0)]);
        assert_relative_eq!(stats.win_rate, 0.5);
        assert_relative_eq!(stats.avg_win, 30.0, epsilon = 1e-9);
        assert_relative_eq!(stats.avg_loss, 10.0, epsilon = 1e-9);
    }
}
