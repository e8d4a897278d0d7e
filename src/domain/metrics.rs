//! Performance metrics over a trade log and equity curve.
//!
//! Percent fields carry a `_pct` suffix and are in percent units (12.5 means
//! 12.5%). Ratios with a zero denominator are reported as 0.

use serde::{Deserialize, Serialize};

use super::engine::RunResult;
use super::portfolio::EquityPoint;
use super::position::Trade;

pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub roi_pct: f64,
    pub annualized_return_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    /// Largest peak-to-trough decline, as a positive percentage.
    pub max_drawdown_pct: f64,
    /// Longest run of bars spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_bars: f64,
    pub total_fees: f64,
}

impl Metrics {
    pub fn from_run(result: &RunResult, risk_free_rate: f64, periods_per_year: f64) -> Self {
        Self::compute(
            &result.trades,
            &result.equity_curve,
            result.initial_capital,
            risk_free_rate,
            periods_per_year,
        )
    }

    /// `risk_free_rate` is annual, as a fraction.
    pub fn compute(
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        initial_capital: f64,
        risk_free_rate: f64,
        periods_per_year: f64,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let years = if periods_per_year > 0.0 {
            equity_curve.len() as f64 / periods_per_year
        } else {
            0.0
        };
        let annualized_return = if years > 0.0 && total_return > -1.0 && total_return.is_finite() {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let period_rf = if periods_per_year > 0.0 {
            risk_free_rate / periods_per_year
        } else {
            0.0
        };
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(equity_curve, period_rf, periods_per_year);

        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        };

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_bars = 0usize;
        let mut total_fees = 0.0_f64;

        for trade in trades {
            let pnl = trade.net_pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            total_bars += trade.bars_held;
            total_fees += trade.fees;
        }

        let total_trades = trades.len();
        let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };

        Metrics {
            initial_capital,
            final_equity,
            roi_pct: total_return * 100.0,
            annualized_return_pct: annualized_return * 100.0,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            max_drawdown_pct: max_drawdown * 100.0,
            max_drawdown_duration,
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate_pct: ratio(trades_won as f64, total_trades as f64) * 100.0,
            profit_factor: ratio(total_wins, total_losses),
            avg_win: ratio(total_wins, trades_won as f64),
            avg_loss: ratio(total_losses, trades_lost as f64),
            largest_win,
            largest_loss,
            avg_holding_bars: ratio(total_bars as f64, total_trades as f64),
            total_fees,
        }
    }
}

/// Maximum drawdown as a fraction, and its longest duration in bars.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut duration = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            duration += 1;
            max_duration = max_duration.max(duration);
        }
    }

    (max_dd, max_duration)
}

fn period_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Annualised Sharpe and Sortino. Sortino uses the standard deviation of the
/// negative period returns only.
fn compute_risk_adjusted(equity_curve: &[EquityPoint], period_rf: f64, periods_per_year: f64) -> (f64, f64) {
    let returns = period_returns(equity_curve);
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let excess = mean - period_rf;
    let scale = periods_per_year.max(0.0).sqrt();

    let stddev = population_std(&returns);
    let sharpe = if stddev > 0.0 { excess / stddev * scale } else { 0.0 };

    let negative: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside = if negative.len() >= 2 {
        population_std(&negative)
    } else {
        0.0
    };
    let sortino = if downside > 0.0 { excess / downside * scale } else { 0.0 };

    (sharpe, sortino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::test_support::{position, ts};
    use crate::domain::position::{ExitReason, Side};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    fn make_trade(net_pnl: f64, bars: usize, fee: f64) -> Trade {
        let mut pos = position(Side::Long, 1.0, 100.0);
        pos.entry_fee = fee;
        Trade::close(pos, 100.0 + net_pnl + fee, ts(2), bars, 0.0, ExitReason::Signal)
    }

    fn metrics(equity: &[f64], trades: &[Trade]) -> Metrics {
        let initial = equity.first().copied().unwrap_or(10_000.0);
        Metrics::compute(trades, &make_equity_curve(equity), initial, 0.0, 252.0)
    }

    #[test]
    fn empty_run_is_all_zero() {
        let m = Metrics::compute(&[], &[], 10_000.0, 0.02, 252.0);
        assert_eq!(m.roi_pct, 0.0);
        assert_eq!(m.final_equity, 10_000.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.calmar_ratio, 0.0);
        assert_eq!(m.total_trades, 0);
    }

    #[test]
    fn roi_in_percent() {
        assert_relative_eq!(metrics(&[10_000.0, 11_000.0], &[]).roi_pct, 10.0, epsilon = 1e-9);
        assert_relative_eq!(metrics(&[10_000.0, 9_000.0], &[]).roi_pct, -10.0, epsilon = 1e-9);
    }

    #[test]
    fn flat_year_annualizes_to_zero() {
        let m = metrics(&[10_000.0; 252], &[]);
        assert_relative_eq!(m.annualized_return_pct, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn trade_stats_on_net_pnl() {
        let trades = [
            make_trade(100.0, 5, 0.0),
            make_trade(-50.0, 3, 0.0),
            make_trade(200.0, 10, 0.0),
            make_trade(0.0, 2, 0.0),
        ];
        let m = metrics(&[10_000.0, 10_250.0], &trades);
        assert_eq!(m.trades_won, 2);
        assert_eq!(m.trades_lost, 1);
        assert_eq!(m.trades_breakeven, 1);
        assert_relative_eq!(m.win_rate_pct, 50.0);
        assert_relative_eq!(m.profit_factor, 6.0, epsilon = 1e-9);
        assert_relative_eq!(m.avg_win, 150.0, epsilon = 1e-9);
        assert_relative_eq!(m.avg_loss, 50.0, epsilon = 1e-9);
        assert_relative_eq!(m.largest_win, 200.0, epsilon = 1e-9);
        assert_relative_eq!(m.largest_loss, 50.0, epsilon = 1e-9);
        assert_relative_eq!(m.avg_holding_bars, 5.0);
    }

    #[test]
    fn fees_decide_win_or_loss() {
        // +1 gross, 3 in fees
        let mut pos = position(Side::Long, 1.0, 100.0);
        pos.entry_fee = 2.0;
        let trade = Trade::close(pos, 101.0, ts(2), 1, 1.0, ExitReason::Signal);
        let m = metrics(&[10_000.0, 9_998.0], &[trade]);
        assert_eq!(m.trades_lost, 1);
        assert_relative_eq!(m.total_fees, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn no_losses_means_zero_profit_factor() {
        let m = metrics(&[10_000.0, 10_100.0], &[make_trade(100.0, 1, 0.0)]);
        assert_eq!(m.profit_factor, 0.0);
    }

    #[test]
    fn max_drawdown_and_duration() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        let (dd, duration) = compute_drawdown(&curve);
        assert_relative_eq!(dd, 30.0 / 110.0, epsilon = 1e-12);
        assert_eq!(duration, 4);
    }

    #[test]
    fn drawdown_duration_resets_on_new_peak() {
        let curve = make_equity_curve(&[100.0, 90.0, 95.0, 120.0, 118.0]);
        let (_, duration) = compute_drawdown(&curve);
        assert_eq!(duration, 2);
    }

    #[test]
    fn calmar_is_annualized_over_drawdown() {
        let m = metrics(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0], &[]);
        assert_relative_eq!(
            m.calmar_ratio,
            m.annualized_return_pct / m.max_drawdown_pct,
            epsilon = 1e-9
        );
    }

    #[test]
    fn steady_growth_has_positive_sharpe() {
        let values: Vec<f64> = (0..253).map(|i| 10_000.0 * (1.0 + 0.001 * i as f64)).collect();
        let m = metrics(&values, &[]);
        assert!(m.sharpe_ratio > 0.0);
        // no negative returns at all
        assert_eq!(m.sortino_ratio, 0.0);
    }

    #[test]
    fn sortino_uses_negative_returns_only() {
        let curve = make_equity_curve(&[100.0, 101.0, 100.5, 101.5, 100.0, 102.0]);
        let (sharpe, sortino) = compute_risk_adjusted(&curve, 0.0, 252.0);
        assert!(sharpe.is_finite());
        assert!(sortino.is_finite());

        let returns = period_returns(&curve);
        let negative: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let expected = mean / population_std(&negative) * 252f64.sqrt();
        assert_relative_eq!(sortino, expected, epsilon = 1e-9);
    }

    #[test]
    fn serializes_pct_field_names() {
        let json = serde_json::to_value(metrics(&[10_000.0, 10_500.0], &[])).unwrap();
        assert!(json.get("roi_pct").is_some());
        assert!(json.get("max_drawdown_pct").is_some());
        assert!(json.get("win_rate_pct").is_some());
    }
}
