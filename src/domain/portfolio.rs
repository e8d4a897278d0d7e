//! Capital, open positions and the equity curve.
//!
//! Capital moves only by fees and realized P&L: the entry fee is debited when
//! a position opens; gross P&L less the exit fee is credited when it closes.
//! Equity is capital plus the unrealized P&L of open positions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::ConfluenceError;
use super::position::{ExitReason, Position, Trade};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub capital: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, Position>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            capital: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    /// Opens a position, debiting its entry fee. One position per symbol.
    pub fn open(&mut self, position: Position) -> Result<(), ConfluenceError> {
        if self.positions.contains_key(&position.symbol) {
            return Err(ConfluenceError::OrderRejected {
                reason: format!("a position in {} is already open", position.symbol),
            });
        }
        self.capital -= position.entry_fee;
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    /// Closes the position in `symbol`, crediting gross P&L less `exit_fee`.
    pub fn close(
        &mut self,
        symbol: &str,
        exit_price: f64,
        exit_time: NaiveDateTime,
        exit_bar: usize,
        exit_fee: f64,
        reason: ExitReason,
    ) -> Option<Trade> {
        let position = self.positions.remove(symbol)?;
        let trade = Trade::close(position, exit_price, exit_time, exit_bar, exit_fee, reason);
        self.capital += trade.pnl - exit_fee;
        self.trades.push(trade.clone());
        Some(trade)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.get_mut(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    /// Capital plus the unrealized P&L of the position in `symbol` at `price`.
    pub fn equity(&self, symbol: &str, price: f64) -> f64 {
        let unrealized = self
            .positions
            .get(symbol)
            .map(|pos| pos.unrealized_pnl(price))
            .unwrap_or(0.0);
        self.capital + unrealized
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, equity: f64) {
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }
}
