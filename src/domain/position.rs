//! Open positions and closed trades.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::signal::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// The side an actionable signal opens, `None` for HOLD.
    pub fn from_direction(direction: Direction) -> Option<Side> {
        match direction {
            Direction::Buy => Some(Side::Long),
            Direction::Sell => Some(Side::Short),
            Direction::Hold => None,
        }
    }

    /// The signal direction that works against this side.
    pub fn closing_direction(&self) -> Direction {
        match self {
            Side::Long => Direction::Sell,
            Side::Short => Direction::Buy,
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TrailingStop,
    Signal,
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TrailingStop => write!(f, "trailing_stop"),
            ExitReason::Signal => write!(f, "signal"),
            ExitReason::EndOfData => write!(f, "end_of_data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    /// Always positive; direction lives in `side`.
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    /// Bar index the position was opened on.
    pub entry_bar: usize,
    pub entry_fee: f64,
    pub highest: f64,
    pub lowest: f64,
    pub trailing_stop: Option<f64>,
    pub contributors: Vec<String>,
}

impl Position {
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * self.quantity * (price - self.entry_price)
    }

    /// Tracks the best and worst closes seen since entry.
    pub fn observe(&mut self, price: f64) {
        self.highest = self.highest.max(price);
        self.lowest = self.lowest.min(price);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    /// Price P&L before fees.
    pub pnl: f64,
    /// Entry plus exit fees.
    pub fees: f64,
    pub net_pnl: f64,
    pub exit_reason: ExitReason,
    pub bars_held: usize,
    pub contributors: Vec<String>,
}

impl Trade {
    /// Closes `position` at `exit_price`, charging `exit_fee`.
    pub fn close(
        position: Position,
        exit_price: f64,
        exit_time: NaiveDateTime,
        exit_bar: usize,
        exit_fee: f64,
        exit_reason: ExitReason,
    ) -> Trade {
        let pnl = position.unrealized_pnl(exit_price);
        let fees = position.entry_fee + exit_fee;
        Trade {
            symbol: position.symbol,
            side: position.side,
            quantity: position.quantity,
            entry_price: position.entry_price,
            exit_price,
            entry_time: position.entry_time,
            exit_time,
            pnl,
            fees,
            net_pnl: pnl - fees,
            exit_reason,
            bars_held: exit_bar.saturating_sub(position.entry_bar),
            contributors: position.contributors,
        }
    }

    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.net_pnl < 0.0
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDate;

    pub fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    pub fn position(side: Side, quantity: f64, entry_price: f64) -> Position {
        Position {
            symbol: "BTCUSDT".into(),
            side,
            quantity,
            entry_price,
            entry_time: ts(1),
            entry_bar: 0,
            entry_fee: 0.0,
            highest: entry_price,
            lowest: entry_price,
            trailing_stop: None,
            contributors: vec!["ma_crossover".into()],
        }
    }
}
