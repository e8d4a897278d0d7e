//! Typed events emitted by the engine for notifiers and persistence.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::position::{ExitReason, Side, Trade};
use super::risk::BreakerState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    TradeOpened {
        timestamp: NaiveDateTime,
        symbol: String,
        side: Side,
        price: f64,
        quantity: f64,
        fee: f64,
        equity: f64,
        contributors: Vec<String>,
    },
    TradeClosed {
        timestamp: NaiveDateTime,
        symbol: String,
        side: Side,
        entry_price: f64,
        exit_price: f64,
        quantity: f64,
        pnl: f64,
        fees: f64,
        net_pnl: f64,
        reason: ExitReason,
        equity: f64,
    },
    CircuitBreakerTriggered {
        timestamp: NaiveDateTime,
        symbol: String,
        equity: f64,
        peak_equity: f64,
        drawdown: f64,
    },
    PhaseSummary {
        timestamp: Option<NaiveDateTime>,
        symbol: String,
        bars: usize,
        trades: usize,
        final_equity: f64,
        roi_pct: f64,
        breaker: BreakerState,
    },
}

impl EngineEvent {
    pub fn trade_closed(trade: &Trade, equity: f64) -> Self {
        EngineEvent::TradeClosed {
            timestamp: trade.exit_time,
            symbol: trade.symbol.clone(),
            side: trade.side,
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            quantity: trade.quantity,
            pnl: trade.pnl,
            fees: trade.fees,
            net_pnl: trade.net_pnl,
            reason: trade.exit_reason,
            equity,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::TradeOpened { .. } => "trade_opened",
            EngineEvent::TradeClosed { .. } => "trade_closed",
            EngineEvent::CircuitBreakerTriggered { .. } => "circuit_breaker_triggered",
            EngineEvent::PhaseSummary { .. } => "phase_summary",
        }
    }
}
