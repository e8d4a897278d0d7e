//! Order and fill model with simulated slippage and commissions.
//!
//! Buys fill above the reference price and sells below it by `slippage_pct`
//! percent. Commission is a flat fee plus `commission_pct` percent of the
//! filled notional.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ConfluenceError;
use super::position::Side;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn to_open(side: Side) -> OrderSide {
        match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    pub fn to_close(side: Side) -> OrderSide {
        match side {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Price the order is expected to fill near (bar close or open).
    pub reference_price: f64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub fee: f64,
    pub timestamp: NaiveDateTime,
}

/// Flat fee plus a percentage of notional.
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Moves `market_price` against the order: up for buys, down for sells.
pub fn apply_slippage(market_price: f64, side: OrderSide, slippage_pct: f64) -> f64 {
    match side {
        OrderSide::Buy => market_price * (1.0 + slippage_pct / 100.0),
        OrderSide::Sell => market_price * (1.0 - slippage_pct / 100.0),
    }
}

/// Simulated fill of `request` at its reference price.
pub fn simulate_fill(request: &OrderRequest, config: &ExecutionConfig) -> Result<Fill, ConfluenceError> {
    if !request.quantity.is_finite() || request.quantity <= 0.0 {
        return Err(ConfluenceError::OrderRejected {
            reason: format!("quantity {} is not positive", request.quantity),
        });
    }
    if !request.reference_price.is_finite() || request.reference_price <= 0.0 {
        return Err(ConfluenceError::OrderRejected {
            reason: format!("reference price {} is not positive", request.reference_price),
        });
    }

    let price = apply_slippage(request.reference_price, request.side, config.slippage_pct);
    let fee = calculate_commission(request.quantity * price, config);
    Ok(Fill {
        symbol: request.symbol.clone(),
        side: request.side,
        quantity: request.quantity,
        price,
        fee,
        timestamp: request.timestamp,
    })
}
