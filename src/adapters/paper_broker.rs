//! Simulated broker: fills every order immediately at the reference price
//! adjusted for slippage, charging the configured commission.

use crate::domain::error::ConfluenceError;
use crate::domain::execution::{simulate_fill, ExecutionConfig, Fill, OrderRequest};
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone, Default)]
pub struct PaperBroker {
    config: ExecutionConfig,
    fills: usize,
}

impl PaperBroker {
    pub fn new(config: ExecutionConfig) -> Self {
        PaperBroker { config, fills: 0 }
    }

    pub fn fills(&self) -> usize {
        self.fills
    }
}

impl BrokerPort for PaperBroker {
    fn submit(&mut self, order: &OrderRequest) -> Result<Fill, ConfluenceError> {
        let fill = simulate_fill(order, &self.config)?;
        self.fills += 1;
        tracing::trace!(
            symbol = %fill.symbol,
            side = %fill.side,
            quantity = fill.quantity,
            price = fill.price,
            fee = fill.fee,
            "paper fill"
        );
        Ok(fill)
    }
}
