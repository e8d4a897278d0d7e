//! Order routing port. The engine sends every entry and exit through it.

use crate::domain::error::ConfluenceError;
use crate::domain::execution::{Fill, OrderRequest};

pub trait BrokerPort: Send {
    /// Fills `order` or fails. `OrderRejected` is recoverable; the engine
    /// skips the action and carries on.
    fn submit(&mut self, order: &OrderRequest) -> Result<Fill, ConfluenceError>;
}
