//! Live market data port.

use std::time::Duration;

use crate::domain::error::ConfluenceError;
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedPoll {
    Bar(Bar),
    /// Nothing arrived within the timeout.
    Idle,
    /// The feed has ended; no more bars will come.
    Closed,
}

pub trait MarketFeedPort {
    /// Waits up to `timeout` for the next completed bar.
    fn poll_bar(&mut self, timeout: Duration) -> Result<FeedPoll, ConfluenceError>;
}
