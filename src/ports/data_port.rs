//! Historical data port.

use crate::domain::error::ConfluenceError;
use crate::domain::ohlcv::Bar;

pub trait DataPort {
    /// Every bar for `symbol`, oldest first.
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, ConfluenceError>;
}
