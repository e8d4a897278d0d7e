//! Market feeds for the live loop: a replay of recorded bars, and a channel
//! fed by another thread.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::domain::error::ConfluenceError;
use crate::domain::ohlcv::Bar;
use crate::ports::feed_port::{FeedPoll, MarketFeedPort};

/// Hands out recorded bars in order, then reports `Closed`.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    bars: VecDeque<Bar>,
    idle_every: Option<usize>,
    served: usize,
    idled: bool,
}

impl ReplayFeed {
    pub fn new(bars: Vec<Bar>) -> Self {
        ReplayFeed {
            bars: bars.into(),
            idle_every: None,
            served: 0,
            idled: false,
        }
    }

    /// Inserts one `Idle` poll after every `n` bars, as a quiet market would.
    pub fn with_idle_every(mut self, n: usize) -> Self {
        self.idle_every = (n > 0).then_some(n);
        self
    }

    pub fn remaining(&self) -> usize {
        self.bars.len()
    }
}

impl MarketFeedPort for ReplayFeed {
    fn poll_bar(&mut self, _timeout: Duration) -> Result<FeedPoll, ConfluenceError> {
        if let Some(n) = self.idle_every {
            if self.served > 0 && self.served % n == 0 && !self.idled {
                self.idled = true;
                return Ok(FeedPoll::Idle);
            }
        }
        match self.bars.pop_front() {
            Some(bar) => {
                self.served += 1;
                self.idled = false;
                Ok(FeedPoll::Bar(bar))
            }
            None => Ok(FeedPoll::Closed),
        }
    }
}

/// Receives bars pushed by a producer thread. Dropping the sender closes the
/// feed.
pub struct ChannelFeed {
    rx: Receiver<Bar>,
}

impl ChannelFeed {
    pub fn new(rx: Receiver<Bar>) -> Self {
        ChannelFeed { rx }
    }
}

impl MarketFeedPort for ChannelFeed {
    fn poll_bar(&mut self, timeout: Duration) -> Result<FeedPoll, ConfluenceError> {
        match self.rx.recv_timeout(timeout) {
            Ok(bar) => Ok(FeedPoll::Bar(bar)),
            Err(RecvTimeoutError::Timeout) => Ok(FeedPoll::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(FeedPoll::Closed),
        }
    }
}
