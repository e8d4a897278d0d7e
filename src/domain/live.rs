//! Drives the engine from a live feed, one bar at a time.
//!
//! Cancellation is cooperative: the flag is checked between bars, so a bar
//! that is already being processed always completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::engine::{ExecutionEngine, RunResult};
use super::error::ConfluenceError;
use super::events::EngineEvent;
use super::risk::BreakerHandle;
use crate::ports::event_port::EventSink;
use crate::ports::feed_port::{FeedPoll, MarketFeedPort};

pub struct LiveRunner<'a> {
    engine: ExecutionEngine,
    feed: &'a mut dyn MarketFeedPort,
    sink: &'a mut dyn EventSink,
    poll_timeout: Duration,
    cancel: Arc<AtomicBool>,
    forwarded: usize,
}

impl<'a> LiveRunner<'a> {
    pub fn new(
        engine: ExecutionEngine,
        feed: &'a mut dyn MarketFeedPort,
        sink: &'a mut dyn EventSink,
        poll_timeout: Duration,
    ) -> Self {
        LiveRunner {
            engine,
            feed,
            sink,
            poll_timeout,
            cancel: Arc::new(AtomicBool::new(false)),
            forwarded: 0,
        }
    }

    /// Shares an existing flag, e.g. one a signal handler sets.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Setting the returned flag stops the loop before the next bar.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn breaker_handle(&self) -> BreakerHandle {
        self.engine.breaker_handle()
    }

    fn forward(sink: &mut dyn EventSink, events: &[EngineEvent]) {
        for event in events {
            if let Err(err) = sink.emit(event) {
                tracing::warn!(event = event.name(), %err, "event sink failed");
            }
        }
    }

    /// Runs until the feed closes or the cancel flag is set, then finishes
    /// the engine and forwards the remaining events.
    pub fn run(mut self) -> Result<RunResult, ConfluenceError> {
        tracing::info!(timeout_ms = self.poll_timeout.as_millis() as u64, "live loop started");
        while !self.cancel.load(Ordering::Acquire) {
            match self.feed.poll_bar(self.poll_timeout)? {
                FeedPoll::Bar(bar) => {
                    self.engine.process_bar(bar)?;
                    let events = &self.engine.events()[self.forwarded..];
                    Self::forward(self.sink, events);
                    self.forwarded += events.len();
                }
                FeedPoll::Idle => continue,
                FeedPoll::Closed => {
                    tracing::info!("feed closed");
                    break;
                }
            }
        }
        if self.cancel.load(Ordering::Acquire) {
            tracing::info!(bars = self.engine.bars_processed(), "live loop cancelled");
        }

        let result = self.engine.finish()?;
        Self::forward(self.sink, &result.events[self.forwarded..]);
        if let Err(err) = self.sink.flush() {
            tracing::warn!(%err, "event sink flush failed");
        }
        Ok(result)
    }
}
