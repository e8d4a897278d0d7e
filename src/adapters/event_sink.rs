//! Event sinks: newline-delimited JSON to any writer, and structured log
//! records through `tracing`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::error::ConfluenceError;
use crate::domain::events::EngineEvent;
use crate::ports::event_port::EventSink;

/// One JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, ConfluenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(JsonLinesSink::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &EngineEvent) -> Result<(), ConfluenceError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ConfluenceError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Logs each event at info, or warn for the circuit breaker.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: &EngineEvent) -> Result<(), ConfluenceError> {
        match event {
            EngineEvent::TradeOpened {
                timestamp,
                symbol,
                side,
                price,
                quantity,
                ..
            } => tracing::info!(%timestamp, symbol, %side, price, quantity, "trade opened"),
            EngineEvent::TradeClosed {
                timestamp,
                symbol,
                net_pnl,
                reason,
                equity,
                ..
            } => tracing::info!(%timestamp, symbol, net_pnl, %reason, equity, "trade closed"),
            EngineEvent::CircuitBreakerTriggered {
                timestamp,
                symbol,
                equity,
                drawdown,
                ..
            } => tracing::warn!(%timestamp, symbol, equity, drawdown, "circuit breaker triggered"),
            EngineEvent::PhaseSummary {
                symbol,
                bars,
                trades,
                final_equity,
                roi_pct,
                ..
            } => tracing::info!(symbol, bars, trades, final_equity, roi_pct, "phase summary"),
        }
        Ok(())
    }
}
