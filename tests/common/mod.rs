#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use confluence::adapters::paper_broker::PaperBroker;
use confluence::domain::config::EngineConfig;
use confluence::domain::engine::ExecutionEngine;
use confluence::domain::error::ConfluenceError;
pub use confluence::domain::ohlcv::Bar;
use confluence::domain::position::{ExitReason, Position, Side, Trade};
use confluence::domain::signal::{CooperationPolicy, Direction, Signal};
use confluence::domain::sizing::SizingConfig;
use confluence::domain::strategy::Strategy;
use confluence::ports::event_port::EventSink;
use confluence::domain::events::EngineEvent;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn make_bar(index: usize, close: f64) -> Bar {
    Bar {
        timestamp: start() + chrono::Duration::hours(index as i64),
        open: close,
        high: close + 1.0,
        low: (close - 1.0).max(0.01),
        close,
        volume: 1000.0,
    }
}

pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(i, c))
        .collect()
}

/// A slow sine wave on a gentle uptrend: crosses its own moving averages
/// regularly, never goes near zero.
pub fn sine_bars(count: usize) -> Vec<Bar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| {
            let t = i as f64;
            100.0 + 0.01 * t + 15.0 * (t * 0.04).sin() + 2.0 * (t * 0.5).sin()
        })
        .collect();
    bars_from_closes(&closes)
}

/// Emits the scripted direction on the n-th evaluation, HOLD otherwise.
pub struct Scripted {
    id: String,
    script: BTreeMap<usize, Direction>,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn new(id: &str, script: &[(usize, Direction)]) -> Self {
        Scripted {
            id: id.to_string(),
            script: script.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Strategy for Scripted {
    fn id(&self) -> &str {
        &self.id
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn analyze(&self, _window: &[Bar]) -> Result<Signal, ConfluenceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let direction = self.script.get(&n).copied().unwrap_or(Direction::Hold);
        Ok(Signal::new(&self.id, direction, None))
    }
}

/// Every closing bar fully invested, no costs.
pub fn all_in_config() -> EngineConfig {
    EngineConfig {
        symbol: "TEST".into(),
        initial_capital: 10_000.0,
        sizing: SizingConfig {
            position_pct: 1.0,
            max_position_pct: 1.0,
            ..SizingConfig::default()
        },
        ..EngineConfig::default()
    }
}

pub fn scripted_engine(config: &EngineConfig, script: &[(usize, Direction)]) -> ExecutionEngine {
    ExecutionEngine::with_strategies(
        config,
        "scripted",
        vec![(Box::new(Scripted::new("scripted", script)) as Box<dyn Strategy>, 1.0)],
        CooperationPolicy::Or,
        None,
        Box::new(PaperBroker::new(config.execution.clone())),
    )
}

/// A closed long trade with the given net result, no fees.
pub fn closed_trade(net_pnl: f64) -> Trade {
    let entry_price = 200.0;
    let position = Position {
        symbol: "TEST".into(),
        side: Side::Long,
        quantity: 1.0,
        entry_price,
        entry_time: start(),
        entry_bar: 0,
        entry_fee: 0.0,
        highest: entry_price,
        lowest: entry_price,
        trailing_stop: None,
        contributors: Vec::new(),
    };
    Trade::close(
        position,
        entry_price + net_pnl,
        start() + chrono::Duration::hours(1),
        1,
        0.0,
        ExitReason::Signal,
    )
}

/// Collects events in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<EngineEvent>,
    pub flushed: bool,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &EngineEvent) -> Result<(), ConfluenceError> {
        self.events.push(event.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ConfluenceError> {
        self.flushed = true;
        Ok(())
    }
}

/// Fails every emit.
pub struct BrokenSink;

impl EventSink for BrokenSink {
    fn emit(&mut self, _event: &EngineEvent) -> Result<(), ConfluenceError> {
        Err(ConfluenceError::Io(std::io::Error::other("disk full")))
    }
}

pub fn write_csv(path: &std::path::Path, bars: &[Bar]) {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.timestamp.format("%Y-%m-%d %H:%M:%S"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    std::fs::write(path, out).unwrap();
}
