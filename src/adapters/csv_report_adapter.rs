//! Run artifacts as plain files: `trades.csv`, `equity.csv`,
//! `performance.json`, and `batch.json` for batch runs.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::batch::BatchReport;
use crate::domain::engine::RunResult;
use crate::domain::error::ConfluenceError;
use crate::domain::metrics::Metrics;
use crate::domain::position::{ExitReason, Side, Trade};
use crate::domain::risk::RiskState;
use crate::ports::report_port::ReportPort;

pub const TRADES_FILE: &str = "trades.csv";
pub const EQUITY_FILE: &str = "equity.csv";
pub const PERFORMANCE_FILE: &str = "performance.json";
pub const BATCH_FILE: &str = "batch.json";

#[derive(Serialize)]
struct TradeRow<'a> {
    symbol: &'a str,
    side: Side,
    quantity: f64,
    entry_time: NaiveDateTime,
    entry_price: f64,
    exit_time: NaiveDateTime,
    exit_price: f64,
    pnl: f64,
    fees: f64,
    net_pnl: f64,
    exit_reason: ExitReason,
    bars_held: usize,
    contributors: String,
}

impl<'a> From<&'a Trade> for TradeRow<'a> {
    fn from(trade: &'a Trade) -> Self {
        TradeRow {
            symbol: &trade.symbol,
            side: trade.side,
            quantity: trade.quantity,
            entry_time: trade.entry_time,
            entry_price: trade.entry_price,
            exit_time: trade.exit_time,
            exit_price: trade.exit_price,
            pnl: trade.pnl,
            fees: trade.fees,
            net_pnl: trade.net_pnl,
            exit_reason: trade.exit_reason,
            bars_held: trade.bars_held,
            contributors: trade.contributors.join(";"),
        }
    }
}

#[derive(Serialize)]
struct PerformanceSnapshot<'a> {
    strategy_set: &'a str,
    symbol: &'a str,
    bars_processed: usize,
    breaker_triggered_at: Option<NaiveDateTime>,
    risk: &'a RiskState,
    metrics: &'a Metrics,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        CsvReportAdapter
    }
}

fn ensure_dir(dir: &Path) -> Result<(), ConfluenceError> {
    fs::create_dir_all(dir).map_err(ConfluenceError::Io)
}

impl ReportPort for CsvReportAdapter {
    fn write_run(
        &self,
        result: &RunResult,
        metrics: &Metrics,
        output_dir: &Path,
    ) -> Result<(), ConfluenceError> {
        ensure_dir(output_dir)?;

        let mut trades = csv::Writer::from_path(output_dir.join(TRADES_FILE))?;
        for trade in &result.trades {
            trades.serialize(TradeRow::from(trade))?;
        }
        trades.flush()?;

        let mut equity = csv::Writer::from_path(output_dir.join(EQUITY_FILE))?;
        for point in &result.equity_curve {
            equity.serialize(point)?;
        }
        equity.flush()?;

        let snapshot = PerformanceSnapshot {
            strategy_set: &result.strategy_set,
            symbol: &result.symbol,
            bars_processed: result.bars_processed,
            breaker_triggered_at: result.breaker_triggered_at,
            risk: &result.risk,
            metrics,
        };
        fs::write(
            output_dir.join(PERFORMANCE_FILE),
            serde_json::to_string_pretty(&snapshot)?,
        )?;

        tracing::info!(
            dir = %output_dir.display(),
            trades = result.trades.len(),
            points = result.equity_curve.len(),
            "run artifacts written"
        );
        Ok(())
    }

    fn write_batch(&self, report: &BatchReport, output_dir: &Path) -> Result<(), ConfluenceError> {
        ensure_dir(output_dir)?;
        fs::write(
            output_dir.join(BATCH_FILE),
            serde_json::to_string_pretty(report)?,
        )?;
        tracing::info!(
            dir = %output_dir.display(),
            ranked = report.ranked.len(),
            excluded = report.excluded.len(),
            "batch report written"
        );
        Ok(())
    }
}
