//! Bar-by-bar execution engine.
//!
//! Each bar goes through the same fixed sequence:
//!
//! 0. validate the bar and its ordering, fill a pending next-open exit
//! 1. append to the rolling window (warm-up records equity only)
//! 2. run the strategies and aggregate their signals
//! 3. manage an open position: trailing stop, then opposite-signal exit
//! 4. evaluate the circuit breaker
//! 5. when flat, size and open a new position through the broker
//! 6. record the equity point

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::aggregator::SignalAggregator;
use super::config::{EngineConfig, ExitFill, StrategySet};
use super::error::ConfluenceError;
use super::events::EngineEvent;
use super::execution::{OrderRequest, OrderSide};
use super::ohlcv::Bar;
use super::portfolio::{EquityPoint, Portfolio};
use super::position::{ExitReason, Position, Side, Trade};
use super::risk::{BreakerHandle, CircuitBreaker, RiskState, TrailingStop};
use super::signal::{AggregatedSignal, CooperationPolicy, Direction, Signal};
use super::sizing::PositionSizer;
use super::strategy::{build_enabled, Strategy};
use crate::ports::broker_port::BrokerPort;

/// Relative slack on the capital check so an all-in fill that lands a few
/// ulps over capital still goes through.
const CAPITAL_TOLERANCE: f64 = 1e-9;

/// Why an actionable signal did not open a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    /// The circuit breaker is latched.
    RiskLimitExceeded,
    /// The sizer returned nothing to commit (negative Kelly edge).
    SizedToZero,
    /// SELL while shorting is disabled.
    ShortingDisabled,
    /// The broker refused the order, or the fill costs more than the capital.
    OrderRejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatedEntry {
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    pub reason: GateReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BarAction {
    Exited(ExitReason),
    ExitScheduled(ExitReason),
    BreakerTriggered { drawdown: f64 },
    Entered(Side),
    Gated(GateReason),
}

/// What happened on one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BarOutcome {
    pub timestamp: NaiveDateTime,
    /// False while warming up or when a strategy could not evaluate the window.
    pub evaluated: bool,
    pub signal: Option<AggregatedSignal>,
    pub actions: Vec<BarAction>,
    pub equity: f64,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub strategy_set: String,
    pub symbol: String,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub bars_processed: usize,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub gated: Vec<GatedEntry>,
    pub events: Vec<EngineEvent>,
    pub risk: RiskState,
    /// Timestamp of the bar that latched the breaker, if any.
    pub breaker_triggered_at: Option<NaiveDateTime>,
}

impl RunResult {
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_capital)
    }

    pub fn roi_pct(&self) -> f64 {
        if self.initial_capital == 0.0 {
            return 0.0;
        }
        (self.final_equity() - self.initial_capital) / self.initial_capital * 100.0
    }
}

pub struct ExecutionEngine {
    config: EngineConfig,
    set_name: String,
    strategies: Vec<Box<dyn Strategy>>,
    aggregator: SignalAggregator,
    sizer: PositionSizer,
    breaker: CircuitBreaker,
    trailing: Option<TrailingStop>,
    broker: Box<dyn BrokerPort>,
    portfolio: Portfolio,
    window: VecDeque<Bar>,
    warmup_bars: usize,
    capacity: usize,
    bars_processed: usize,
    last_bar: Option<Bar>,
    pending_exit: Option<ExitReason>,
    events: Vec<EngineEvent>,
    gated: Vec<GatedEntry>,
    breaker_triggered_at: Option<NaiveDateTime>,
}

impl ExecutionEngine {
    /// Builds the enabled strategies of `set` through the registry.
    pub fn new(
        config: &EngineConfig,
        set: &StrategySet,
        broker: Box<dyn BrokerPort>,
    ) -> Result<Self, ConfluenceError> {
        let weights = set.strategies.iter().filter(|c| c.enabled).map(|c| c.weight);
        let strategies: Vec<(Box<dyn Strategy>, f64)> =
            build_enabled(&set.strategies)?.into_iter().zip(weights).collect();
        Ok(Self::with_strategies(
            config,
            &set.name,
            strategies,
            set.policy,
            set.weighted_threshold,
            broker,
        ))
    }

    /// Assembles an engine around already-built strategies and their weights.
    pub fn with_strategies(
        config: &EngineConfig,
        set_name: &str,
        strategies: Vec<(Box<dyn Strategy>, f64)>,
        policy: CooperationPolicy,
        weighted_threshold: Option<f64>,
        broker: Box<dyn BrokerPort>,
    ) -> Self {
        let aggregator = SignalAggregator::new(
            policy,
            strategies.iter().map(|(s, w)| (s.id().to_string(), *w)),
            weighted_threshold,
        );
        let strategies: Vec<Box<dyn Strategy>> = strategies.into_iter().map(|(s, _)| s).collect();
        let warmup_bars = strategies.iter().map(|s| s.min_bars()).max().unwrap_or(0);
        let trailing = config
            .risk
            .enable_trailing_stop
            .then(|| TrailingStop::from_percent(config.risk.trailing_stop_percent));

        ExecutionEngine {
            config: config.clone(),
            set_name: set_name.to_string(),
            strategies,
            aggregator,
            sizer: PositionSizer::new(config.sizing.clone()),
            breaker: CircuitBreaker::new(
                config.initial_capital,
                config.risk.max_drawdown_limit,
                config.risk.dry_run,
            ),
            trailing,
            broker,
            portfolio: Portfolio::new(config.initial_capital),
            window: VecDeque::new(),
            warmup_bars,
            capacity: warmup_bars.max(config.window_size).max(1),
            bars_processed: 0,
            last_bar: None,
            pending_exit: None,
            events: Vec::new(),
            gated: Vec::new(),
            breaker_triggered_at: None,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn breaker_handle(&self) -> BreakerHandle {
        self.breaker.handle()
    }

    pub fn bars_processed(&self) -> usize {
        self.bars_processed
    }

    /// Bars needed before the first evaluation.
    pub fn warmup_bars(&self) -> usize {
        self.warmup_bars
    }

    pub fn risk_state(&self) -> RiskState {
        RiskState {
            breaker: self.breaker.state(),
            peak_equity: self.breaker.peak(),
            current_drawdown: self.breaker.drawdown(),
            trailing_stop_active: self
                .portfolio
                .position(&self.config.symbol)
                .is_some_and(|p| p.trailing_stop.is_some()),
        }
    }

    /// Every event emitted so far, oldest first.
    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    /// Clears a latched breaker and re-bases its peak on the current equity.
    pub fn reset_circuit_breaker(&mut self) {
        let equity = self.current_equity();
        self.breaker.reset(equity);
        tracing::info!(equity, "circuit breaker reset");
    }

    fn current_equity(&self) -> f64 {
        match &self.last_bar {
            Some(bar) => self.portfolio.equity(&self.config.symbol, bar.close),
            None => self.portfolio.capital,
        }
    }

    pub fn process_bar(&mut self, bar: Bar) -> Result<BarOutcome, ConfluenceError> {
        // 0. validate
        bar.validate()?;
        if let Some(prev) = &self.last_bar {
            if bar.timestamp <= prev.timestamp {
                return Err(ConfluenceError::DataValidation {
                    timestamp: bar.timestamp,
                    reason: format!("out of order: previous bar was at {}", prev.timestamp),
                });
            }
        }
        let index = self.bars_processed;
        self.bars_processed += 1;
        let mut actions = Vec::new();

        if let Some(reason) = self.pending_exit.take() {
            if self.exit(bar.timestamp, bar.open, index, reason)?.is_some() {
                actions.push(BarAction::Exited(reason));
            }
        }

        // 1. rolling window
        self.window.push_back(bar.clone());
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        if self.window.len() < self.warmup_bars {
            tracing::debug!(
                timestamp = %bar.timestamp,
                have = self.window.len(),
                need = self.warmup_bars,
                "warming up"
            );
            return Ok(self.settle(bar, None, actions));
        }

        // 2. signals
        let window = self.window.make_contiguous();
        let mut signals: Vec<Signal> = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            match strategy.analyze(window) {
                Ok(signal) => signals.push(signal),
                Err(ConfluenceError::InsufficientData(err)) => {
                    tracing::debug!(
                        timestamp = %bar.timestamp,
                        strategy = strategy.id(),
                        %err,
                        "bar skipped"
                    );
                    return Ok(self.settle(bar, None, actions));
                }
                Err(err) => return Err(err),
            }
        }
        let aggregated = self.aggregator.aggregate(&signals)?;
        if aggregated.direction.is_actionable() {
            tracing::debug!(
                timestamp = %bar.timestamp,
                direction = %aggregated.direction,
                contributors = ?aggregated.contributors,
                policy = %aggregated.policy,
                "aggregated signal"
            );
        }

        // 3. position management
        if let Some(action) = self.manage_position(&bar, index, aggregated.direction)? {
            actions.push(action);
        }

        // 4. circuit breaker
        let equity = self.portfolio.equity(&self.config.symbol, bar.close);
        if let Some(drawdown) = self.breaker.evaluate(equity) {
            tracing::error!(
                timestamp = %bar.timestamp,
                equity,
                peak = self.breaker.peak(),
                drawdown,
                "circuit breaker triggered, new entries halted"
            );
            self.breaker_triggered_at = Some(bar.timestamp);
            self.events.push(EngineEvent::CircuitBreakerTriggered {
                timestamp: bar.timestamp,
                symbol: self.config.symbol.clone(),
                equity,
                peak_equity: self.breaker.peak(),
                drawdown,
            });
            actions.push(BarAction::BreakerTriggered { drawdown });
        }

        // 5. entry
        if let Some(action) = self.try_enter(&bar, index, &aggregated)? {
            actions.push(action);
        }

        // 6. equity
        Ok(self.settle(bar, Some(aggregated), actions))
    }

    fn settle(
        &mut self,
        bar: Bar,
        signal: Option<AggregatedSignal>,
        actions: Vec<BarAction>,
    ) -> BarOutcome {
        let equity = self.portfolio.equity(&self.config.symbol, bar.close);
        self.portfolio.record_equity(bar.timestamp, equity);
        let outcome = BarOutcome {
            timestamp: bar.timestamp,
            evaluated: signal.is_some(),
            signal,
            actions,
            equity,
        };
        self.last_bar = Some(bar);
        outcome
    }

    fn manage_position(
        &mut self,
        bar: &Bar,
        index: usize,
        direction: Direction,
    ) -> Result<Option<BarAction>, ConfluenceError> {
        let symbol = self.config.symbol.clone();
        let Some(position) = self.portfolio.position_mut(&symbol) else {
            return Ok(None);
        };
        let side = position.side;

        if let Some(trailing) = self.trailing {
            if trailing.update(position, bar.close) {
                tracing::info!(
                    timestamp = %bar.timestamp,
                    close = bar.close,
                    stop = ?position.trailing_stop,
                    "trailing stop hit"
                );
                return match self.config.exit_fill {
                    ExitFill::Close => Ok(self
                        .exit(bar.timestamp, bar.close, index, ExitReason::TrailingStop)?
                        .map(|_| BarAction::Exited(ExitReason::TrailingStop))),
                    ExitFill::NextOpen => {
                        self.pending_exit = Some(ExitReason::TrailingStop);
                        Ok(Some(BarAction::ExitScheduled(ExitReason::TrailingStop)))
                    }
                };
            }
        }

        if direction == side.closing_direction() {
            return Ok(self
                .exit(bar.timestamp, bar.close, index, ExitReason::Signal)?
                .map(|_| BarAction::Exited(ExitReason::Signal)));
        }
        Ok(None)
    }

    fn try_enter(
        &mut self,
        bar: &Bar,
        index: usize,
        aggregated: &AggregatedSignal,
    ) -> Result<Option<BarAction>, ConfluenceError> {
        let Some(side) = Side::from_direction(aggregated.direction) else {
            return Ok(None);
        };
        if self.portfolio.has_position(&self.config.symbol) || self.pending_exit.is_some() {
            return Ok(None);
        }

        if self.breaker.is_triggered() {
            tracing::info!(
                timestamp = %bar.timestamp,
                direction = %aggregated.direction,
                "entry blocked: risk limit exceeded"
            );
            return Ok(Some(self.gate(bar, aggregated.direction, GateReason::RiskLimitExceeded)));
        }
        if side == Side::Short && !self.config.allow_shorting {
            tracing::debug!(timestamp = %bar.timestamp, "entry blocked: shorting disabled");
            return Ok(Some(self.gate(bar, aggregated.direction, GateReason::ShortingDisabled)));
        }

        let decision = self.sizer.size(self.portfolio.capital, &self.portfolio.trades);
        if decision.is_zero() || bar.close <= 0.0 {
            tracing::info!(
                timestamp = %bar.timestamp,
                method = ?decision.method,
                fraction = decision.fraction,
                "entry skipped: position sized to zero"
            );
            return Ok(Some(self.gate(bar, aggregated.direction, GateReason::SizedToZero)));
        }

        let order = OrderRequest {
            symbol: self.config.symbol.clone(),
            side: OrderSide::to_open(side),
            quantity: decision.value / bar.close,
            reference_price: bar.close,
            timestamp: bar.timestamp,
        };
        let fill = match self.broker.submit(&order) {
            Ok(fill) => fill,
            Err(ConfluenceError::OrderRejected { reason }) => {
                tracing::warn!(timestamp = %bar.timestamp, %reason, "entry order rejected");
                return Ok(Some(self.gate(bar, aggregated.direction, GateReason::OrderRejected)));
            }
            Err(err) => return Err(err),
        };

        let capital = self.portfolio.capital;
        let notional = match side {
            Side::Long => fill.quantity * fill.price,
            Side::Short => 0.0,
        };
        if fill.fee >= capital || notional + fill.fee > capital * (1.0 + CAPITAL_TOLERANCE) {
            tracing::warn!(
                timestamp = %bar.timestamp,
                capital,
                notional,
                fee = fill.fee,
                "entry order rejected: insufficient capital"
            );
            return Ok(Some(self.gate(bar, aggregated.direction, GateReason::OrderRejected)));
        }

        let mut position = Position {
            symbol: fill.symbol.clone(),
            side,
            quantity: fill.quantity,
            entry_price: fill.price,
            entry_time: bar.timestamp,
            entry_bar: index,
            entry_fee: fill.fee,
            highest: fill.price,
            lowest: fill.price,
            trailing_stop: None,
            contributors: aggregated.contributors.clone(),
        };
        if let Some(trailing) = self.trailing {
            trailing.arm(&mut position);
        }
        self.portfolio.open(position)?;

        let equity = self.portfolio.equity(&self.config.symbol, bar.close);
        tracing::info!(
            timestamp = %bar.timestamp,
            side = %side,
            price = fill.price,
            quantity = fill.quantity,
            fee = fill.fee,
            sizing = ?decision.method,
            "position opened"
        );
        self.events.push(EngineEvent::TradeOpened {
            timestamp: bar.timestamp,
            symbol: fill.symbol,
            side,
            price: fill.price,
            quantity: fill.quantity,
            fee: fill.fee,
            equity,
            contributors: aggregated.contributors.clone(),
        });
        Ok(Some(BarAction::Entered(side)))
    }

    fn gate(&mut self, bar: &Bar, direction: Direction, reason: GateReason) -> BarAction {
        self.gated.push(GatedEntry {
            timestamp: bar.timestamp,
            direction,
            reason,
        });
        BarAction::Gated(reason)
    }

    /// Closes the open position through the broker at `price`.
    fn exit(
        &mut self,
        timestamp: NaiveDateTime,
        price: f64,
        index: usize,
        reason: ExitReason,
    ) -> Result<Option<Trade>, ConfluenceError> {
        let symbol = self.config.symbol.clone();
        let Some(position) = self.portfolio.position(&symbol) else {
            return Ok(None);
        };
        let order = OrderRequest {
            symbol: symbol.clone(),
            side: OrderSide::to_close(position.side),
            quantity: position.quantity,
            reference_price: price,
            timestamp,
        };
        let fill = match self.broker.submit(&order) {
            Ok(fill) => fill,
            Err(ConfluenceError::OrderRejected { reason: why }) => {
                tracing::warn!(%timestamp, reason = %why, "exit order rejected, position kept");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let Some(trade) =
            self.portfolio
                .close(&symbol, fill.price, timestamp, index, fill.fee, reason)
        else {
            return Ok(None);
        };
        tracing::info!(
            %timestamp,
            side = %trade.side,
            entry = trade.entry_price,
            exit = trade.exit_price,
            net_pnl = trade.net_pnl,
            reason = %reason,
            "position closed"
        );
        self.events
            .push(EngineEvent::trade_closed(&trade, self.portfolio.capital));
        Ok(Some(trade))
    }

    /// Ends the run: closes an open position at the last close (when
    /// configured) and emits the phase summary.
    pub fn finish(mut self) -> Result<RunResult, ConfluenceError> {
        if let Some(bar) = self.last_bar.clone() {
            let pending = self.pending_exit.take();
            if self.config.close_at_end || pending.is_some() {
                let reason = pending.unwrap_or(ExitReason::EndOfData);
                let index = self.bars_processed.saturating_sub(1);
                if self.exit(bar.timestamp, bar.close, index, reason)?.is_some() {
                    let capital = self.portfolio.capital;
                    if let Some(last) = self.portfolio.equity_curve.last_mut() {
                        last.equity = capital;
                    }
                }
            }
        }

        let risk = self.risk_state();
        let final_equity = self.current_equity();
        let initial = self.config.initial_capital;
        let roi_pct = if initial == 0.0 {
            0.0
        } else {
            (final_equity - initial) / initial * 100.0
        };
        tracing::info!(
            strategy_set = %self.set_name,
            bars = self.bars_processed,
            trades = self.portfolio.trades.len(),
            final_equity,
            roi_pct,
            "run finished"
        );
        self.events.push(EngineEvent::PhaseSummary {
            timestamp: self.last_bar.as_ref().map(|b| b.timestamp),
            symbol: self.config.symbol.clone(),
            bars: self.bars_processed,
            trades: self.portfolio.trades.len(),
            final_equity,
            roi_pct,
            breaker: risk.breaker,
        });

        Ok(RunResult {
            strategy_set: self.set_name,
            symbol: self.config.symbol,
            initial_capital: initial,
            final_capital: self.portfolio.capital,
            bars_processed: self.bars_processed,
            trades: self.portfolio.trades,
            equity_curve: self.portfolio.equity_curve,
            gated: self.gated,
            events: self.events,
            risk,
            breaker_triggered_at: self.breaker_triggered_at,
        })
    }

    /// Processes every bar in order, then finishes.
    pub fn run(mut self, bars: &[Bar]) -> Result<RunResult, ConfluenceError> {
        for bar in bars {
            self.process_bar(bar.clone())?;
        }
        self.finish()
    }
}
