//! Capital-preservation rails: the drawdown circuit breaker and the
//! percent trailing stop.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::position::{Position, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// New entries allowed.
    Normal,
    /// Latched after the drawdown limit was reached; only `reset` clears it.
    Triggered,
}

/// Read-only view of a breaker's latch, safe to hand to other threads.
#[derive(Debug, Clone)]
pub struct BreakerHandle(Arc<AtomicBool>);

impl BreakerHandle {
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Drawdown kill-switch: once `(peak - equity) / peak` reaches
/// `max_drawdown`, no new positions open until an explicit reset.
#[derive(Debug)]
pub struct CircuitBreaker {
    max_drawdown: f64,
    dry_run: bool,
    peak: f64,
    drawdown: f64,
    triggered: Arc<AtomicBool>,
}

impl CircuitBreaker {
    pub fn new(initial_equity: f64, max_drawdown: f64, dry_run: bool) -> Self {
        CircuitBreaker {
            max_drawdown,
            dry_run,
            peak: initial_equity,
            drawdown: 0.0,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Updates peak and drawdown for `equity`. Returns the drawdown when this
    /// call latches the breaker, `None` otherwise.
    pub fn evaluate(&mut self, equity: f64) -> Option<f64> {
        if equity > self.peak {
            self.peak = equity;
        }
        self.drawdown = if self.peak > 0.0 {
            ((self.peak - equity) / self.peak).max(0.0)
        } else {
            0.0
        };

        if self.is_triggered() || self.drawdown < self.max_drawdown {
            return None;
        }
        if self.dry_run {
            tracing::warn!(
                drawdown = self.drawdown,
                limit = self.max_drawdown,
                "drawdown limit reached, dry run keeps trading"
            );
            return None;
        }
        self.triggered.store(true, Ordering::Release);
        Some(self.drawdown)
    }

    /// Clears the latch and re-bases the peak on `equity`.
    pub fn reset(&mut self, equity: f64) {
        self.triggered.store(false, Ordering::Release);
        self.peak = equity;
        self.drawdown = 0.0;
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub fn state(&self) -> BreakerState {
        if self.is_triggered() {
            BreakerState::Triggered
        } else {
            BreakerState::Normal
        }
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn drawdown(&self) -> f64 {
        self.drawdown
    }

    pub fn handle(&self) -> BreakerHandle {
        BreakerHandle(Arc::clone(&self.triggered))
    }
}

/// Snapshot of the risk rails after a bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub breaker: BreakerState,
    pub peak_equity: f64,
    pub current_drawdown: f64,
    pub trailing_stop_active: bool,
}

/// Trails the best close since entry by a fixed fraction. The level only
/// ever tightens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingStop {
    fraction: f64,
}

impl TrailingStop {
    /// `percent` is in percent units (5.0 = 5%).
    pub fn from_percent(percent: f64) -> Self {
        TrailingStop {
            fraction: percent / 100.0,
        }
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    fn level_for(&self, position: &Position) -> f64 {
        match position.side {
            Side::Long => position.highest * (1.0 - self.fraction),
            Side::Short => position.lowest * (1.0 + self.fraction),
        }
    }

    /// Sets the initial level from the entry price.
    pub fn arm(&self, position: &mut Position) {
        position.trailing_stop = Some(self.level_for(position));
    }

    /// Observes `price`, ratchets the level, and reports whether the stop is hit.
    pub fn update(&self, position: &mut Position, price: f64) -> bool {
        position.observe(price);
        let candidate = self.level_for(position);
        let level = match (position.side, position.trailing_stop) {
            (Side::Long, Some(current)) => current.max(candidate),
            (Side::Short, Some(current)) => current.min(candidate),
            (_, None) => candidate,
        };
        position.trailing_stop = Some(level);

        match position.side {
            Side::Long => price <= level,
            Side::Short => price >= level,
        }
    }
}
