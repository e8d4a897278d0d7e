//! Runs the engine once per strategy set over the same bars and ranks the
//! results by a weighted score.
//!
//! ```text
//! score = 0.30*ROI + 0.25*Sharpe + 0.20*Calmar + 0.15*WinRate + 0.10*(100 - |MDD|)
//! ```
//!
//! Each term is first normalised to [0, 100]: ROI 100% maps to 100, Sharpe
//! and Calmar of 3.0 map to 100, win rate and (100 - |MDD|) are already
//! percentages.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::config::{BatchConfig, EngineConfig, StrategySet};
use super::engine::ExecutionEngine;
use super::error::ConfluenceError;
use super::metrics::Metrics;
use super::ohlcv::Bar;
use crate::ports::broker_port::BrokerPort;

const ROI_FULL_SCALE_PCT: f64 = 100.0;
const SHARPE_FULL_SCALE: f64 = 3.0;
const CALMAR_FULL_SCALE: f64 = 3.0;

fn norm(value: f64, full_scale: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value / full_scale * 100.0).clamp(0.0, 100.0)
}

pub fn score(metrics: &Metrics) -> f64 {
    0.30 * norm(metrics.roi_pct, ROI_FULL_SCALE_PCT)
        + 0.25 * norm(metrics.sharpe_ratio, SHARPE_FULL_SCALE)
        + 0.20 * norm(metrics.calmar_ratio, CALMAR_FULL_SCALE)
        + 0.15 * norm(metrics.win_rate_pct, 100.0)
        + 0.10 * norm(100.0 - metrics.max_drawdown_pct.abs(), 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub rank: usize,
    pub name: String,
    pub score: f64,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Exclusion {
    TooFewTrades { trades: usize, required: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    pub name: String,
    pub reason: Exclusion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub ranked: Vec<RankedCandidate>,
    pub excluded: Vec<ExcludedCandidate>,
}

impl BatchReport {
    pub fn best(&self) -> Option<&RankedCandidate> {
        self.ranked.first()
    }
}

enum Outcome {
    Scored { name: String, score: f64, metrics: Metrics },
    Excluded(ExcludedCandidate),
}

pub struct BatchRunner {
    engine: EngineConfig,
    batch: BatchConfig,
}

impl BatchRunner {
    pub fn new(engine: EngineConfig, batch: BatchConfig) -> Self {
        BatchRunner { engine, batch }
    }

    /// Runs every candidate against `bars`. A candidate that fails is
    /// excluded with its error; malformed data aborts the whole batch.
    pub fn run<F>(
        &self,
        bars: &[Bar],
        candidates: &[StrategySet],
        make_broker: F,
    ) -> Result<BatchReport, ConfluenceError>
    where
        F: Fn(&EngineConfig) -> Box<dyn BrokerPort> + Sync,
    {
        tracing::info!(
            candidates = candidates.len(),
            bars = bars.len(),
            parallel = self.batch.parallel,
            "batch started"
        );

        let outcomes: Vec<Outcome> = if self.batch.parallel {
            candidates
                .par_iter()
                .map(|set| self.run_one(bars, set, &make_broker))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            candidates
                .iter()
                .map(|set| self.run_one(bars, set, &make_broker))
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut scored = Vec::new();
        let mut excluded = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Scored { name, score, metrics } => scored.push((name, score, metrics)),
                Outcome::Excluded(candidate) => excluded.push(candidate),
            }
        }

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.2.max_drawdown_pct.abs().total_cmp(&b.2.max_drawdown_pct.abs()))
                .then_with(|| a.0.cmp(&b.0))
        });
        let ranked: Vec<RankedCandidate> = scored
            .into_iter()
            .enumerate()
            .map(|(i, (name, score, metrics))| RankedCandidate {
                rank: i + 1,
                name,
                score,
                metrics,
            })
            .collect();

        if let Some(best) = ranked.first() {
            tracing::info!(name = %best.name, score = best.score, "batch winner");
        }
        Ok(BatchReport { ranked, excluded })
    }

    fn run_one<F>(&self, bars: &[Bar], set: &StrategySet, make_broker: &F) -> Result<Outcome, ConfluenceError>
    where
        F: Fn(&EngineConfig) -> Box<dyn BrokerPort> + Sync,
    {
        let result = ExecutionEngine::new(&self.engine, set, make_broker(&self.engine))
            .and_then(|engine| engine.run(bars));
        let result = match result {
            Ok(result) => result,
            Err(err @ ConfluenceError::DataValidation { .. }) => return Err(err),
            Err(err) => {
                tracing::warn!(candidate = %set.name, %err, "candidate failed");
                return Ok(Outcome::Excluded(ExcludedCandidate {
                    name: set.name.clone(),
                    reason: Exclusion::Failed {
                        error: err.to_string(),
                    },
                }));
            }
        };

        let metrics = Metrics::from_run(&result, self.engine.risk_free_rate, self.engine.periods_per_year);
        let required = self.batch.min_trades_for_ranking;
        if metrics.total_trades < required {
            tracing::info!(
                candidate = %set.name,
                trades = metrics.total_trades,
                required,
                "candidate excluded from ranking"
            );
            return Ok(Outcome::Excluded(ExcludedCandidate {
                name: set.name.clone(),
                reason: Exclusion::TooFewTrades {
                    trades: metrics.total_trades,
                    required,
                },
            }));
        }

        let score = score(&metrics);
        tracing::info!(candidate = %set.name, score, trades = metrics.total_trades, "candidate scored");
        Ok(Outcome::Scored {
            name: set.name.clone(),
            score,
            metrics,
        })
    }
}
