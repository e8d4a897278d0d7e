//! CLI definition and dispatch.
//!
//! Each subcommand runs as a function returning `Result`, so tests can drive
//! the same pipeline the binary does; [`run`] maps errors to exit codes.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::event_sink::{JsonLinesSink, TracingSink};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_broker::PaperBroker;
use crate::adapters::replay_feed::ReplayFeed;
use crate::domain::batch::{BatchReport, BatchRunner, Exclusion};
use crate::domain::config::{BatchConfig, EngineConfig, ExitFill, RiskConfig, StrategySet};
use crate::domain::config_validation::{
    candidate_names, split_list, strategy_section, validate_batch_config, validate_run_config,
    BATCH, CANDIDATE_PREFIX, ENGINE, RISK, SIZING, STRATEGY_META_KEYS,
};
use crate::domain::engine::{ExecutionEngine, RunResult};
use crate::domain::error::ConfluenceError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::live::LiveRunner;
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::Bar;
use crate::domain::signal::CooperationPolicy;
use crate::domain::sizing::SizingConfig;
use crate::domain::strategy::StrategyConfig;
use crate::ports::broker_port::BrokerPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::event_port::EventSink;
use crate::ports::report_port::ReportPort;

/// Overrides `--log-level` when set, using `EnvFilter` directive syntax.
pub const LOG_ENV: &str = "CONFLUENCE_LOG";

const REPLAY_POLL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(
    name = "confluence",
    about = "Multi-strategy signal aggregation and risk-managed backtesting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// Log filter, e.g. `info` or `confluence=debug`
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    /// `text` or `json`
    #[arg(long, global = true, default_value = "text")]
    pub log_format: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one strategy set over historical bars
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// CSV file, or a directory holding `<symbol>.csv`
        #[arg(short, long)]
        data: PathBuf,
        /// Directory for trades.csv, equity.csv and performance.json
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write engine events as JSON lines to this file
        #[arg(long)]
        events: Option<PathBuf>,
        #[arg(long)]
        symbol: Option<String>,
        /// Drive the engine through the live loop, one bar per poll
        #[arg(long)]
        replay: bool,
    },
    /// Run every configured candidate and rank them
    Batch {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        sequential: bool,
    },
    /// Validate a configuration file without running anything
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn init_tracing(log_level: &str, log_format: &str) -> Result<(), String> {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| format!("invalid log filter: {err}"))?;

    let format = log_format.trim().to_lowercase();
    // A subscriber may already be installed when the CLI is driven from tests.
    if format == "json" {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .try_init();
        return Ok(());
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}

pub fn run(cli: Cli) -> ExitCode {
    if let Err(e) = init_tracing(&cli.log_level, &cli.log_format) {
        eprintln!("error: {e}");
        return ExitCode::from(2);
    }

    let outcome = match cli.command {
        Command::Backtest {
            config,
            data,
            output,
            events,
            symbol,
            replay,
        } => run_backtest(
            &config,
            &data,
            output.as_deref(),
            events.as_deref(),
            symbol.as_deref(),
            replay,
        )
        .map(|(result, metrics)| print_run_summary(&result, &metrics)),
        Command::Batch {
            config,
            data,
            output,
            symbol,
            sequential,
        } => run_batch(&config, &data, output.as_deref(), symbol.as_deref(), sequential)
            .map(|report| print_batch_summary(&report)),
        Command::Validate { config } => run_validate(&config),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ConfluenceError> {
    FileConfigAdapter::from_file(path).map_err(|e| ConfluenceError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub fn run_backtest(
    config_path: &Path,
    data_path: &Path,
    output: Option<&Path>,
    events: Option<&Path>,
    symbol: Option<&str>,
    replay: bool,
) -> Result<(RunResult, Metrics), ConfluenceError> {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_run_config(&adapter)?;

    // Stage 2: Build the immutable run configuration
    let mut engine_config = build_engine_config(&adapter)?;
    if let Some(symbol) = symbol {
        engine_config.symbol = symbol.to_string();
    }
    let set = build_strategy_set(&adapter)?;
    eprintln!(
        "Strategy set '{}': {} ({} strategies)",
        set.name,
        set.policy,
        set.strategies.iter().filter(|s| s.enabled).count()
    );

    // Stage 3: Load bars
    let bars = load_bars(data_path, &engine_config.symbol)?;
    eprintln!("Loaded {} bars for {}", bars.len(), engine_config.symbol);

    // Stage 4: Run
    let broker = Box::new(PaperBroker::new(engine_config.execution.clone()));
    let engine = ExecutionEngine::new(&engine_config, &set, broker)?;
    let mut sink: Box<dyn EventSink> = match events {
        Some(path) => Box::new(JsonLinesSink::create(path)?),
        None => Box::new(TracingSink),
    };

    let result = if replay {
        let mut feed = ReplayFeed::new(bars);
        LiveRunner::new(engine, &mut feed, sink.as_mut(), REPLAY_POLL).run()?
    } else {
        let result = engine.run(&bars)?;
        for event in &result.events {
            sink.emit(event)?;
        }
        sink.flush()?;
        result
    };

    // Stage 5: Metrics and artifacts
    let metrics = Metrics::from_run(
        &result,
        engine_config.risk_free_rate,
        engine_config.periods_per_year,
    );
    if let Some(dir) = output {
        CsvReportAdapter::new().write_run(&result, &metrics, dir)?;
        eprintln!("Artifacts written to: {}", dir.display());
    }
    Ok((result, metrics))
}

pub fn run_batch(
    config_path: &Path,
    data_path: &Path,
    output: Option<&Path>,
    symbol: Option<&str>,
    sequential: bool,
) -> Result<BatchReport, ConfluenceError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_batch_config(&adapter)?;

    let mut engine_config = build_engine_config(&adapter)?;
    if let Some(symbol) = symbol {
        engine_config.symbol = symbol.to_string();
    }
    let mut batch_config = build_batch_config(&adapter);
    if sequential {
        batch_config.parallel = false;
    }
    let candidates = build_candidates(&adapter)?;

    let bars = load_bars(data_path, &engine_config.symbol)?;
    eprintln!(
        "Running {} candidates over {} bars of {}",
        candidates.len(),
        bars.len(),
        engine_config.symbol
    );

    let runner = BatchRunner::new(engine_config, batch_config);
    let report = runner.run(&bars, &candidates, |config: &EngineConfig| {
        Box::new(PaperBroker::new(config.execution.clone())) as Box<dyn BrokerPort>
    })?;

    if let Some(dir) = output {
        CsvReportAdapter::new().write_batch(&report, dir)?;
        eprintln!("Batch report written to: {}", dir.display());
    }
    Ok(report)
}

pub fn run_validate(config_path: &Path) -> Result<(), ConfluenceError> {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = load_config(config_path)?;

    let has_run = adapter.get_string(ENGINE, "strategy_configs").is_some();
    let has_batch = !candidate_names(&adapter).is_empty();
    if !has_run && !has_batch {
        return Err(ConfluenceError::ConfigMissing {
            section: ENGINE.to_string(),
            key: "strategy_configs".to_string(),
        });
    }

    let engine_config = build_engine_config(&adapter)?;
    eprintln!("\nEngine:");
    eprintln!("  symbol:           {}", engine_config.symbol);
    eprintln!("  initial capital:  {:.2}", engine_config.initial_capital);
    eprintln!(
        "  sizing:           {}",
        if engine_config.sizing.enable_kelly {
            "kelly"
        } else {
            "fixed fraction"
        }
    );
    eprintln!(
        "  drawdown limit:   {:.1}%{}",
        engine_config.risk.max_drawdown_limit * 100.0,
        if engine_config.risk.dry_run { " (dry run)" } else { "" }
    );

    if has_run {
        validate_run_config(&adapter)?;
        let set = build_strategy_set(&adapter)?;
        print_set(&set);
    }
    if has_batch {
        validate_batch_config(&adapter)?;
        for set in build_candidates(&adapter)? {
            print_set(&set);
        }
    }

    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn print_set(set: &StrategySet) {
    eprintln!("\nStrategy set '{}' ({}):", set.name, set.policy);
    for s in &set.strategies {
        let params: Vec<String> = s.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        eprintln!(
            "  {} [{}] weight={}{} {}",
            s.id,
            s.name,
            s.weight,
            if s.enabled { "" } else { " (disabled)" },
            params.join(" ")
        );
    }
}

pub fn load_bars(data_path: &Path, symbol: &str) -> Result<Vec<Bar>, ConfluenceError> {
    let bars = CsvAdapter::new(data_path.to_path_buf()).fetch_bars(symbol)?;
    if bars.is_empty() {
        return Err(ConfluenceError::DataSource {
            reason: format!("no bars for {} in {}", symbol, data_path.display()),
        });
    }
    Ok(bars)
}

fn parse_field<T>(adapter: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, ConfluenceError>
where
    T: std::str::FromStr<Err = String>,
{
    match adapter.get_string(section, key) {
        Some(raw) => raw.parse().map_err(|reason| ConfluenceError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason,
        }),
        None => Ok(default),
    }
}

pub fn build_engine_config(adapter: &dyn ConfigPort) -> Result<EngineConfig, ConfluenceError> {
    let defaults = EngineConfig::default();
    let risk = RiskConfig::default();
    let sizing = SizingConfig::default();

    Ok(EngineConfig {
        symbol: adapter
            .get_string(ENGINE, "symbol")
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.symbol),
        initial_capital: adapter.get_double(ENGINE, "initial_capital", defaults.initial_capital),
        allow_shorting: adapter.get_bool(ENGINE, "allow_shorting", defaults.allow_shorting),
        exit_fill: parse_field::<ExitFill>(adapter, ENGINE, "exit_fill", defaults.exit_fill)?,
        close_at_end: adapter.get_bool(ENGINE, "close_at_end", defaults.close_at_end),
        window_size: adapter
            .get_int(ENGINE, "window_size", defaults.window_size as i64)
            .max(1) as usize,
        risk: RiskConfig {
            max_drawdown_limit: adapter.get_double(RISK, "max_drawdown_limit", risk.max_drawdown_limit),
            enable_trailing_stop: adapter.get_bool(RISK, "enable_trailing_stop", risk.enable_trailing_stop),
            trailing_stop_percent: adapter.get_double(
                RISK,
                "trailing_stop_percent",
                risk.trailing_stop_percent,
            ),
            dry_run: adapter.get_bool(RISK, "dry_run", risk.dry_run),
        },
        sizing: SizingConfig {
            position_pct: adapter.get_double(SIZING, "position_pct", sizing.position_pct),
            enable_kelly: adapter.get_bool(SIZING, "enable_kelly_criterion", sizing.enable_kelly),
            kelly_fraction: adapter.get_double(SIZING, "kelly_fraction", sizing.kelly_fraction),
            max_position_pct: adapter.get_double(
                SIZING,
                "kelly_max_position_pct",
                sizing.max_position_pct,
            ),
            kelly_lookback: adapter
                .get_int(SIZING, "kelly_lookback", sizing.kelly_lookback as i64)
                .max(1) as usize,
        },
        execution: ExecutionConfig {
            commission_per_trade: adapter.get_double(ENGINE, "commission_per_trade", 0.0),
            commission_pct: adapter.get_double(ENGINE, "commission_pct", 0.0),
            slippage_pct: adapter.get_double(ENGINE, "slippage_pct", 0.0),
        },
        risk_free_rate: adapter.get_double(ENGINE, "risk_free_rate", defaults.risk_free_rate),
        periods_per_year: adapter.get_double(ENGINE, "periods_per_year", defaults.periods_per_year),
    })
}

/// Reads `[strategy.<id>]`. Keys other than `name`, `enabled` and `weight`
/// become numeric parameters.
pub fn build_strategy_config(adapter: &dyn ConfigPort, id: &str) -> Result<StrategyConfig, ConfluenceError> {
    let section = strategy_section(id);
    let name = adapter
        .get_string(&section, "name")
        .ok_or_else(|| ConfluenceError::ConfigMissing {
            section: section.clone(),
            key: "name".into(),
        })?;

    let mut config = StrategyConfig::new(&name.trim().to_lowercase())
        .with_id(id)
        .with_weight(adapter.get_double(&section, "weight", 1.0));
    if !adapter.get_bool(&section, "enabled", true) {
        config = config.disabled();
    }

    for key in adapter.keys(&section) {
        if STRATEGY_META_KEYS.contains(&key.as_str()) {
            continue;
        }
        let raw = adapter.get_string(&section, &key).unwrap_or_default();
        let value: f64 = raw.trim().parse().map_err(|_| ConfluenceError::ConfigInvalid {
            section: section.clone(),
            key: key.clone(),
            reason: format!("'{raw}' is not a number"),
        })?;
        config = config.with_param(&key, value);
    }
    Ok(config)
}

fn build_set(adapter: &dyn ConfigPort, section: &str, name: &str, ids: &[String]) -> Result<StrategySet, ConfluenceError> {
    let strategies = ids
        .iter()
        .map(|id| build_strategy_config(adapter, id))
        .collect::<Result<Vec<_>, _>>()?;
    let policy = parse_field::<CooperationPolicy>(
        adapter,
        section,
        "cooperation_policy",
        CooperationPolicy::default(),
    )?;

    let set = StrategySet::new(name, strategies, policy);
    Ok(match adapter.get_string(section, "weighted_threshold") {
        Some(_) => set.with_threshold(adapter.get_double(section, "weighted_threshold", 0.0)),
        None => set,
    })
}

/// The single set a backtest runs: `[engine] strategy_configs`.
pub fn build_strategy_set(adapter: &dyn ConfigPort) -> Result<StrategySet, ConfluenceError> {
    let ids = adapter
        .get_string(ENGINE, "strategy_configs")
        .map(|raw| split_list(&raw))
        .unwrap_or_default();
    if ids.is_empty() {
        return Err(ConfluenceError::ConfigMissing {
            section: ENGINE.into(),
            key: "strategy_configs".into(),
        });
    }
    let name = adapter
        .get_string(ENGINE, "name")
        .unwrap_or_else(|| ids.join("+"));
    build_set(adapter, ENGINE, &name, &ids)
}

/// One set per `[candidate.<name>]`, in section-name order.
pub fn build_candidates(adapter: &dyn ConfigPort) -> Result<Vec<StrategySet>, ConfluenceError> {
    candidate_names(adapter)
        .into_iter()
        .map(|name| {
            let section = format!("{CANDIDATE_PREFIX}{name}");
            let ids = adapter
                .get_string(&section, "strategies")
                .map(|raw| split_list(&raw))
                .unwrap_or_default();
            if ids.is_empty() {
                return Err(ConfluenceError::ConfigMissing {
                    section,
                    key: "strategies".into(),
                });
            }
            build_set(adapter, &section, &name, &ids)
        })
        .collect()
}

pub fn build_batch_config(adapter: &dyn ConfigPort) -> BatchConfig {
    let defaults = BatchConfig::default();
    BatchConfig {
        min_trades_for_ranking: adapter
            .get_int(BATCH, "min_trades_for_ranking", defaults.min_trades_for_ranking as i64)
            .max(0) as usize,
        parallel: adapter.get_bool(BATCH, "parallel", defaults.parallel),
    }
}

fn print_run_summary(result: &RunResult, metrics: &Metrics) {
    eprintln!("\n=== Results: {} on {} ===", result.strategy_set, result.symbol);
    eprintln!("Bars Processed:   {}", result.bars_processed);
    eprintln!("Final Equity:     {:.2}", metrics.final_equity);
    eprintln!("Total Return:     {:.2}%", metrics.roi_pct);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return_pct);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Calmar Ratio:     {:.2}", metrics.calmar_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown_pct);
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate_pct);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!("Fees Paid:        {:.2}", metrics.total_fees);
    match result.breaker_triggered_at {
        Some(at) => eprintln!("Circuit Breaker:  TRIGGERED at {at}"),
        None => eprintln!("Circuit Breaker:  normal"),
    }
    if !result.gated.is_empty() {
        eprintln!("Gated Entries:    {}", result.gated.len());
    }
}

fn print_batch_summary(report: &BatchReport) {
    eprintln!("\n=== Ranking ===");
    for c in &report.ranked {
        eprintln!(
            "  #{} {:<20} score {:>6.2}  return {:>7.2}%  sharpe {:>5.2}  mdd -{:.1}%  trades {}",
            c.rank,
            c.name,
            c.score,
            c.metrics.roi_pct,
            c.metrics.sharpe_ratio,
            c.metrics.max_drawdown_pct,
            c.metrics.total_trades,
        );
    }
    if !report.excluded.is_empty() {
        eprintln!("\n=== Excluded ===");
        for e in &report.excluded {
            match &e.reason {
                Exclusion::TooFewTrades { trades, required } => {
                    eprintln!("  {}: {} trades (needs {})", e.name, trades, required)
                }
                Exclusion::Failed { error } => eprintln!("  {}: {}", e.name, error),
            }
        }
    }
    match report.best() {
        Some(best) => eprintln!("\nBest: {} (score {:.2})", best.name, best.score),
        None => eprintln!("\nNo candidate qualified for ranking"),
    }
}
