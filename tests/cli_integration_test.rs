//! CLI integration tests for the command pipelines.
//!
//! Tests cover:
//! - Config parsing (build_engine_config, build_strategy_set, build_candidates)
//! - Validation of real INI files on disk
//! - Full backtest pipeline: CSV bars in, artifacts and event log out
//! - Replay mode through the live loop
//! - Batch pipeline and its report
//! - Argument parsing and exit codes

mod common;

use clap::Parser;
use common::*;
use confluence::adapters::csv_report_adapter::{
    BATCH_FILE, EQUITY_FILE, PERFORMANCE_FILE, TRADES_FILE,
};
use confluence::adapters::file_config_adapter::FileConfigAdapter;
use confluence::cli::{self, Cli, Command};
use confluence::domain::batch::BatchReport;
use confluence::domain::config::ExitFill;
use confluence::domain::error::ConfluenceError;
use confluence::domain::signal::CooperationPolicy;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const VALID_INI: &str = r#"
[engine]
symbol = TEST
initial_capital = 50000
allow_shorting = false
exit_fill = next_open
commission_per_trade = 1.0
commission_pct = 0.001
slippage_pct = 0.0005
risk_free_rate = 0.02
periods_per_year = 8760
strategy_configs = fast, momentum
cooperation_policy = WEIGHTED
weighted_threshold = 1.5

[risk]
max_drawdown_limit = 0.15
enable_trailing_stop = true
trailing_stop_percent = 4

[sizing]
position_pct = 0.2
enable_kelly_criterion = true
kelly_fraction = 0.5
kelly_max_position_pct = 0.3
kelly_lookback = 15

[batch]
min_trades_for_ranking = 2
parallel = true

[strategy.fast]
name = ma_crossover
short_period = 10
long_period = 30

[strategy.momentum]
name = rsi
weight = 2
period = 14
oversold = 30
overbought = 70

[strategy.bands]
name = bollinger
enabled = false
period = 20
std_dev = 2

[candidate.trend]
strategies = fast

[candidate.blend]
strategies = fast, momentum
cooperation_policy = OR
"#;

/// Minimal single-strategy backtest config.
const SIMPLE_INI: &str = r#"
[engine]
symbol = TEST
strategy_configs = fast

[strategy.fast]
name = ma_crossover
short_period = 10
long_period = 30
"#;

fn adapter(content: &str) -> FileConfigAdapter {
    FileConfigAdapter::from_string(content).unwrap()
}

/// Temp dir holding `TEST.csv` with `count` simulated bars.
fn data_dir(count: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    write_csv(&dir.path().join("TEST.csv"), &sine_bars(count));
    dir
}

fn exit_code(err: &ConfluenceError) -> String {
    format!("{:?}", ExitCode::from(err))
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

mod config_loading {
    use super::*;

    #[test]
    fn engine_config_reads_every_section() {
        let config = cli::build_engine_config(&adapter(VALID_INI)).unwrap();
        assert_eq!(config.symbol, "TEST");
        assert_eq!(config.initial_capital, 50_000.0);
        assert!(!config.allow_shorting);
        assert_eq!(config.exit_fill, ExitFill::NextOpen);
        assert!(config.close_at_end);
        assert_eq!(config.execution.commission_per_trade, 1.0);
        assert_eq!(config.execution.commission_pct, 0.001);
        assert_eq!(config.execution.slippage_pct, 0.0005);
        assert_eq!(config.risk_free_rate, 0.02);
        assert_eq!(config.periods_per_year, 8760.0);

        assert_eq!(config.risk.max_drawdown_limit, 0.15);
        assert!(config.risk.enable_trailing_stop);
        assert_eq!(config.risk.trailing_stop_percent, 4.0);
        assert!(!config.risk.dry_run);

        assert_eq!(config.sizing.position_pct, 0.2);
        assert!(config.sizing.enable_kelly);
        assert_eq!(config.sizing.kelly_fraction, 0.5);
        assert_eq!(config.sizing.max_position_pct, 0.3);
        assert_eq!(config.sizing.kelly_lookback, 15);
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let config = cli::build_engine_config(&adapter(SIMPLE_INI)).unwrap();
        assert_eq!(config.initial_capital, 10_000.0);
        assert!(config.allow_shorting);
        assert_eq!(config.exit_fill, ExitFill::Close);
        assert_eq!(config.risk.max_drawdown_limit, 0.20);
        assert!(!config.sizing.enable_kelly);
        assert_eq!(config.sizing.position_pct, 0.10);
    }

    #[test]
    fn bad_exit_fill_is_a_config_error() {
        let ini = "[engine]\nexit_fill = tomorrow\n";
        let err = cli::build_engine_config(&adapter(ini)).unwrap_err();
        assert!(
            matches!(err, ConfluenceError::ConfigInvalid { ref key, .. } if key == "exit_fill"),
            "{err}"
        );
    }

    #[test]
    fn strategy_set_from_engine_section() {
        let set = cli::build_strategy_set(&adapter(VALID_INI)).unwrap();
        assert_eq!(set.name, "fast+momentum");
        assert_eq!(set.policy, CooperationPolicy::Weighted);
        assert_eq!(set.weighted_threshold, Some(1.5));
        assert_eq!(set.strategies.len(), 2);

        let fast = &set.strategies[0];
        assert_eq!(fast.id, "fast");
        assert_eq!(fast.name, "ma_crossover");
        assert_eq!(fast.param("short_period", 0.0), 10.0);
        assert_eq!(fast.param("long_period", 0.0), 30.0);
        assert_eq!(fast.weight, 1.0);

        let momentum = &set.strategies[1];
        assert_eq!(momentum.name, "rsi");
        assert_eq!(momentum.weight, 2.0);
        assert!(!momentum.params.contains_key("weight"));
        assert_eq!(momentum.params.len(), 3);
    }

    #[test]
    fn named_set_and_disabled_strategy() {
        let ini = r#"
[engine]
name = Bands Only
strategy_configs = bands

[strategy.bands]
name = BOLLINGER
enabled = false
"#;
        let set = cli::build_strategy_set(&adapter(ini)).unwrap();
        assert_eq!(set.name, "Bands Only");
        assert_eq!(set.strategies[0].name, "bollinger");
        assert!(!set.strategies[0].enabled);
        assert_eq!(set.weighted_threshold, None);
    }

    #[test]
    fn missing_strategy_list() {
        let err = cli::build_strategy_set(&adapter("[engine]\nsymbol = X\n")).unwrap_err();
        assert!(matches!(err, ConfluenceError::ConfigMissing { ref key, .. } if key == "strategy_configs"));
    }

    #[test]
    fn non_numeric_parameter() {
        let ini = "[engine]\nstrategy_configs = x\n\n[strategy.x]\nname = rsi\nperiod = fourteen\n";
        let err = cli::build_strategy_set(&adapter(ini)).unwrap_err();
        assert!(matches!(err, ConfluenceError::ConfigInvalid { ref key, .. } if key == "period"));
    }

    #[test]
    fn candidates_sorted_by_name() {
        let candidates = cli::build_candidates(&adapter(VALID_INI)).unwrap();
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["blend", "trend"]);
        assert_eq!(candidates[0].policy, CooperationPolicy::Or);
        assert_eq!(candidates[0].strategies.len(), 2);
        assert_eq!(candidates[1].strategies[0].id, "fast");
    }

    #[test]
    fn batch_section() {
        let batch = cli::build_batch_config(&adapter(VALID_INI));
        assert_eq!(batch.min_trades_for_ranking, 2);
        assert!(batch.parallel);
    }

    #[test]
    fn unreadable_config_file() {
        let err = cli::load_config(Path::new("/nonexistent/confluence.ini"))
            .err()
            .unwrap();
        assert!(matches!(err, ConfluenceError::ConfigParse { .. }));
    }
}

mod validate {
    use super::*;

    #[test]
    fn valid_config_passes() {
        let file = write_temp_ini(VALID_INI);
        cli::run_validate(file.path()).unwrap();
    }

    #[test]
    fn nothing_to_run() {
        let file = write_temp_ini("[engine]\nsymbol = TEST\n");
        let err = cli::run_validate(file.path()).unwrap_err();
        assert!(matches!(err, ConfluenceError::ConfigMissing { .. }));
        assert_eq!(exit_code(&err), format!("{:?}", ExitCode::from(2)));
    }

    #[test]
    fn unknown_strategy_name() {
        let file = write_temp_ini("[engine]\nstrategy_configs = x\n\n[strategy.x]\nname = macd\n");
        let err = cli::run_validate(file.path()).unwrap_err();
        assert!(err.to_string().contains("unknown strategy 'macd'"), "{err}");
    }

    #[test]
    fn dangling_strategy_reference() {
        let file = write_temp_ini("[engine]\nstrategy_configs = fast, ghost\n\n[strategy.fast]\nname = rsi\n");
        let err = cli::run_validate(file.path()).unwrap_err();
        assert!(err.to_string().contains("strategy.ghost"), "{err}");
    }

    #[test]
    fn out_of_range_risk_limit() {
        let file = write_temp_ini(&format!("{SIMPLE_INI}\n[risk]\nmax_drawdown_limit = 1.5\n"));
        let err = cli::run_validate(file.path()).unwrap_err();
        assert!(matches!(err, ConfluenceError::ConfigInvalid { ref key, .. } if key == "max_drawdown_limit"));
    }

    #[test]
    fn misspelled_boolean_flag() {
        let file = write_temp_ini(&format!("{SIMPLE_INI}\n[risk]\nenable_trailing_stop = ture\n"));
        let err = cli::run_validate(file.path()).unwrap_err();
        assert!(matches!(err, ConfluenceError::ConfigInvalid { ref key, .. } if key == "enable_trailing_stop"));
        assert_eq!(exit_code(&err), format!("{:?}", ExitCode::from(2)));
    }
}

mod backtest_pipeline {
    use super::*;

    #[test]
    fn writes_artifacts_and_event_log() {
        let config = write_temp_ini(SIMPLE_INI);
        let data = data_dir(400);
        let out = TempDir::new().unwrap();
        let events = out.path().join("logs").join("events.jsonl");

        let (result, metrics) = cli::run_backtest(
            config.path(),
            data.path(),
            Some(out.path()),
            Some(&events),
            None,
            false,
        )
        .unwrap();

        assert_eq!(result.symbol, "TEST");
        assert_eq!(result.strategy_set, "fast");
        assert_eq!(result.bars_processed, 400);
        assert!(metrics.total_trades > 0);

        // header + one row per bar
        assert_eq!(read_lines(&out.path().join(EQUITY_FILE)).len(), 401);
        assert_eq!(
            read_lines(&out.path().join(TRADES_FILE)).len(),
            result.trades.len() + 1
        );

        let perf: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.path().join(PERFORMANCE_FILE)).unwrap())
                .unwrap();
        assert_eq!(perf["strategy_set"], "fast");
        assert_eq!(perf["bars_processed"], 400);
        assert_eq!(perf["metrics"]["total_trades"], metrics.total_trades);

        let lines = read_lines(&events);
        assert_eq!(lines.len(), result.events.len());
        let last: serde_json::Value = serde_json::from_str(lines.last().unwrap()).unwrap();
        assert_eq!(last["event"], "phase_summary");
        assert_eq!(last["bars"], 400);
    }

    #[test]
    fn replay_mode_matches_batch_mode() {
        let config = write_temp_ini(VALID_INI);
        let data = data_dir(500);

        let (direct, direct_metrics) =
            cli::run_backtest(config.path(), data.path(), None, None, None, false).unwrap();
        let (replayed, replay_metrics) =
            cli::run_backtest(config.path(), data.path(), None, None, None, true).unwrap();

        assert_eq!(direct, replayed);
        assert_eq!(direct_metrics, replay_metrics);
    }

    #[test]
    fn data_file_path_and_symbol_override() {
        let config = write_temp_ini(SIMPLE_INI);
        let dir = TempDir::new().unwrap();
        let file: PathBuf = dir.path().join("anything.csv");
        write_csv(&file, &sine_bars(200));

        let (result, _) =
            cli::run_backtest(config.path(), &file, None, None, Some("OTHER"), false).unwrap();
        assert_eq!(result.symbol, "OTHER");
        assert_eq!(result.bars_processed, 200);
    }

    #[test]
    fn missing_symbol_file() {
        let config = write_temp_ini(SIMPLE_INI);
        let data = data_dir(50);
        let err = cli::run_backtest(config.path(), data.path(), None, None, Some("NOPE"), false)
            .unwrap_err();
        assert!(matches!(err, ConfluenceError::DataSource { .. }));
        assert_eq!(exit_code(&err), format!("{:?}", ExitCode::from(3)));
    }

    #[test]
    fn header_only_csv_is_empty_data() {
        let config = write_temp_ini(SIMPLE_INI);
        let dir = TempDir::new().unwrap();
        write_csv(&dir.path().join("TEST.csv"), &[]);
        let err = cli::run_backtest(config.path(), dir.path(), None, None, None, false).unwrap_err();
        assert!(err.to_string().contains("no bars for TEST"), "{err}");
    }

    #[test]
    fn inconsistent_bar_aborts_the_run() {
        let config = write_temp_ini(SIMPLE_INI);
        let dir = TempDir::new().unwrap();
        let mut bars = sine_bars(60);
        bars[40].high = bars[40].low - 5.0;
        write_csv(&dir.path().join("TEST.csv"), &bars);

        let err = cli::run_backtest(config.path(), dir.path(), None, None, None, false).unwrap_err();
        assert!(matches!(err, ConfluenceError::DataValidation { .. }), "{err}");
        assert_eq!(exit_code(&err), format!("{:?}", ExitCode::from(5)));
    }

    #[test]
    fn invalid_strategy_parameters_fail_before_running() {
        let ini = "[engine]\nstrategy_configs = fast\n\n[strategy.fast]\nname = ma_crossover\nshort_period = 40\nlong_period = 20\n";
        let config = write_temp_ini(ini);
        let data = data_dir(100);
        let err = cli::run_backtest(config.path(), data.path(), None, None, None, false).unwrap_err();
        assert!(matches!(err, ConfluenceError::InvalidParameter { .. }), "{err}");
        assert_eq!(exit_code(&err), format!("{:?}", ExitCode::from(4)));
    }
}

mod batch_pipeline {
    use super::*;

    #[test]
    fn writes_ranked_report() {
        let config = write_temp_ini(VALID_INI);
        let data = data_dir(800);
        let out = TempDir::new().unwrap();

        let report = cli::run_batch(config.path(), data.path(), Some(out.path()), None, false).unwrap();
        assert_eq!(report.ranked.len() + report.excluded.len(), 2);
        for (i, candidate) in report.ranked.iter().enumerate() {
            assert_eq!(candidate.rank, i + 1);
            assert!(candidate.metrics.total_trades >= 2);
        }

        let written: BatchReport =
            serde_json::from_str(&std::fs::read_to_string(out.path().join(BATCH_FILE)).unwrap())
                .unwrap();
        let names = |r: &BatchReport| r.ranked.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&written), names(&report));
        assert_eq!(written.excluded.len(), report.excluded.len());
    }

    #[test]
    fn sequential_matches_parallel() {
        let config = write_temp_ini(VALID_INI);
        let data = data_dir(600);
        let parallel = cli::run_batch(config.path(), data.path(), None, None, false).unwrap();
        let sequential = cli::run_batch(config.path(), data.path(), None, None, true).unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn batch_without_candidates() {
        let config = write_temp_ini(SIMPLE_INI);
        let data = data_dir(100);
        let err = cli::run_batch(config.path(), data.path(), None, None, false).unwrap_err();
        assert!(matches!(err, ConfluenceError::ConfigMissing { ref key, .. } if key == "strategies"));
    }
}

mod arguments {
    use super::*;

    #[test]
    fn backtest_arguments() {
        let cli = Cli::try_parse_from([
            "confluence",
            "--log-level",
            "debug",
            "backtest",
            "-c",
            "run.ini",
            "-d",
            "data",
            "--events",
            "events.jsonl",
            "--replay",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.log_format, "text");
        match cli.command {
            Command::Backtest {
                config,
                data,
                output,
                events,
                symbol,
                replay,
            } => {
                assert_eq!(config, PathBuf::from("run.ini"));
                assert_eq!(data, PathBuf::from("data"));
                assert_eq!(output, None);
                assert_eq!(events, Some(PathBuf::from("events.jsonl")));
                assert_eq!(symbol, None);
                assert!(replay);
            }
            other => panic!("expected backtest, got {other:?}"),
        }
    }

    #[test]
    fn batch_and_validate_arguments() {
        let cli = Cli::try_parse_from([
            "confluence",
            "batch",
            "--config",
            "sweep.ini",
            "--data",
            "bars.csv",
            "--sequential",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, "json");
        assert!(matches!(cli.command, Command::Batch { sequential: true, .. }));

        let cli = Cli::try_parse_from(["confluence", "validate", "-c", "run.ini"]).unwrap();
        assert!(matches!(cli.command, Command::Validate { .. }));
    }

    #[test]
    fn missing_required_argument() {
        assert!(Cli::try_parse_from(["confluence", "backtest", "-c", "run.ini"]).is_err());
    }

    #[test]
    fn run_maps_errors_to_exit_codes() {
        let cli = Cli::try_parse_from(["confluence", "validate", "-c", "/nonexistent/run.ini"]).unwrap();
        assert_eq!(format!("{:?}", cli::run(cli)), format!("{:?}", ExitCode::from(2)));

        let file = write_temp_ini(VALID_INI);
        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::try_parse_from(["confluence", "validate", "-c", path.as_str()]).unwrap();
        assert_eq!(format!("{:?}", cli::run(cli)), format!("{:?}", ExitCode::SUCCESS));
    }
}
