//! Configuration validation.
//!
//! Checks every section a run reads before any data is loaded, so a bad
//! value fails fast with the section and key that caused it.

use crate::domain::config::ExitFill;
use crate::domain::error::ConfluenceError;
use crate::domain::signal::CooperationPolicy;
use crate::domain::strategy::STRATEGY_NAMES;
use crate::ports::config_port::ConfigPort;

pub const ENGINE: &str = "engine";
pub const RISK: &str = "risk";
pub const SIZING: &str = "sizing";
pub const BATCH: &str = "batch";
pub const STRATEGY_PREFIX: &str = "strategy.";
pub const CANDIDATE_PREFIX: &str = "candidate.";

/// Keys of a `[strategy.<id>]` section that are not strategy parameters.
pub const STRATEGY_META_KEYS: [&str; 3] = ["name", "enabled", "weight"];

/// Splits a comma-separated list, dropping blanks. Ids are case-folded to
/// match section names.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn strategy_section(id: &str) -> String {
    format!("{STRATEGY_PREFIX}{id}")
}

/// Every `[candidate.<name>]` section name with the prefix stripped.
pub fn candidate_names(config: &dyn ConfigPort) -> Vec<String> {
    config
        .sections()
        .into_iter()
        .filter_map(|s| s.strip_prefix(CANDIDATE_PREFIX).map(str::to_string))
        .collect()
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ConfluenceError {
    ConfluenceError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> ConfluenceError {
    ConfluenceError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// Reads a number, failing on text that does not parse instead of falling
/// back to the default.
fn number(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, ConfluenceError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

/// Accepts the same spellings the config adapter reads as booleans.
fn boolean(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), ConfluenceError> {
    match config.get_string(section, key) {
        None => Ok(()),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "false" | "yes" | "no" | "1" | "0" => Ok(()),
            _ => Err(invalid(
                section,
                key,
                format!("'{raw}' is not a boolean (true/false, yes/no, 1/0)"),
            )),
        },
    }
}

fn in_range(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
    ok: impl Fn(f64) -> bool,
    expected: &str,
) -> Result<(), ConfluenceError> {
    let value = number(config, section, key, default)?;
    if !ok(value) {
        return Err(invalid(section, key, format!("{key} must be {expected}")));
    }
    Ok(())
}

fn whole(config: &dyn ConfigPort, section: &str, key: &str, min: f64) -> Result<(), ConfluenceError> {
    let value = number(config, section, key, min)?;
    if value < min || value.fract() != 0.0 {
        return Err(invalid(section, key, format!("{key} must be a whole number >= {min}")));
    }
    Ok(())
}

fn policy(config: &dyn ConfigPort, section: &str) -> Result<(), ConfluenceError> {
    if let Some(raw) = config.get_string(section, "cooperation_policy") {
        raw.parse::<CooperationPolicy>()
            .map_err(|reason| invalid(section, "cooperation_policy", reason))?;
    }
    in_range(config, section, "weighted_threshold", 1.0, |v| v > 0.0, "positive")
}

/// `[engine]`, `[risk]`, `[sizing]` and every strategy the engine lists.
pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), ConfluenceError> {
    validate_engine_config(config)?;
    validate_risk_config(config)?;
    validate_sizing_config(config)?;
    validate_strategy_sections(config)?;
    let ids = engine_strategy_ids(config)?;
    validate_strategy_refs(config, ENGINE, &ids)
}

/// Everything a batch reads: the shared engine settings and every candidate.
pub fn validate_batch_config(config: &dyn ConfigPort) -> Result<(), ConfluenceError> {
    validate_engine_config(config)?;
    validate_risk_config(config)?;
    validate_sizing_config(config)?;
    validate_strategy_sections(config)?;
    whole(config, BATCH, "min_trades_for_ranking", 0.0)?;
    boolean(config, BATCH, "parallel")?;

    let candidates = candidate_names(config);
    if candidates.is_empty() {
        return Err(missing("candidate.<name>", "strategies"));
    }
    for name in candidates {
        let section = format!("{CANDIDATE_PREFIX}{name}");
        let ids = config
            .get_string(&section, "strategies")
            .map(|raw| split_list(&raw))
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| missing(&section, "strategies"))?;
        policy(config, &section)?;
        validate_strategy_refs(config, &section, &ids)?;
    }
    Ok(())
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), ConfluenceError> {
    if let Some(symbol) = config.get_string(ENGINE, "symbol") {
        if symbol.trim().is_empty() {
            return Err(invalid(ENGINE, "symbol", "symbol must not be empty"));
        }
    }
    in_range(config, ENGINE, "initial_capital", 10_000.0, |v| v > 0.0, "positive")?;
    in_range(config, ENGINE, "commission_per_trade", 0.0, |v| v >= 0.0, "non-negative")?;
    in_range(config, ENGINE, "commission_pct", 0.0, |v| v >= 0.0, "non-negative")?;
    in_range(config, ENGINE, "slippage_pct", 0.0, |v| v >= 0.0, "non-negative")?;
    in_range(
        config,
        ENGINE,
        "risk_free_rate",
        0.0,
        |v| (0.0..1.0).contains(&v),
        "between 0 and 1",
    )?;
    in_range(config, ENGINE, "periods_per_year", 252.0, |v| v > 0.0, "positive")?;
    whole(config, ENGINE, "window_size", 1.0)?;
    boolean(config, ENGINE, "allow_shorting")?;
    boolean(config, ENGINE, "close_at_end")?;
    if let Some(raw) = config.get_string(ENGINE, "exit_fill") {
        raw.parse::<ExitFill>()
            .map_err(|reason| invalid(ENGINE, "exit_fill", reason))?;
    }
    policy(config, ENGINE)
}

pub fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), ConfluenceError> {
    boolean(config, RISK, "enable_trailing_stop")?;
    boolean(config, RISK, "dry_run")?;
    in_range(
        config,
        RISK,
        "max_drawdown_limit",
        0.20,
        |v| v > 0.0 && v <= 1.0,
        "in (0, 1]",
    )?;
    in_range(
        config,
        RISK,
        "trailing_stop_percent",
        5.0,
        |v| v > 0.0 && v < 100.0,
        "a percentage in (0, 100)",
    )
}

pub fn validate_sizing_config(config: &dyn ConfigPort) -> Result<(), ConfluenceError> {
    boolean(config, SIZING, "enable_kelly_criterion")?;
    let fraction = |v: f64| v > 0.0 && v <= 1.0;
    in_range(config, SIZING, "position_pct", 0.10, fraction, "in (0, 1]")?;
    in_range(config, SIZING, "kelly_fraction", 0.5, fraction, "in (0, 1]")?;
    in_range(config, SIZING, "kelly_max_position_pct", 0.25, fraction, "in (0, 1]")?;
    whole(config, SIZING, "kelly_lookback", 1.0)
}

/// Every `[strategy.<id>]` section: a known `name`, a boolean `enabled`, a
/// non-negative `weight` and numeric parameters.
pub fn validate_strategy_sections(config: &dyn ConfigPort) -> Result<(), ConfluenceError> {
    for section in config.sections() {
        if !section.starts_with(STRATEGY_PREFIX) {
            continue;
        }
        let name = config
            .get_string(&section, "name")
            .ok_or_else(|| missing(&section, "name"))?;
        let name = name.trim().to_lowercase();
        if !STRATEGY_NAMES.contains(&name.as_str()) {
            return Err(invalid(
                &section,
                "name",
                format!("unknown strategy '{name}' (expected one of {})", STRATEGY_NAMES.join(", ")),
            ));
        }
        boolean(config, &section, "enabled")?;
        in_range(config, &section, "weight", 1.0, |v| v >= 0.0, "non-negative")?;
        for key in config.keys(&section) {
            if STRATEGY_META_KEYS.contains(&key.as_str()) {
                continue;
            }
            number(config, &section, &key, 0.0)?;
        }
    }
    Ok(())
}

fn engine_strategy_ids(config: &dyn ConfigPort) -> Result<Vec<String>, ConfluenceError> {
    config
        .get_string(ENGINE, "strategy_configs")
        .map(|raw| split_list(&raw))
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| missing(ENGINE, "strategy_configs"))
}

fn validate_strategy_refs(config: &dyn ConfigPort, from: &str, ids: &[String]) -> Result<(), ConfluenceError> {
    let sections = config.sections();
    for id in ids {
        let section = strategy_section(id);
        if !sections.contains(&section) {
            return Err(invalid(
                from,
                "strategies",
                format!("no [{section}] section for strategy '{id}'"),
            ));
        }
    }
    Ok(())
}
