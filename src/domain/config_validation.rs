//! Configuration validation.
//!
//! Checks the `[backtest]` and `[strategy]` sections before any data is
//! loaded, and turns them into a [`BacktestRequest`].

use crate::domain::backtest::{BacktestRequest, DEFAULT_INITIAL_CAPITAL};
use crate::domain::error::EngineError;
use crate::domain::metrics::{MetricsConfig, DEFAULT_RISK_FREE_RATE};
use crate::domain::params::StrategyParams;
use crate::domain::strategy::StrategyKind;
use crate::ports::config_port::ConfigPort;

/// `[strategy]` keys that are not strategy parameters.
const RESERVED_STRATEGY_KEYS: [&str; 2] = ["type", "script_file"];

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<StrategyKind, EngineError> {
    match config.get_string("strategy", "type") {
        Some(s) if !s.trim().is_empty() => s.parse(),
        _ => Err(EngineError::ConfigMissing {
            section: "strategy".to_string(),
            key: "type".to_string(),
        }),
    }
}

/// A `[backtest]` number: `default` when the key is absent or blank, an error
/// when it is present but not a number.
fn backtest_number(config: &dyn ConfigPort, key: &str, default: f64) -> Result<f64, EngineError> {
    match config.get_string("backtest", key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            EngineError::config_invalid("backtest", key, format!("expected a number, got '{}'", raw.trim()))
        }),
        _ => Ok(default),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), EngineError> {
    let value = backtest_number(config, "initial_capital", DEFAULT_INITIAL_CAPITAL)?;
    if !(value.is_finite() && value > 0.0) {
        return Err(EngineError::config_invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), EngineError> {
    let value = backtest_number(config, "risk_free_rate", DEFAULT_RISK_FREE_RATE)?;
    if !(0.0..1.0).contains(&value) {
        return Err(EngineError::config_invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

/// Validate both sections and assemble the request.
///
/// `[strategy]` keys other than `type` and `script_file` become strategy
/// parameters; `script` is the already-loaded script text, if the caller read
/// one from `script_file`.
pub fn request_from_config(
    config: &dyn ConfigPort,
    script: Option<String>,
) -> Result<BacktestRequest, EngineError> {
    validate_backtest_config(config)?;
    let kind = validate_strategy_config(config)?;

    let mut params = StrategyParams::new();
    for key in config.section_keys("strategy") {
        if RESERVED_STRATEGY_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(raw) = config.get_string("strategy", &key) {
            params.insert_raw(&key, &raw);
        }
    }
    if let Some(source) = script {
        params = params.with_text("custom_code", source);
    }

    Ok(BacktestRequest {
        strategy: kind,
        params,
        initial_capital: backtest_number(config, "initial_capital", DEFAULT_INITIAL_CAPITAL)?,
        metrics: MetricsConfig {
            risk_free_rate: backtest_number(config, "risk_free_rate", DEFAULT_RISK_FREE_RATE)?,
            ..MetricsConfig::default()
        },
    })
}
