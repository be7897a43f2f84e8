//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::{run_batch, run_series, BacktestRequest, BacktestResult};
use crate::domain::config_validation::request_from_config;
use crate::domain::error::EngineError;
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::strategy::Strategy;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "strategylab", about = "Single-instrument strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a strategy configuration without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run several configurations over the same data
    Compare {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long, required = true, num_args = 1..)]
        config: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            data,
            config,
            output,
        } => run_backtest(&data, &config, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Compare {
            data,
            config,
            output,
        } => run_compare(&data, &config, output.as_deref()),
    }
}

/// A configuration file turned into a request, plus the rule script text
/// (if any) for error context.
pub struct LoadedConfig {
    pub request: BacktestRequest,
    pub script: Option<String>,
}

/// Load and validate an INI file. `script_file` is resolved relative to the
/// config file's directory.
pub fn load_config(path: &Path) -> Result<LoadedConfig, EngineError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    let script = match adapter.get_string("strategy", "script_file") {
        Some(file) if !file.trim().is_empty() => {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            Some(fs::read_to_string(base.join(file.trim()))?)
        }
        _ => adapter.get_string("strategy", "custom_code"),
    };
    let request = request_from_config(&adapter, script.clone())?;
    Ok(LoadedConfig { request, script })
}

fn load_series(path: &Path) -> Result<PriceSeries, EngineError> {
    eprintln!("Loading price data from {}", path.display());
    let bars = CsvAdapter::new(path.to_path_buf()).load_bars()?;
    PriceSeries::new(bars)
}

/// Print `err` to stderr and map it to its exit code.
fn fail(err: &EngineError, script: Option<&str>) -> ExitCode {
    match (err, script) {
        (EngineError::ScriptInvalid(parse), Some(src)) => {
            eprintln!("error: invalid rule script:\n{}", parse.display_with_context(src));
        }
        _ => eprintln!("error: {err}"),
    }
    err.into()
}

fn run_backtest(data: &Path, config: &Path, output: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config.display());
    let loaded = match load_config(config) {
        Ok(l) => l,
        Err(e) => return fail(&e, None),
    };
    if let Err(e) = loaded.request.build_strategy() {
        return fail(&e, loaded.script.as_deref());
    }
    let series = match load_series(data) {
        Ok(s) => s,
        Err(e) => return fail(&e, None),
    };

    let result = match run_series(&series, &loaded.request) {
        Ok(r) => r,
        Err(e) => return fail(&e, loaded.script.as_deref()),
    };
    print_summary(&result);

    if let Some(path) = output {
        if let Err(e) = JsonReportAdapter::new().write(&result, path) {
            return fail(&e, None);
        }
        eprintln!("Report written to {}", path.display());
    }
    ExitCode::SUCCESS
}

fn run_validate(config: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config.display());
    let loaded = match load_config(config) {
        Ok(l) => l,
        Err(e) => return fail(&e, None),
    };
    match loaded.request.build_strategy() {
        Ok(strategy) => {
            eprintln!("  Strategy:        {}", strategy.name());
            eprintln!("  Minimum bars:    {}", strategy.min_bars());
            eprintln!("  Initial capital: {:.2}", loaded.request.initial_capital);
            let keys: Vec<&str> = loaded.request.params.keys().collect();
            if !keys.is_empty() {
                eprintln!("  Parameters:      {}", keys.join(", "));
            }
            eprintln!("\nConfiguration is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e, loaded.script.as_deref()),
    }
}

fn run_compare(data: &Path, configs: &[PathBuf], output: Option<&Path>) -> ExitCode {
    let mut requests = Vec::with_capacity(configs.len());
    for path in configs {
        eprintln!("Loading config from {}", path.display());
        match load_config(path) {
            Ok(l) => requests.push(l.request),
            Err(e) => return fail(&e, None),
        }
    }
    let series = match load_series(data) {
        Ok(s) => s,
        Err(e) => return fail(&e, None),
    };

    let outcomes = run_batch(&series, &requests);
    let mut results = Vec::with_capacity(outcomes.len());
    eprintln!("\n=== Comparison ===");
    for (path, outcome) in configs.iter().zip(outcomes) {
        match outcome {
            Ok(result) => {
                eprintln!("  {}: {}", path.display(), summary_line(&result.strategy, &result.metrics));
                results.push(result);
            }
            Err(e) => return fail(&e, None),
        }
    }

    if let Some(path) = output {
        if let Err(e) = JsonReportAdapter::new().write_all(&results, path) {
            return fail(&e, None);
        }
        eprintln!("Reports written next to {}", path.display());
    }
    ExitCode::SUCCESS
}

pub fn summary_line(strategy: &str, m: &Metrics) -> String {
    format!(
        "{strategy}: return {:.2}%, sharpe {:.2}, max drawdown {:.2}%, {} trades, win rate {:.1}%",
        m.total_return, m.sharpe_ratio, m.max_drawdown, m.total_trades, m.win_rate
    )
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    eprintln!("\n=== Results: {} ===", result.strategy);
    eprintln!("Total Return:     {:.2}%", m.total_return);
    eprintln!("Annualized:       {:.2}%", m.annualized_return);
    eprintln!("Volatility:       {:.2}%", m.volatility);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Max Drawdown:     {:.2}%", m.max_drawdown);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!("Win Rate:         {:.1}%", m.win_rate);
    eprintln!("Final Value:      {:.2}", m.final_value);
}
