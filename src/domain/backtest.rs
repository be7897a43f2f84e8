//! Engine call contract.
//!
//! A [`BacktestRequest`] names a strategy, its parameters and the capital to
//! start with; [`run_backtest`] validates the inputs, runs the strategy and
//! returns a [`BacktestResult`] whose numbers are all finite. Nothing here
//! touches the filesystem: bars come in as values and the result goes out as
//! a serialisable record.

use serde::Serialize;

use crate::domain::error::EngineError;
use crate::domain::metrics::{Metrics, MetricsConfig};
use crate::domain::ohlcv::{PriceBar, PriceSeries};
use crate::domain::params::StrategyParams;
use crate::domain::portfolio::{PortfolioSnapshot, Simulation, TradeRecord};
use crate::domain::strategy::{AnyStrategy, Strategy, StrategyKind};

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    /// `YYYY-MM-DD`
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub trades: Vec<TradeRecord>,
    pub snapshots: Vec<PortfolioSnapshot>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: Metrics,
}

impl BacktestResult {
    /// No trades, no snapshots, all-zero metrics.
    pub fn empty(strategy: &str) -> Self {
        BacktestResult {
            strategy: strategy.to_string(),
            trades: Vec::new(),
            snapshots: Vec::new(),
            equity_curve: Vec::new(),
            metrics: Metrics::default(),
        }
    }

    pub fn from_simulation(strategy: &str, sim: Simulation, metrics: Metrics) -> Self {
        let equity_curve = sim
            .snapshots
            .iter()
            .map(|s| EquityPoint {
                date: s.timestamp.format("%Y-%m-%d").to_string(),
                value: s.value,
            })
            .collect();
        BacktestResult {
            strategy: strategy.to_string(),
            trades: sim.trades,
            snapshots: sim.snapshots,
            equity_curve,
            metrics,
        }
    }

    /// Replace every non-finite number in the record with 0.
    pub fn sanitize(&mut self) {
        fn clean(v: &mut f64) {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        for t in &mut self.trades {
            clean(&mut t.price);
            clean(&mut t.quantity);
            if let Some(amount) = t.amount.as_mut() {
                clean(amount);
            }
        }
        for s in &mut self.snapshots {
            clean(&mut s.cash);
            clean(&mut s.shares);
            clean(&mut s.price);
            clean(&mut s.value);
        }
        for p in &mut self.equity_curve {
            clean(&mut p.value);
        }
        let m = &mut self.metrics;
        for v in [
            &mut m.total_return,
            &mut m.annualized_return,
            &mut m.volatility,
            &mut m.sharpe_ratio,
            &mut m.max_drawdown,
            &mut m.win_rate,
            &mut m.final_value,
        ] {
            clean(v);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRequest {
    pub strategy: StrategyKind,
    pub params: StrategyParams,
    pub initial_capital: f64,
    pub metrics: MetricsConfig,
}

impl BacktestRequest {
    pub fn new(strategy: StrategyKind, params: StrategyParams) -> Self {
        BacktestRequest {
            strategy,
            params,
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            metrics: MetricsConfig::default(),
        }
    }

    pub fn with_initial_capital(mut self, initial_capital: f64) -> Self {
        self.initial_capital = initial_capital;
        self
    }

    /// Build and validate the strategy this request names.
    pub fn build_strategy(&self) -> Result<AnyStrategy, EngineError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(EngineError::config_invalid(
                "backtest",
                "initial_capital",
                format!("must be a positive number, got {}", self.initial_capital),
            ));
        }
        AnyStrategy::from_params(self.strategy, &self.params)
    }
}

impl Default for BacktestRequest {
    fn default() -> Self {
        BacktestRequest::new(StrategyKind::MaCross, StrategyParams::new())
    }
}

/// Validate `bars` and run one backtest.
pub fn run_backtest(bars: Vec<PriceBar>, request: &BacktestRequest) -> Result<BacktestResult, EngineError> {
    let series = PriceSeries::new(bars)?;
    run_series(&series, request)
}

/// Run one backtest over an already validated series.
pub fn run_series(series: &PriceSeries, request: &BacktestRequest) -> Result<BacktestResult, EngineError> {
    let strategy = request.build_strategy()?;
    log::info!(
        "backtest start: strategy={} bars={} capital={:.2}",
        strategy.name(),
        series.len(),
        request.initial_capital
    );
    let result = strategy.backtest(series, request.initial_capital, &request.metrics);
    log::info!(
        "backtest done: strategy={} trades={} final_value={:.2} return={:.2}%",
        result.strategy,
        result.trades.len(),
        result.metrics.final_value,
        result.metrics.total_return
    );
    Ok(result)
}

/// Run independent backtests over the same series, in parallel when the
/// `parallel` feature is on. Results keep the order of `requests`.
pub fn run_batch(series: &PriceSeries, requests: &[BacktestRequest]) -> Vec<Result<BacktestResult, EngineError>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        requests.par_iter().map(|r| run_series(series, r)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        requests.iter().map(|r| run_series(series, r)).collect()
    }
}
