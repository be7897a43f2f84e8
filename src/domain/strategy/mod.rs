//! Trading strategies.
//!
//! A strategy turns a price series into one [`Signal`] per bar. Position state
//! is threaded through a single generation pass and returned in the
//! [`SignalRun`]; strategies themselves hold only their parameters, so running
//! the same strategy twice on the same series gives the same result.
//!
//! [`Signal`]: crate::domain::signal::Signal

pub mod bollinger;
pub mod custom;
pub mod ma_cross;
pub mod rsi;

use std::fmt;
use std::str::FromStr;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::EngineError;
use crate::domain::metrics::{Metrics, MetricsConfig};
use crate::domain::ohlcv::PriceSeries;
use crate::domain::params::StrategyParams;
use crate::domain::portfolio::{simulate, CostModel};
use crate::domain::signal::SignalRun;

pub use bollinger::BollingerBreakout;
pub use custom::CustomRule;
pub use ma_cross::MaCross;
pub use rsi::RsiReversion;

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Shortest series the strategy can trade on.
    fn min_bars(&self) -> usize;

    fn cost_model(&self) -> CostModel {
        CostModel::none()
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalRun;

    /// Generate signals, simulate the book and compute metrics.
    ///
    /// A series shorter than [`min_bars`](Strategy::min_bars) gives the empty
    /// result rather than an error.
    fn backtest(
        &self,
        series: &PriceSeries,
        initial_capital: f64,
        metrics: &MetricsConfig,
    ) -> BacktestResult {
        if series.len() < self.min_bars() {
            log::info!(
                "{}: {} bars is fewer than the {} required; returning an empty result",
                self.name(),
                series.len(),
                self.min_bars()
            );
            return BacktestResult::empty(self.name());
        }
        let run = self.generate_signals(series);
        let sim = simulate(series, &run.signals, initial_capital, self.cost_model());
        let metrics = Metrics::compute(&sim.snapshots, &sim.trades, initial_capital, metrics);
        let mut result = BacktestResult::from_simulation(self.name(), sim, metrics);
        result.sanitize();
        result
    }
}

/// Strategy identifiers accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    MaCross,
    Rsi,
    Bollinger,
    Custom,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::MaCross,
        StrategyKind::Rsi,
        StrategyKind::Bollinger,
        StrategyKind::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::MaCross => "ma_cross",
            StrategyKind::Rsi => "rsi",
            StrategyKind::Bollinger => "bollinger",
            StrategyKind::Custom => "custom",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().to_ascii_lowercase();
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.as_str() == id)
            .ok_or(EngineError::UnknownStrategy { id })
    }
}

/// Closed set of strategies, dispatched by variant.
#[derive(Debug, Clone)]
pub enum AnyStrategy {
    MaCross(MaCross),
    Rsi(RsiReversion),
    Bollinger(BollingerBreakout),
    Custom(CustomRule),
}

impl AnyStrategy {
    /// Build and validate a strategy from its parameters.
    pub fn from_params(kind: StrategyKind, params: &StrategyParams) -> Result<Self, EngineError> {
        Ok(match kind {
            StrategyKind::MaCross => AnyStrategy::MaCross(MaCross::from_params(params)?),
            StrategyKind::Rsi => AnyStrategy::Rsi(RsiReversion::from_params(params)?),
            StrategyKind::Bollinger => {
                AnyStrategy::Bollinger(BollingerBreakout::from_params(params)?)
            }
            StrategyKind::Custom => AnyStrategy::Custom(CustomRule::from_params(params)?),
        })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            AnyStrategy::MaCross(_) => StrategyKind::MaCross,
            AnyStrategy::Rsi(_) => StrategyKind::Rsi,
            AnyStrategy::Bollinger(_) => StrategyKind::Bollinger,
            AnyStrategy::Custom(_) => StrategyKind::Custom,
        }
    }

    fn inner(&self) -> &dyn Strategy {
        match self {
            AnyStrategy::MaCross(s) => s,
            AnyStrategy::Rsi(s) => s,
            AnyStrategy::Bollinger(s) => s,
            AnyStrategy::Custom(s) => s,
        }
    }
}

impl Strategy for AnyStrategy {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn min_bars(&self) -> usize {
        self.inner().min_bars()
    }

    fn cost_model(&self) -> CostModel {
        self.inner().cost_model()
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalRun {
        self.inner().generate_signals(series)
    }
}
