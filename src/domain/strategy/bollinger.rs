//! Bollinger band breakout with reversion-to-middle exits.
//!
//! While flat, a close below `lower × (1 − entry_threshold)` enters long and a
//! close above `upper × (1 + entry_threshold)` enters short. A long exits once
//! the close is back above `middle × (1 − exit_threshold / 100)`; a short exits
//! once it is back below `middle × (1 + exit_threshold / 100)`.
//!
//! The book follows signal direction, so a covered short is booked as a buy.

use crate::domain::error::EngineError;
use crate::domain::indicator::calculate_bollinger;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::params::{ensure, StrategyParams};
use crate::domain::position::PositionState;
use crate::domain::signal::{Signal, SignalAction, SignalRun};

use super::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBreakout {
    pub period: usize,
    pub std_dev: f64,
    /// Fraction beyond a band that counts as a breakout.
    pub entry_threshold: f64,
    /// Percent of the middle band an exit may fall short of it.
    pub exit_threshold: f64,
}

impl Default for BollingerBreakout {
    fn default() -> Self {
        BollingerBreakout {
            period: 20,
            std_dev: 2.0,
            entry_threshold: 0.01,
            exit_threshold: 0.5,
        }
    }
}

impl BollingerBreakout {
    pub fn from_params(params: &StrategyParams) -> Result<Self, EngineError> {
        let d = BollingerBreakout::default();
        let s = BollingerBreakout {
            period: params.usize_or(&["period", "bb_period"], d.period)?,
            std_dev: params.f64_or(&["std_dev", "std_multiplier"], d.std_dev)?,
            entry_threshold: params.non_negative_or(&["entry_threshold"], d.entry_threshold)?,
            exit_threshold: params.non_negative_or(&["exit_threshold"], d.exit_threshold)?,
        };
        ensure(s.period >= 2, "period", "needs at least 2 bars for a deviation")?;
        ensure(s.std_dev > 0.0, "std_dev", format!("must be positive, got {}", s.std_dev))?;
        Ok(s)
    }
}

impl Strategy for BollingerBreakout {
    fn name(&self) -> &'static str {
        "bollinger"
    }

    fn min_bars(&self) -> usize {
        self.period.saturating_add(1)
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalRun {
        let closes = series.closes();
        let bands = calculate_bollinger(&closes, self.period, self.std_dev);
        let exit_margin = self.exit_threshold / 100.0;

        let mut state = PositionState::Flat;
        let mut signals = Vec::with_capacity(series.len());
        for (i, bar) in series.bars().iter().enumerate() {
            let (upper, middle, lower) = (bands.upper[i], bands.middle[i], bands.lower[i]);
            let price = bar.close;
            let ts = bar.timestamp;
            let mut signal = Signal::hold(ts);
            if upper.is_finite() && middle.is_finite() && lower.is_finite() {
                match state {
                    PositionState::Flat if price < lower * (1.0 - self.entry_threshold) => {
                        signal = Signal::new(
                            ts,
                            SignalAction::EnterLong,
                            format!("Lower band breakout buy (price={price:.2}, lower={lower:.2})"),
                        );
                        state = PositionState::Long {
                            entry_price: price,
                            entry_time: ts,
                        };
                    }
                    PositionState::Flat if price > upper * (1.0 + self.entry_threshold) => {
                        signal = Signal::new(
                            ts,
                            SignalAction::EnterShort,
                            format!("Upper band breakout short (price={price:.2}, upper={upper:.2})"),
                        );
                        state = PositionState::Short {
                            entry_price: price,
                            entry_time: ts,
                        };
                    }
                    PositionState::Long { .. } if price > middle * (1.0 - exit_margin) => {
                        let change = state.unrealized_return(price).unwrap_or(0.0);
                        signal = Signal::new(
                            ts,
                            SignalAction::ExitLong,
                            format!("Reverted to middle band, close long (return {:.2}%)", change * 100.0),
                        );
                        state = PositionState::Flat;
                    }
                    PositionState::Short { .. } if price < middle * (1.0 + exit_margin) => {
                        let change = state.unrealized_return(price).unwrap_or(0.0);
                        signal = Signal::new(
                            ts,
                            SignalAction::ExitShort,
                            format!("Reverted to middle band, close short (return {:.2}%)", change * 100.0),
                        );
                        state = PositionState::Flat;
                    }
                    _ => {}
                }
            }
            signals.push(signal);
        }
        SignalRun {
            signals,
            final_state: state,
        }
    }
}
