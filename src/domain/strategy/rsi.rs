//! RSI mean reversion with stop-loss and take-profit exits.
//!
//! Evaluation starts at bar `period`. While long, the stop-loss and
//! take-profit checks run first; either one closes the position and ends the
//! bar. Otherwise an RSI below `oversold` buys while flat and an RSI above
//! `overbought` sells while long.

use crate::domain::error::EngineError;
use crate::domain::indicator::calculate_rsi;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::params::{ensure, StrategyParams};
use crate::domain::position::PositionState;
use crate::domain::signal::{Signal, SignalAction, SignalRun};

use super::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub struct RsiReversion {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
    /// Fractional loss from entry that forces an exit; 0 disables.
    pub stop_loss: f64,
    /// Fractional gain from entry that forces an exit; 0 disables.
    pub take_profit: f64,
}

impl Default for RsiReversion {
    fn default() -> Self {
        RsiReversion {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
            stop_loss: 0.05,
            take_profit: 0.10,
        }
    }
}

impl RsiReversion {
    pub fn from_params(params: &StrategyParams) -> Result<Self, EngineError> {
        let d = RsiReversion::default();
        let s = RsiReversion {
            period: params.usize_or(&["rsi_period", "period"], d.period)?,
            oversold: params.non_negative_or(&["oversold_threshold", "oversold"], d.oversold)?,
            overbought: params.non_negative_or(&["overbought_threshold", "overbought"], d.overbought)?,
            stop_loss: params.non_negative_or(&["stop_loss"], d.stop_loss)?,
            take_profit: params.non_negative_or(&["take_profit"], d.take_profit)?,
        };
        ensure(
            s.oversold < s.overbought && s.overbought <= 100.0,
            "oversold_threshold",
            format!(
                "thresholds must satisfy 0 <= oversold < overbought <= 100 (got {} and {})",
                s.oversold, s.overbought
            ),
        )?;
        Ok(s)
    }
}

impl Strategy for RsiReversion {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn min_bars(&self) -> usize {
        self.period.saturating_add(1)
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalRun {
        let closes = series.closes();
        let rsi = calculate_rsi(&closes, self.period);

        let mut state = PositionState::Flat;
        let mut signals = Vec::with_capacity(series.len());
        for (i, bar) in series.bars().iter().enumerate() {
            signals.push(Signal::hold(bar.timestamp));
            if i < self.period {
                continue;
            }
            let price = bar.close;

            if state.is_long() {
                let change = state.unrealized_return(price).unwrap_or(0.0);
                let forced = if state.should_stop_loss(price, self.stop_loss) {
                    Some(format!("Stop loss sell (loss {:.2}%)", change * 100.0))
                } else if state.should_take_profit(price, self.take_profit) {
                    Some(format!("Take profit sell (gain {:.2}%)", change * 100.0))
                } else {
                    None
                };
                if let Some(reason) = forced {
                    signals[i] = Signal::new(bar.timestamp, SignalAction::ExitLong, reason);
                    state = PositionState::Flat;
                    continue;
                }
            }

            let r = rsi[i];
            if r.is_nan() {
                continue;
            }
            if state.is_flat() && r < self.oversold {
                signals[i] = Signal::new(
                    bar.timestamp,
                    SignalAction::EnterLong,
                    format!("RSI oversold buy (RSI={r:.1})"),
                );
                state = PositionState::Long {
                    entry_price: price,
                    entry_time: bar.timestamp,
                };
            } else if state.is_long() && r > self.overbought {
                let change = state.unrealized_return(price).unwrap_or(0.0);
                signals[i] = Signal::new(
                    bar.timestamp,
                    SignalAction::ExitLong,
                    format!("RSI overbought sell (RSI={r:.1}, return {:.2}%)", change * 100.0),
                );
                state = PositionState::Flat;
            }
        }
        SignalRun {
            signals,
            final_state: state,
        }
    }
}
