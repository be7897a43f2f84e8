//! Moving-average crossover.
//!
//! Buys when the short SMA crosses above the long SMA while flat, sells when it
//! crosses back below while long. A cross needs both averages defined on the
//! bar and the bar before it.

use crate::domain::error::EngineError;
use crate::domain::indicator::calculate_sma;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::params::{ensure, StrategyParams};
use crate::domain::position::PositionState;
use crate::domain::signal::{Signal, SignalAction, SignalRun};

use super::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub struct MaCross {
    pub short_window: usize,
    pub long_window: usize,
}

impl Default for MaCross {
    fn default() -> Self {
        MaCross {
            short_window: 20,
            long_window: 50,
        }
    }
}

impl MaCross {
    pub fn from_params(params: &StrategyParams) -> Result<Self, EngineError> {
        let d = MaCross::default();
        let short_window = params.usize_or(&["short_window", "short"], d.short_window)?;
        let long_window = params.usize_or(&["long_window", "long"], d.long_window)?;
        ensure(
            short_window < long_window,
            "short_window",
            format!("must be less than long_window ({short_window} >= {long_window})"),
        )?;
        Ok(MaCross {
            short_window,
            long_window,
        })
    }
}

impl Strategy for MaCross {
    fn name(&self) -> &'static str {
        "ma_cross"
    }

    fn min_bars(&self) -> usize {
        self.long_window.saturating_add(1)
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalRun {
        let closes = series.closes();
        let short = calculate_sma(&closes, self.short_window);
        let long = calculate_sma(&closes, self.long_window);

        let mut state = PositionState::Flat;
        let mut signals = Vec::with_capacity(series.len());
        for (i, bar) in series.bars().iter().enumerate() {
            let mut signal = Signal::hold(bar.timestamp);
            if i > 0 {
                let (s, l, ps, pl) = (short[i], long[i], short[i - 1], long[i - 1]);
                let defined = [s, l, ps, pl].iter().all(|v| v.is_finite());
                if defined && state.is_flat() && ps <= pl && s > l {
                    signal = Signal::new(bar.timestamp, SignalAction::EnterLong, "MA golden cross buy");
                    state = PositionState::Long {
                        entry_price: bar.close,
                        entry_time: bar.timestamp,
                    };
                } else if defined && state.is_long() && ps >= pl && s < l {
                    signal = Signal::new(bar.timestamp, SignalAction::ExitLong, "MA death cross sell");
                    state = PositionState::Flat;
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
