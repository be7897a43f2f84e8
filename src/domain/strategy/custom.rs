//! User-supplied rule scripts.
//!
//! The script is parsed and statically checked once, when the strategy is
//! built. Per bar it runs against the full indicator panel; its `signal` is
//! read as +1 buy, -1 sell, 0 hold and gated by the current position, so a
//! buy while long or a sell while flat is ignored.

use crate::domain::error::EngineError;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::panel::IndicatorPanel;
use crate::domain::params::StrategyParams;
use crate::domain::portfolio::CostModel;
use crate::domain::position::PositionState;
use crate::domain::sandbox::{BarContext, RuleSandbox};
use crate::domain::signal::{Signal, SignalAction, SignalRun};

use super::Strategy;

/// Proportional fee charged on both sides of every custom-rule trade.
pub const CUSTOM_FEE_RATE: f64 = 0.001;

/// Bars needed before the first evaluation can see a 20-bar indicator.
pub const CUSTOM_MIN_BARS: usize = 21;

#[derive(Debug, Clone)]
pub struct CustomRule {
    sandbox: RuleSandbox,
}

impl CustomRule {
    pub fn new(source: &str) -> Result<Self, EngineError> {
        Ok(CustomRule {
            sandbox: RuleSandbox::new(source)?,
        })
    }

    /// Reads the script from `custom_code` (or `script`). A missing script is
    /// an empty rule that always holds.
    pub fn from_params(params: &StrategyParams) -> Result<Self, EngineError> {
        let source = params.text(&["custom_code", "script"])?.unwrap_or("");
        Self::new(source)
    }

    pub fn source(&self) -> &str {
        self.sandbox.source()
    }

    /// First bar the rule is evaluated on, leaving room for indicator warm-up.
    pub fn start_index(len: usize) -> usize {
        (len / 10).clamp(20, 50)
    }
}

impl Strategy for CustomRule {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn min_bars(&self) -> usize {
        CUSTOM_MIN_BARS
    }

    fn cost_model(&self) -> CostModel {
        CostModel::proportional(CUSTOM_FEE_RATE)
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalRun {
        let panel = IndicatorPanel::full(series);
        let start = Self::start_index(series.len());

        let mut state = PositionState::Flat;
        let mut signals = Vec::with_capacity(series.len());
        let mut faults = 0usize;
        for (i, bar) in series.bars().iter().enumerate() {
            if i < start {
                signals.push(Signal::hold(bar.timestamp));
                continue;
            }
            let decision = self.sandbox.evaluate(&BarContext {
                panel: &panel,
                index: i,
                position: &state,
            });
            if decision.fault.is_some() {
                faults += 1;
            }
            let action = SignalAction::from_value(decision.signal, &state);
            match action {
                SignalAction::EnterLong => {
                    state = PositionState::Long {
                        entry_price: bar.close,
                        entry_time: bar.timestamp,
                    };
                }
                SignalAction::ExitLong | SignalAction::ExitShort => state = PositionState::Flat,
                _ => {}
            }
            signals.push(if action.is_hold() {
                Signal::hold(bar.timestamp)
            } else {
                Signal::new(bar.timestamp, action, decision.reason)
            });
        }
        if faults > 0 {
            log::warn!("custom rule faulted on {faults} of {} evaluated bars", series.len().saturating_sub(start));
        }
        SignalRun {
            signals,
            final_state: state,
        }
    }
}
