//! Rule sandbox: runs a user rule script against one bar of an indicator panel.
//!
//! The script is parsed and validated once, when the sandbox is built. Each
//! bar then gets a fresh interpreter seeded with the bar context:
//!
//! | name | value |
//! |------|-------|
//! | `current`, `prev` | row views of bar `i` and `i - 1` (`i` on the first bar) |
//! | `data` | frame of bars `0..=i` |
//! | `history_5`, `history_10`, `history_20` | trailing frames ending at `i` |
//! | `index` | `i` |
//! | `position` | 1 long, -1 short, 0 flat |
//! | `entry_price` | entry price, 0 while flat |
//! | `entry_date` | entry date as `YYYY-MM-DD`, `None` while flat |
//! | `signal`, `reason` | outputs, preset to `0` and `""` |
//! | `nan` | a NaN constant |
//!
//! `data` stops at the current bar, so a rule cannot see future prices.

use crate::domain::error::{ParseError, ScriptFault};
use crate::domain::panel::IndicatorPanel;
use crate::domain::position::PositionState;
use crate::domain::script::{Expr, ExprKind, Script};
use crate::domain::script_eval::{Interpreter, METHODS};
use crate::domain::script_helpers;
use crate::domain::script_parser::parse;
use crate::domain::script_value::{FrameView, RowView, Value};

pub use crate::domain::script_helpers::HELPER_REGISTRY_VERSION;

/// Names the sandbox defines before the script runs.
pub const CONTEXT_NAMES: [&str; 13] = [
    "current",
    "prev",
    "data",
    "history_5",
    "history_10",
    "history_20",
    "index",
    "position",
    "entry_price",
    "entry_date",
    "signal",
    "reason",
    "nan",
];

/// What the strategy needs to know about the bar being decided.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    pub panel: &'a IndicatorPanel,
    pub index: usize,
    pub position: &'a PositionState,
}

/// Outcome of one evaluation. `signal` is always -1, 0 or 1.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecision {
    pub signal: i8,
    pub reason: String,
    pub fault: Option<ScriptFault>,
}

impl RuleDecision {
    pub fn hold() -> Self {
        RuleDecision {
            signal: 0,
            reason: String::new(),
            fault: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleSandbox {
    source: String,
    script: Script,
}

impl RuleSandbox {
    /// Parse and validate `source`.
    ///
    /// Calls to unregistered functions, unknown method names and names that are
    /// never defined are rejected here rather than on the first bar.
    pub fn new(source: &str) -> Result<Self, ParseError> {
        let script = parse(source)?;
        validate(&script)?;
        Ok(RuleSandbox {
            source: source.to_string(),
            script,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    /// Evaluate the rule on one bar, returning the fault instead of recovering.
    pub fn try_evaluate(&self, ctx: &BarContext<'_>) -> Result<RuleDecision, ScriptFault> {
        if self.is_empty() {
            return Ok(RuleDecision::hold());
        }
        let mut interp = Interpreter::new();
        seed(&mut interp, ctx);
        interp.run(&self.script)?;

        let reason = match interp.get("reason") {
            Some(Value::Str(s)) => s.clone(),
            Some(Value::None) | None => String::new(),
            Some(other) => other.display(),
        };
        let raw = interp.get("signal").cloned().unwrap_or(Value::Number(0.0));
        match coerce_signal(&raw) {
            Some(signal) => Ok(RuleDecision {
                signal,
                reason,
                fault: None,
            }),
            None => Ok(RuleDecision {
                signal: 0,
                reason: format!("invalid signal value: {}", raw.display()),
                fault: None,
            }),
        }
    }

    /// Evaluate the rule on one bar. A runtime fault is logged and becomes a
    /// hold whose reason is the fault text.
    pub fn evaluate(&self, ctx: &BarContext<'_>) -> RuleDecision {
        match self.try_evaluate(ctx) {
            Ok(decision) => decision,
            Err(fault) => {
                log::warn!("rule script fault at bar {}: {}", ctx.index, fault);
                RuleDecision {
                    signal: 0,
                    reason: fault.message.clone(),
                    fault: Some(fault),
                }
            }
        }
    }
}

fn coerce_signal(value: &Value<'_>) -> Option<i8> {
    let n = value.as_number()?;
    match n {
        v if v == 1.0 => Some(1),
        v if v == 0.0 => Some(0),
        v if v == -1.0 => Some(-1),
        _ => None,
    }
}

fn seed<'p>(interp: &mut Interpreter<'p>, ctx: &BarContext<'p>) {
    let panel = ctx.panel;
    let i = ctx.index;
    let trailing = |n: usize| {
        Value::Frame(FrameView {
            panel,
            start: (i + 1).saturating_sub(n),
            end: i + 1,
        })
    };
    interp.set("current", Value::Row(RowView { panel, index: i }));
    interp.set(
        "prev",
        Value::Row(RowView {
            panel,
            index: i.saturating_sub(1),
        }),
    );
    interp.set("data", trailing(i + 1));
    interp.set("history_5", trailing(5));
    interp.set("history_10", trailing(10));
    interp.set("history_20", trailing(20));
    interp.set("index", Value::Number(i as f64));
    interp.set("position", Value::Number(f64::from(ctx.position.direction())));
    interp.set(
        "entry_price",
        Value::Number(ctx.position.entry_price().unwrap_or(0.0)),
    );
    interp.set(
        "entry_date",
        match ctx.position.entry_time() {
            Some(ts) => Value::Str(ts.format("%Y-%m-%d").to_string()),
            None => Value::None,
        },
    );
    interp.set("signal", Value::Number(0.0));
    interp.set("reason", Value::Str(String::new()));
    interp.set("nan", Value::Number(f64::NAN));
}

fn validate(script: &Script) -> Result<(), ParseError> {
    let assigned = script.assigned_names();
    let mut error: Option<ParseError> = None;
    script.visit_exprs(&mut |expr: &Expr| {
        if error.is_some() {
            return;
        }
        let at = |message: String| ParseError::new(message, expr.pos.line, expr.pos.column);
        match &expr.kind {
            ExprKind::Call { func, .. } if script_helpers::lookup(func).is_none() => {
                error = Some(at(format!("unknown function '{func}'")));
            }
            ExprKind::Method { name, .. } if !METHODS.contains(&name.as_str()) => {
                error = Some(at(format!("unknown method '{name}'")));
            }
            ExprKind::Name(name)
                if !CONTEXT_NAMES.contains(&name.as_str()) && !assigned.contains(name) =>
            {
                error = Some(at(format!("unknown name '{name}'")));
            }
            _ => {}
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::{PriceBar, PriceSeries};
    use chrono::NaiveDate;

    fn make_panel(closes: &[f64]) -> IndicatorPanel {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                timestamp: start + chrono::Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1000.0,
            })
            .collect();
        IndicatorPanel::from_series(&PriceSeries::new(bars).unwrap())
    }

    fn decide(src: &str, panel: &IndicatorPanel, index: usize, position: &PositionState) -> RuleDecision {
        let sandbox = RuleSandbox::new(src).unwrap();
        sandbox.evaluate(&BarContext {
            panel,
            index,
            position,
        })
    }

    #[test]
    fn empty_script_holds() {
        let panel = make_panel(&[1.0, 2.0]);
        let d = decide("", &panel, 1, &PositionState::Flat);
        assert_eq!(d, RuleDecision::hold());
    }

    #[test]
    fn buy_on_rising_close() {
        let panel = make_panel(&[1.0, 2.0]);
        let src = "if current['close'] > prev['close']:\n    signal = 1\n    reason = 'rising'\n";
        let d = decide(src, &panel, 1, &PositionState::Flat);
        assert_eq!(d.signal, 1);
        assert_eq!(d.reason, "rising");
    }

    #[test]
    fn prev_on_first_bar_is_current() {
        let panel = make_panel(&[5.0, 6.0]);
        let d = decide("signal = 1 if prev.close == current.close else 0", &panel, 0, &PositionState::Flat);
        assert_eq!(d.signal, 1);
    }

    #[test]
    fn data_stops_at_current_bar() {
        let panel = make_panel(&[1.0, 2.0, 3.0, 4.0]);
        let d = decide("signal = 1\nreason = str(len(data))", &panel, 1, &PositionState::Flat);
        assert_eq!(d.reason, "2.0");
        let d = decide("x = data['close'][2]", &panel, 1, &PositionState::Flat);
        assert!(d.fault.is_some());
    }

    #[test]
    fn history_frames_are_clipped() {
        let panel = make_panel(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let d = decide("reason = f'{len(history_5)} {len(history_20)}'", &panel, 6, &PositionState::Flat);
        assert_eq!(d.reason, "5.0 7.0");
    }

    #[test]
    fn position_context() {
        let panel = make_panel(&[1.0, 2.0]);
        let entry = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let long = PositionState::Long {
            entry_price: 1.5,
            entry_time: entry,
        };
        let src = "if position == 1 and current.close > entry_price:\n    signal = -1\n    reason = entry_date\n";
        let d = decide(src, &panel, 1, &long);
        assert_eq!(d.signal, -1);
        assert_eq!(d.reason, "2024-01-01");

        let d = decide("reason = str(entry_date)", &panel, 1, &PositionState::Flat);
        assert_eq!(d.reason, "None");
    }

    #[test]
    fn runtime_fault_becomes_hold() {
        let panel = make_panel(&[1.0]);
        let d = decide("signal = 1 / 0", &panel, 0, &PositionState::Flat);
        assert_eq!(d.signal, 0);
        assert_eq!(d.reason, "line 1: division by zero");
        assert!(d.fault.is_some());
    }

    #[test]
    fn invalid_signal_is_coerced() {
        let panel = make_panel(&[1.0]);
        let d = decide("signal = 2", &panel, 0, &PositionState::Flat);
        assert_eq!(d.signal, 0);
        assert_eq!(d.reason, "invalid signal value: 2.0");
        assert!(d.fault.is_none());

        let d = decide("signal = 'buy'", &panel, 0, &PositionState::Flat);
        assert_eq!(d.reason, "invalid signal value: buy");
    }

    #[test]
    fn boolean_signal_counts_as_number() {
        let panel = make_panel(&[1.0]);
        assert_eq!(decide("signal = True", &panel, 0, &PositionState::Flat).signal, 1);
    }

    #[test]
    fn non_string_reason_is_converted() {
        let panel = make_panel(&[1.0]);
        assert_eq!(decide("reason = 42", &panel, 0, &PositionState::Flat).reason, "42.0");
    }

    #[test]
    fn unknown_function_rejected_at_construction() {
        let err = RuleSandbox::new("signal = 0\nx = eval('1')").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unknown function 'eval'"));
    }

    #[test]
    fn unknown_name_rejected_at_construction() {
        let err = RuleSandbox::new("signal = np.mean(x)").unwrap_err();
        assert!(err.message.contains("unknown name"));
    }

    #[test]
    fn unknown_method_rejected_at_construction() {
        let err = RuleSandbox::new("x = data['close'].rolling()").unwrap_err();
        assert!(err.message.contains("unknown method 'rolling'"));
    }

    #[test]
    fn names_assigned_in_any_branch_are_known() {
        assert!(RuleSandbox::new("if index > 3:\n    y = 1\nsignal = y").is_ok());
    }

    #[test]
    fn syntax_error_reported_with_position() {
        let err = RuleSandbox::new("if current.close > 1\n    signal = 1\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn helper_registry_is_versioned() {
        assert!(HELPER_REGISTRY_VERSION >= 1);
    }
}
