//! Per-bar strategy signals.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::position::PositionState;

/// A state transition decided on one bar.
///
/// Signals are transitions, not holdings: only the deciding bar carries a
/// non-hold action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    #[default]
    Hold,
    EnterLong,
    ExitLong,
    EnterShort,
    ExitShort,
}

impl SignalAction {
    /// The directional value: +1 enter/cover, -1 exit/short, 0 hold.
    pub fn value(self) -> i8 {
        match self {
            SignalAction::Hold => 0,
            SignalAction::EnterLong | SignalAction::ExitShort => 1,
            SignalAction::ExitLong | SignalAction::EnterShort => -1,
        }
    }

    pub fn is_hold(self) -> bool {
        self == SignalAction::Hold
    }

    /// Map a raw directional value onto the transition it means for `state`.
    ///
    /// Entries only happen while flat and exits only while long, so a value
    /// that does not fit the current state is a hold.
    pub fn from_value(value: i8, state: &PositionState) -> SignalAction {
        match (value, state) {
            (1, PositionState::Flat) => SignalAction::EnterLong,
            (-1, PositionState::Long { .. }) => SignalAction::ExitLong,
            (1, PositionState::Short { .. }) => SignalAction::ExitShort,
            _ => SignalAction::Hold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub timestamp: NaiveDateTime,
    pub action: SignalAction,
    pub reason: String,
}

impl Signal {
    pub fn hold(timestamp: NaiveDateTime) -> Self {
        Signal {
            timestamp,
            action: SignalAction::Hold,
            reason: String::new(),
        }
    }

    pub fn new(timestamp: NaiveDateTime, action: SignalAction, reason: impl Into<String>) -> Self {
        Signal {
            timestamp,
            action,
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> i8 {
        self.action.value()
    }
}

/// Output of one signal-generation pass: one signal per bar plus the position
/// state the pass ended in.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRun {
    pub signals: Vec<Signal>,
    pub final_state: PositionState,
}

impl SignalRun {
    pub fn empty() -> Self {
        SignalRun {
            signals: Vec::new(),
            final_state: PositionState::Flat,
        }
    }

    /// Only the bars that carry a transition.
    pub fn transitions(&self) -> impl Iterator<Item = (usize, &Signal)> {
        self.signals
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.action.is_hold())
    }
}
