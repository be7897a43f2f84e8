//! Position state threaded through a signal-generation pass.
//!
//! A strategy never stores its position: each pass starts from
//! [`PositionState::Flat`] and folds the state bar by bar, returning the final
//! state next to the signals it produced.

use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PositionState {
    #[default]
    Flat,
    Long {
        entry_price: f64,
        entry_time: NaiveDateTime,
    },
    Short {
        entry_price: f64,
        entry_time: NaiveDateTime,
    },
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn is_long(&self) -> bool {
        matches!(self, PositionState::Long { .. })
    }

    pub fn is_short(&self) -> bool {
        matches!(self, PositionState::Short { .. })
    }

    /// 0 when flat, 1 when long, -1 when short.
    pub fn direction(&self) -> i8 {
        match self {
            PositionState::Flat => 0,
            PositionState::Long { .. } => 1,
            PositionState::Short { .. } => -1,
        }
    }

    pub fn entry_price(&self) -> Option<f64> {
        match self {
            PositionState::Flat => None,
            PositionState::Long { entry_price, .. } | PositionState::Short { entry_price, .. } => {
                Some(*entry_price)
            }
        }
    }

    pub fn entry_time(&self) -> Option<NaiveDateTime> {
        match self {
            PositionState::Flat => None,
            PositionState::Long { entry_time, .. } | PositionState::Short { entry_time, .. } => {
                Some(*entry_time)
            }
        }
    }

    /// Signed return of `price` relative to the entry price, from the holder's
    /// point of view. `None` when flat or the entry price is zero.
    pub fn unrealized_return(&self, price: f64) -> Option<f64> {
        let entry = self.entry_price()?;
        if entry == 0.0 {
            return None;
        }
        let change = (price - entry) / entry;
        match self {
            PositionState::Short { .. } => Some(-change),
            _ => Some(change),
        }
    }

    /// Loss at or beyond `stop_loss` (a positive fraction). A zero threshold disables the check.
    pub fn should_stop_loss(&self, price: f64, stop_loss: f64) -> bool {
        if stop_loss <= 0.0 {
            return false;
        }
        self.unrealized_return(price)
            .is_some_and(|r| r <= -stop_loss)
    }

    /// Gain at or beyond `take_profit` (a positive fraction). A zero threshold disables the check.
    pub fn should_take_profit(&self, price: f64, take_profit: f64) -> bool {
        if take_profit <= 0.0 {
            return false;
        }
        self.unrealized_return(price)
            .is_some_and(|r| r >= take_profit)
    }
}
