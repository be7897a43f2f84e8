//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod panel;
pub mod position;
pub mod signal;
pub mod params;
pub mod strategy;
pub mod script;
pub mod script_lexer;
pub mod script_parser;
pub mod script_value;
pub mod script_eval;
pub mod script_helpers;
pub mod sandbox;
pub mod portfolio;
pub mod metrics;
pub mod backtest;
pub mod error;
pub mod config_validation;
