//! Simple Moving Average indicator.
//!
//! SMA[i] = mean(v[i-n+1..=i]). Warmup: first (n-1) values are undefined.

use super::{mean, rolling};

pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, mean)
}
