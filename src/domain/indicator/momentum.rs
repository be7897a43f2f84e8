//! Momentum oscillators: Rate of Change, raw momentum and CCI.
//!
//! ROC = (C[i] / C[i-n] - 1) * 100.
//! CCI = (TP - SMA(TP, n)) / (0.015 * STDDEV(TP, n)) with TP = (H + L + C) / 3.

use super::{calculate_sma, calculate_stddev, pct_change, safe_div, shift};

pub fn calculate_roc(values: &[f64], period: usize) -> Vec<f64> {
    pct_change(values, period).into_iter().map(|v| v * 100.0).collect()
}

/// C[i] / C[i-n] - 1 as a fraction.
pub fn calculate_momentum(values: &[f64], period: usize) -> Vec<f64> {
    let prev = shift(values, period);
    values
        .iter()
        .zip(prev.iter())
        .map(|(&c, &p)| safe_div(c, p) - 1.0)
        .collect()
}

pub fn calculate_cci(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let tp: Vec<f64> = highs
        .iter()
        .zip(lows.iter().zip(closes.iter()))
        .map(|(&h, (&l, &c))| (h + l + c) / 3.0)
        .collect();
    let avg = calculate_sma(&tp, period);
    let std = calculate_stddev(&tp, period);
    tp.iter()
        .zip(avg.iter().zip(std.iter()))
        .map(|(&t, (&m, &s))| safe_div(t - m, 0.015 * s))
        .collect()
}
