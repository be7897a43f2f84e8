//! Weighted Moving Average and Hull Moving Average.
//!
//! WMA weights the window linearly: the oldest value has weight 1, the newest
//! weight n. HMA(n) = WMA(2*WMA(n/2) - WMA(n), floor(sqrt(n))).

use super::{rolling, zip_with};

pub fn calculate_wma(values: &[f64], period: usize) -> Vec<f64> {
    let denom = (period * (period + 1)) as f64 / 2.0;
    rolling(values, period, |window| {
        window
            .iter()
            .enumerate()
            .map(|(i, v)| v * (i + 1) as f64)
            .sum::<f64>()
            / denom
    })
}

pub fn calculate_hull_ma(values: &[f64], period: usize) -> Vec<f64> {
    if period < 2 {
        return vec![f64::NAN; values.len()];
    }
    let half = calculate_wma(values, period / 2);
    let full = calculate_wma(values, period);
    let raw = zip_with(&half, &full, |h, f| 2.0 * h - f);
    let smooth = ((period as f64).sqrt() as usize).max(1);
    calculate_wma(&raw, smooth)
}
