//! Relative Strength Index.
//!
//! Price changes are split into gains and losses, each averaged with a simple
//! rolling mean over `period` changes:
//!
//! RS = avg_gain / avg_loss, RSI = 100 - 100 / (1 + RS)
//!
//! Warmup: the first `period` values are undefined (index 0 has no change).
//! A window with no losses has no defined RS and yields NaN.

use super::{mean, rolling, safe_div, zip_with};

pub fn calculate_rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut changes = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        changes[i] = values[i] - values[i - 1];
    }
    let gains: Vec<f64> = changes
        .iter()
        .map(|&c| if c.is_nan() { c } else { c.max(0.0) })
        .collect();
    let losses: Vec<f64> = changes
        .iter()
        .map(|&c| if c.is_nan() { c } else { (-c).max(0.0) })
        .collect();

    let avg_gain = rolling(&gains, period, mean);
    let avg_loss = rolling(&losses, period, mean);

    zip_with(&avg_gain, &avg_loss, |g, l| {
        let rs = safe_div(g, l);
        if rs.is_nan() {
            f64::NAN
        } else {
            100.0 - 100.0 / (1.0 + rs)
        }
    })
}
