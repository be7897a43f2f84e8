//! Technical indicator library.
//!
//! Every indicator is a pure function over index-aligned slices and returns a
//! series of the same length as its input:
//! - positions inside the warm-up window hold `f64::NAN`
//! - a window containing an undefined input is itself undefined
//! - a zero denominator yields `f64::NAN`, never an infinity
//!
//! Consumers treat NaN as "not yet available"; it is never replaced by a price.

pub mod atr;
pub mod bollinger;
pub mod channels;
pub mod ema;
pub mod macd;
pub mod momentum;
pub mod rsi;
pub mod sma;
pub mod statistics;
pub mod stddev;
pub mod stochastic;
pub mod volume;
pub mod wma;

pub use atr::{calculate_atr, calculate_true_range};
pub use bollinger::{calculate_bollinger, BollingerBands};
pub use ema::calculate_ema;
pub use macd::{calculate_macd, Macd};
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub use stddev::{calculate_stddev, calculate_zscore};
pub use stochastic::{calculate_stochastic, calculate_williams_r, Stochastic};
pub use wma::{calculate_hull_ma, calculate_wma};

/// Division that maps a zero or non-finite result to NaN.
pub(crate) fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return f64::NAN;
    }
    let q = num / den;
    if q.is_finite() { q } else { f64::NAN }
}

/// Apply `f` to every full trailing window of `period` values.
///
/// `out[i]` is computed from `values[i + 1 - period..=i]`; earlier positions and
/// windows containing NaN stay NaN.
pub(crate) fn rolling<F>(values: &[f64], period: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || period > values.len() {
        return out;
    }
    for end in period..=values.len() {
        let window = &values[end - period..end];
        if window.iter().all(|v| v.is_finite()) {
            out[end - 1] = f(window);
        }
    }
    out
}

/// Element-wise combination of two aligned series.
pub(crate) fn zip_with<F>(a: &[f64], b: &[f64], f: F) -> Vec<f64>
where
    F: Fn(f64, f64) -> f64,
{
    a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect()
}

/// Shift a series forward by `n` positions, filling the head with NaN.
pub(crate) fn shift(values: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in n..values.len() {
        out[i] = values[i - n];
    }
    out
}

/// Simple percentage change `v[i] / v[i - n] - 1`, guarded.
pub fn pct_change(values: &[f64], n: usize) -> Vec<f64> {
    let prev = shift(values, n);
    zip_with(values, &prev, |cur, prev| safe_div(cur - prev, prev))
}

pub(crate) fn mean(window: &[f64]) -> f64 {
    window.iter().sum::<f64>() / window.len() as f64
}
