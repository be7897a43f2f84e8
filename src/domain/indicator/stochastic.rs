//! Stochastic oscillator (KDJ) and Williams %R.
//!
//! %K = 100 * (C - LL(k)) / (HH(k) - LL(k)), %D = SMA(%K, d), J = 3K - 2D.
//! %R = -100 * (HH(n) - C) / (HH(n) - LL(n)).

use super::{calculate_sma, safe_div, zip_with};
use super::channels::{calculate_rolling_max, calculate_rolling_min};

#[derive(Debug, Clone, PartialEq)]
pub struct Stochastic {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
    pub j: Vec<f64>,
}

pub fn calculate_stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    d_period: usize,
) -> Stochastic {
    let hh = calculate_rolling_max(highs, k_period);
    let ll = calculate_rolling_min(lows, k_period);
    let k: Vec<f64> = closes
        .iter()
        .zip(hh.iter().zip(ll.iter()))
        .map(|(&c, (&h, &l))| 100.0 * safe_div(c - l, h - l))
        .collect();
    let d = calculate_sma(&k, d_period);
    let j = zip_with(&k, &d, |k, d| 3.0 * k - 2.0 * d);
    Stochastic { k, d, j }
}

pub fn calculate_williams_r(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let hh = calculate_rolling_max(highs, period);
    let ll = calculate_rolling_min(lows, period);
    closes
        .iter()
        .zip(hh.iter().zip(ll.iter()))
        .map(|(&c, (&h, &l))| -100.0 * safe_div(h - c, h - l))
        .collect()
}
