//! Price channels and levels: rolling extremes, Donchian and Keltner
//! channels, pivot points, Fibonacci retracements and peak/trough detection.

use super::{calculate_atr, calculate_ema, rolling, shift, zip_with};

pub fn calculate_rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

pub fn calculate_rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Upper = HH(n), Lower = LL(n), Middle = midpoint.
pub fn calculate_donchian(highs: &[f64], lows: &[f64], period: usize) -> Channel {
    let upper = calculate_rolling_max(highs, period);
    let lower = calculate_rolling_min(lows, period);
    let middle = zip_with(&upper, &lower, |u, l| (u + l) / 2.0);
    Channel {
        upper,
        middle,
        lower,
    }
}

/// Middle = EMA(C, n), bands at +/- 2 * ATR(n).
pub fn calculate_keltner(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Channel {
    let middle = calculate_ema(closes, period);
    let atr = calculate_atr(highs, lows, closes, period);
    let upper = zip_with(&middle, &atr, |m, a| m + 2.0 * a);
    let lower = zip_with(&middle, &atr, |m, a| m - 2.0 * a);
    Channel {
        upper,
        middle,
        lower,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PivotPoints {
    pub pivot: Vec<f64>,
    pub r1: Vec<f64>,
    pub r2: Vec<f64>,
    pub s1: Vec<f64>,
    pub s2: Vec<f64>,
}

/// Classic floor pivots from the previous bar; index 0 is undefined.
pub fn calculate_pivots(highs: &[f64], lows: &[f64], closes: &[f64]) -> PivotPoints {
    let ph = shift(highs, 1);
    let pl = shift(lows, 1);
    let pc = shift(closes, 1);
    let pivot: Vec<f64> = (0..closes.len()).map(|i| (ph[i] + pl[i] + pc[i]) / 3.0).collect();
    let r1 = zip_with(&pivot, &pl, |p, l| 2.0 * p - l);
    let s1 = zip_with(&pivot, &ph, |p, h| 2.0 * p - h);
    let range = zip_with(&ph, &pl, |h, l| h - l);
    let r2 = zip_with(&pivot, &range, |p, r| p + r);
    let s2 = zip_with(&pivot, &range, |p, r| p - r);
    PivotPoints {
        pivot,
        r1,
        r2,
        s1,
        s2,
    }
}

pub const FIBONACCI_RATIOS: [(&str, f64); 5] = [
    ("level_236", 0.236),
    ("level_382", 0.382),
    ("level_500", 0.5),
    ("level_618", 0.618),
    ("level_786", 0.786),
];

/// Retracement levels measured down from `high`.
pub fn fibonacci_retracements(high: f64, low: f64) -> Vec<(&'static str, f64)> {
    let diff = high - low;
    FIBONACCI_RATIOS
        .iter()
        .map(|&(name, ratio)| (name, high - diff * ratio))
        .collect()
}

/// Strict local extremes as (index, value) pairs.
pub fn find_peaks_troughs(values: &[f64]) -> (Vec<(usize, f64)>, Vec<(usize, f64)>) {
    let mut peaks = Vec::new();
    let mut troughs = Vec::new();
    for j in 1..values.len().saturating_sub(1) {
        let (prev, cur, next) = (values[j - 1], values[j], values[j + 1]);
        if cur > prev && cur > next {
            peaks.push((j, cur));
        } else if cur < prev && cur < next {
            troughs.push((j, cur));
        }
    }
    (peaks, troughs)
}
