//! MACD indicator.
//!
//! Line = EMA(fast) - EMA(slow), Signal = EMA(Line, signal),
//! Histogram = Line - Signal.

use super::{calculate_ema, zip_with};

#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn calculate_macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = calculate_ema(values, fast);
    let slow_ema = calculate_ema(values, slow);
    let line = zip_with(&fast_ema, &slow_ema, |f, s| f - s);
    let signal = calculate_ema(&line, signal);
    let histogram = zip_with(&line, &signal, |l, s| l - s);
    Macd {
        line,
        signal,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_warmup() {
        let values: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        let macd = calculate_macd(&values, 3, 6, 3);
        // line defined once the slow EMA is seeded (index 5)
        assert!(macd.line[4].is_nan());
        assert!(macd.line[5].is_finite());
        // signal needs 3 defined line values
        assert!(macd.signal[6].is_nan());
        assert!(macd.signal[7].is_finite());
        assert!(macd.histogram[7].is_finite());
    }

    #[test]
    fn macd_constant_series_is_flat() {
        let macd = calculate_macd(&[10.0; 40], 12, 26, 9);
        for i in 34..40 {
            assert!(macd.line[i].abs() < 1e-10);
            assert!(macd.signal[i].abs() < 1e-10);
            assert!(macd.histogram[i].abs() < 1e-10);
        }
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let values: Vec<f64> = (1..=40).map(|v| v as f64 * 2.0).collect();
        let macd = calculate_macd(&values, 12, 26, 9);
        assert!(macd.line[39] > 0.0);
    }
}
