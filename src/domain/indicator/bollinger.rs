//! Bollinger Bands.
//!
//! Middle = SMA(n), Upper = Middle + k*STDDEV(n), Lower = Middle - k*STDDEV(n),
//! with the sample standard deviation.

use super::{calculate_sma, calculate_stddev, safe_div, zip_with};

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerBands {
    /// (upper - lower) / middle
    pub fn width(&self) -> Vec<f64> {
        self.upper
            .iter()
            .zip(self.lower.iter().zip(self.middle.iter()))
            .map(|(&u, (&l, &m))| safe_div(u - l, m))
            .collect()
    }

    /// (close - lower) / (upper - lower); undefined when the bands collapse.
    pub fn percent_b(&self, closes: &[f64]) -> Vec<f64> {
        closes
            .iter()
            .zip(self.upper.iter().zip(self.lower.iter()))
            .map(|(&c, (&u, &l))| safe_div(c - l, u - l))
            .collect()
    }
}

pub fn calculate_bollinger(values: &[f64], period: usize, multiplier: f64) -> BollingerBands {
    let middle = calculate_sma(values, period);
    let std = calculate_stddev(values, period);
    let upper = zip_with(&middle, &std, |m, s| m + multiplier * s);
    let lower = zip_with(&middle, &std, |m, s| m - multiplier * s);
    BollingerBands {
        upper,
        middle,
        lower,
    }
}
