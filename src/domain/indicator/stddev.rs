//! Rolling sample standard deviation and z-score.
//!
//! Uses the n-1 denominator. Periods below 2 have no sample deviation and
//! produce an undefined series.

use super::{calculate_sma, mean, rolling, safe_div};

pub fn calculate_stddev(values: &[f64], period: usize) -> Vec<f64> {
    if period < 2 {
        return vec![f64::NAN; values.len()];
    }
    rolling(values, period, sample_std)
}

/// (v - SMA) / STDDEV over the same window.
pub fn calculate_zscore(values: &[f64], period: usize) -> Vec<f64> {
    let avg = calculate_sma(values, period);
    let std = calculate_stddev(values, period);
    values
        .iter()
        .zip(avg.iter().zip(std.iter()))
        .map(|(&v, (&m, &s))| safe_div(v - m, s))
        .collect()
}

pub(crate) fn sample_std(window: &[f64]) -> f64 {
    if window.len() < 2 {
        return f64::NAN;
    }
    let m = mean(window);
    let var = window.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (window.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stddev_sample_denominator() {
        // 2,4,4,4,5,5,7,9 → sample variance 32/7
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let out = calculate_stddev(&values, 8);
        assert!((out[7] - (32.0_f64 / 7.0).sqrt()).abs() < 1e-10);
    }

    #[test]
    fn stddev_constant_is_zero() {
        let out = calculate_stddev(&[3.0; 5], 3);
        assert!((out[4]).abs() < 1e-12);
    }

    #[test]
    fn stddev_period_one_undefined() {
        let out = calculate_stddev(&[1.0, 2.0], 1);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn zscore_of_constant_is_undefined() {
        let out = calculate_zscore(&[3.0; 5], 3);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn zscore_value() {
        // window 1,2,3: mean 2, std 1 → z(3) = 1
        let out = calculate_zscore(&[1.0, 2.0, 3.0], 3);
        assert!((out[2] - 1.0).abs() < 1e-10);
    }
}
