//! Rolling cross-sectional statistics used by the rule helper library.

use super::{mean, safe_div};

/// Pearson correlation of two aligned series over a trailing window.
pub fn calculate_rolling_corr(a: &[f64], b: &[f64], period: usize) -> Vec<f64> {
    let n = a.len().min(b.len());
    let mut out = vec![f64::NAN; n];
    if period < 2 || period > n {
        return out;
    }
    for end in period..=n {
        let wa = &a[end - period..end];
        let wb = &b[end - period..end];
        if !wa.iter().chain(wb.iter()).all(|v| v.is_finite()) {
            continue;
        }
        let (ma, mb) = (mean(wa), mean(wb));
        let mut cov = 0.0;
        let mut va = 0.0;
        let mut vb = 0.0;
        for (x, y) in wa.iter().zip(wb.iter()) {
            cov += (x - ma) * (y - mb);
            va += (x - ma).powi(2);
            vb += (y - mb).powi(2);
        }
        out[end - 1] = safe_div(cov, (va * vb).sqrt());
    }
    out
}

/// Percentile rank of the newest value within its trailing window, in (0, 1].
///
/// Ties take the average rank.
pub fn calculate_rolling_rank(values: &[f64], period: usize) -> Vec<f64> {
    super::rolling(values, period, |w| {
        let last = w[w.len() - 1];
        let below = w.iter().filter(|&&v| v < last).count() as f64;
        let equal = w.iter().filter(|&&v| v == last).count() as f64;
        (below + (equal + 1.0) / 2.0) / w.len() as f64
    })
}
