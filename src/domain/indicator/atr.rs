//! True Range and Average True Range.
//!
//! TR[0] = H[0] - L[0], TR[i] = max(H-L, |H-C[i-1]|, |L-C[i-1]|).
//! ATR(n) = SMA(TR, n); warmup is the first (n-1) bars.

use super::calculate_sma;

pub fn calculate_true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = highs.len().min(lows.len()).min(closes.len());
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let hl = highs[i] - lows[i];
        if i == 0 {
            out.push(hl);
        } else {
            let hc = (highs[i] - closes[i - 1]).abs();
            let lc = (lows[i] - closes[i - 1]).abs();
            out.push(hl.max(hc).max(lc));
        }
    }
    out
}

pub fn calculate_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    calculate_sma(&calculate_true_range(highs, lows, closes), period)
}
