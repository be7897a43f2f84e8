//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with the first SMA, then EMA[i] = v[i]*k + EMA[i-1]*(1-k).
//! Leading undefined input (e.g. a MACD line) delays the seed; the first
//! (n-1) defined values are the warmup.

pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    let Some(first) = values.iter().position(|v| v.is_finite()) else {
        return out;
    };

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema: Option<f64> = None;
    let mut sum = 0.0;
    let mut count = 0usize;

    for i in first..values.len() {
        let v = values[i];
        if !v.is_finite() {
            continue;
        }
        match ema {
            None => {
                sum += v;
                count += 1;
                if count == period {
                    let seed = sum / period as f64;
                    ema = Some(seed);
                    out[i] = seed;
                }
            }
            Some(prev) => {
                let next = v * k + prev * (1.0 - k);
                ema = Some(next);
                out[i] = next;
            }
        }
    }
    out
}
