//! Volume-weighted measures: OBV, VWAP, PVT, A/D line, volume ratio and the
//! volume-by-price profile.

use super::{calculate_sma, pct_change, safe_div};

/// On-Balance Volume.
///
/// OBV[0] = 0, then +volume on an up close, -volume on a down close, unchanged
/// on a flat close. No warmup.
pub fn calculate_obv(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(closes.len());
    let mut obv = 0.0;
    for i in 0..closes.len().min(volumes.len()) {
        if i > 0 {
            if closes[i] > closes[i - 1] {
                obv += volumes[i];
            } else if closes[i] < closes[i - 1] {
                obv -= volumes[i];
            }
        }
        out.push(obv);
    }
    out
}

/// Cumulative VWAP: sum(C * V) / sum(V). Undefined until some volume trades.
pub fn calculate_vwap(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut pv = 0.0;
    let mut vol = 0.0;
    closes
        .iter()
        .zip(volumes.iter())
        .map(|(&c, &v)| {
            pv += c * v;
            vol += v;
            safe_div(pv, vol)
        })
        .collect()
}

/// Price-Volume Trend: cumulative pct_change * volume. PVT[0] is undefined.
pub fn calculate_pvt(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let changes = pct_change(closes, 1);
    let mut acc = 0.0;
    changes
        .iter()
        .zip(volumes.iter())
        .enumerate()
        .map(|(i, (&r, &v))| {
            if i == 0 {
                return f64::NAN;
            }
            if r.is_finite() {
                acc += r * v;
            }
            acc
        })
        .collect()
}

/// Accumulation/Distribution line.
///
/// MFM = ((C - L) - (H - C)) / (H - L), treated as 0 on a zero-range bar;
/// AD = cumulative MFM * V.
pub fn calculate_accumulation_distribution(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    volumes: &[f64],
) -> Vec<f64> {
    let mut acc = 0.0;
    (0..closes.len())
        .map(|i| {
            let mfm = safe_div((closes[i] - lows[i]) - (highs[i] - closes[i]), highs[i] - lows[i]);
            if mfm.is_finite() {
                acc += mfm * volumes[i];
            }
            acc
        })
        .collect()
}

/// V / SMA(V, n)
pub fn calculate_volume_ratio(volumes: &[f64], period: usize) -> Vec<f64> {
    let avg = calculate_sma(volumes, period);
    volumes
        .iter()
        .zip(avg.iter())
        .map(|(&v, &a)| safe_div(v, a))
        .collect()
}

/// Volume traded per price bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeProfile {
    /// Summed volume per bucket.
    pub volume: Vec<f64>,
    /// `bins + 1` bucket edges, lowest first.
    pub edges: Vec<f64>,
    /// Lower edge of the bucket with the most volume (first one on ties).
    pub poc: f64,
}

/// Split `[min(prices), max(prices)]` into `bins` equal buckets and sum the
/// volume traded in each. The top edge belongs to the last bucket. When every
/// price is equal the range is widened by 0.5 either side.
///
/// `None` for empty or mismatched input, zero bins, or any non-finite value.
pub fn calculate_volume_profile(prices: &[f64], volumes: &[f64], bins: usize) -> Option<VolumeProfile> {
    if bins == 0 || prices.is_empty() || prices.len() != volumes.len() {
        return None;
    }
    if prices.iter().chain(volumes.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    let mut lo = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut volume = vec![0.0; bins];
    for (&p, &v) in prices.iter().zip(volumes.iter()) {
        let bucket = (((p - lo) / width).floor() as usize).min(bins - 1);
        volume[bucket] += v;
    }
    let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();

    let mut top = 0;
    for (i, &v) in volume.iter().enumerate() {
        if v > volume[top] {
            top = i;
        }
    }
    Some(VolumeProfile {
        poc: edges[top],
        volume,
        edges,
    })
}
