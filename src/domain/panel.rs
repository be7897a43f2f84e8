//! Named, index-aligned indicator columns over one price series.
//!
//! The panel is the per-bar data surface of the custom rule engine: every
//! column has exactly one value per bar, NaN where the indicator is still
//! warming up. Columns are shared immutably (`Arc<[f64]>`), so views handed to
//! rule scripts never copy.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::indicator::channels::{
    calculate_donchian, calculate_keltner, calculate_pivots, calculate_rolling_max,
    calculate_rolling_min,
};
use super::indicator::momentum::{calculate_cci, calculate_momentum, calculate_roc};
use super::indicator::volume::{
    calculate_accumulation_distribution, calculate_obv, calculate_pvt, calculate_volume_ratio,
    calculate_vwap,
};
use super::indicator::{
    calculate_atr, calculate_bollinger, calculate_ema, calculate_hull_ma, calculate_macd,
    calculate_rsi, calculate_sma, calculate_stddev, calculate_stochastic, calculate_true_range,
    calculate_williams_r, calculate_wma, pct_change, safe_div,
};
use super::ohlcv::PriceSeries;

pub const SMA_PERIODS: [usize; 13] = [3, 5, 7, 10, 12, 15, 20, 25, 30, 50, 60, 100, 200];
pub const EMA_PERIODS: [usize; 6] = [5, 10, 12, 20, 26, 50];
pub const WMA_PERIODS: [usize; 3] = [5, 10, 20];
pub const RSI_PERIODS: [usize; 3] = [7, 14, 21];
pub const MACD_PAIRS: [(usize, usize); 3] = [(5, 10), (12, 26), (8, 21)];
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIODS: [usize; 3] = [10, 20, 50];
/// Multipliers paired with their column suffix (multiplier * 10).
pub const BOLLINGER_MULTIPLIERS: [(f64, u32); 3] = [(1.5, 15), (2.0, 20), (2.5, 25)];
pub const ATR_PERIODS: [usize; 3] = [7, 14, 21];
pub const DONCHIAN_PERIODS: [usize; 3] = [10, 20, 55];
pub const KELTNER_PERIODS: [usize; 2] = [10, 20];
pub const VOLUME_MA_PERIODS: [usize; 4] = [5, 10, 20, 50];
pub const LEVEL_PERIOD: usize = 20;

pub const BASE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

#[derive(Debug, Clone)]
pub struct IndicatorPanel {
    timestamps: Arc<[NaiveDateTime]>,
    columns: BTreeMap<String, Arc<[f64]>>,
}

impl IndicatorPanel {
    /// Panel holding only the raw OHLCV columns.
    pub fn from_series(series: &PriceSeries) -> Self {
        let mut panel = IndicatorPanel {
            timestamps: series.timestamps().into(),
            columns: BTreeMap::new(),
        };
        panel.insert("open", series.opens());
        panel.insert("high", series.highs());
        panel.insert("low", series.lows());
        panel.insert("close", series.closes());
        panel.insert("volume", series.volumes());
        panel
    }

    /// Panel with the full indicator set used by custom rule scripts.
    pub fn full(series: &PriceSeries) -> Self {
        let mut panel = Self::from_series(series);
        let (highs, lows, closes) = (&series.highs(), &series.lows(), &series.closes());
        let volumes = series.volumes();

        for p in SMA_PERIODS {
            panel.insert(&format!("ma{p}"), calculate_sma(closes, p));
        }
        for p in EMA_PERIODS {
            panel.insert(&format!("ema{p}"), calculate_ema(closes, p));
        }
        for p in WMA_PERIODS {
            panel.insert(&format!("wma{p}"), calculate_wma(closes, p));
        }
        panel.insert("hma9", calculate_hull_ma(closes, 9));
        panel.insert("hma21", calculate_hull_ma(closes, 21));

        let tr = calculate_true_range(highs, lows, closes);
        panel.insert("atr", calculate_sma(&tr, 14));
        panel.insert("tr", tr);
        panel.insert("cci", calculate_cci(highs, lows, closes, 14));
        panel.insert("roc", calculate_roc(closes, 10));

        for p in RSI_PERIODS {
            panel.insert(&format!("rsi{p}"), calculate_rsi(closes, p));
        }

        let stoch = calculate_stochastic(highs, lows, closes, 14, 3);
        panel.insert("stoch_k", stoch.k);
        panel.insert("stoch_d", stoch.d);
        panel.insert("williams_r", calculate_williams_r(highs, lows, closes, 14));

        for (fast, slow) in MACD_PAIRS {
            let macd = calculate_macd(closes, fast, slow, MACD_SIGNAL);
            panel.insert(&format!("macd_{fast}_{slow}"), macd.line);
            panel.insert(&format!("macd_signal_{fast}_{slow}"), macd.signal);
            panel.insert(&format!("macd_hist_{fast}_{slow}"), macd.histogram);
        }
        panel.alias("macd", "macd_12_26");
        panel.alias("macd_signal", "macd_signal_12_26");
        panel.alias("macd_hist", "macd_hist_12_26");

        for p in BOLLINGER_PERIODS {
            for (mult, suffix) in BOLLINGER_MULTIPLIERS {
                let bands = calculate_bollinger(closes, p, mult);
                panel.insert(&format!("bb{p}_width_{suffix}"), bands.width());
                panel.insert(&format!("bb{p}_percent_{suffix}"), bands.percent_b(closes));
                panel.insert(&format!("bb{p}_upper_{suffix}"), bands.upper);
                panel.insert(&format!("bb{p}_lower_{suffix}"), bands.lower);
                panel.insert(&format!("bb{p}_middle"), bands.middle);
            }
        }
        panel.alias("bb_upper", "bb20_upper_20");
        panel.alias("bb_middle", "bb20_middle");
        panel.alias("bb_lower", "bb20_lower_20");

        for p in ATR_PERIODS {
            panel.insert(&format!("atr{p}"), calculate_atr(highs, lows, closes, p));
        }
        for p in DONCHIAN_PERIODS {
            let dc = calculate_donchian(highs, lows, p);
            panel.insert(&format!("dc{p}_upper"), dc.upper);
            panel.insert(&format!("dc{p}_middle"), dc.middle);
            panel.insert(&format!("dc{p}_lower"), dc.lower);
        }
        for p in KELTNER_PERIODS {
            let kc = calculate_keltner(highs, lows, closes, p);
            panel.insert(&format!("kc{p}_upper"), kc.upper);
            panel.insert(&format!("kc{p}_middle"), kc.middle);
            panel.insert(&format!("kc{p}_lower"), kc.lower);
        }

        for p in VOLUME_MA_PERIODS {
            panel.insert(&format!("volume_ma{p}"), calculate_sma(&volumes, p));
        }
        panel.insert("volume_ratio", calculate_volume_ratio(&volumes, 20));
        panel.insert("pvt", calculate_pvt(closes, &volumes));
        panel.insert("obv", calculate_obv(closes, &volumes));
        panel.insert("vwap", calculate_vwap(closes, &volumes));
        panel.insert(
            "ad",
            calculate_accumulation_distribution(highs, lows, closes, &volumes),
        );

        panel.insert("resistance", calculate_rolling_max(highs, LEVEL_PERIOD));
        panel.insert("support", calculate_rolling_min(lows, LEVEL_PERIOD));
        let pivots = calculate_pivots(highs, lows, closes);
        panel.insert("pivot", pivots.pivot);
        panel.insert("r1", pivots.r1);
        panel.insert("s1", pivots.s1);
        panel.insert("r2", pivots.r2);
        panel.insert("s2", pivots.s2);

        let ma20 = calculate_sma(closes, 20);
        let strength: Vec<f64> = closes
            .iter()
            .zip(ma20.iter())
            .map(|(&c, &m)| safe_div(c, m))
            .collect();
        panel.insert("price_strength", strength);
        panel.insert("momentum_factor", calculate_momentum(closes, 20));
        panel.insert(
            "volatility_factor",
            calculate_stddev(&pct_change(closes, 1), 20),
        );

        panel
    }

    pub fn insert(&mut self, name: &str, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.timestamps.len());
        self.columns.insert(name.to_string(), values.into());
    }

    fn alias(&mut self, alias: &str, source: &str) {
        if let Some(col) = self.columns.get(source).cloned() {
            self.columns.insert(alias.to_string(), col);
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Arc<[f64]>> {
        self.columns.get(name)
    }

    pub fn value(&self, name: &str, index: usize) -> Option<f64> {
        self.columns.get(name).and_then(|c| c.get(index).copied())
    }

    pub fn timestamp(&self, index: usize) -> Option<NaiveDateTime> {
        self.timestamps.get(index).copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}
