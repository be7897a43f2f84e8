#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use strategylab::domain::error::EngineError;
pub use strategylab::domain::ohlcv::{PriceBar, PriceSeries};
use strategylab::ports::data_port::DataPort;

/// In-memory price source.
pub struct MockDataPort {
    pub bars: Vec<PriceBar>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new(bars: Vec<PriceBar>) -> Self {
        Self { bars, error: None }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            bars: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

impl DataPort for MockDataPort {
    fn load_bars(&self) -> Result<Vec<PriceBar>, EngineError> {
        match &self.error {
            Some(reason) => Err(EngineError::data_invalid(reason.clone())),
            None => Ok(self.bars.clone()),
        }
    }
}

pub fn day(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::days(i as i64)
}

/// One bar per close, one day apart, with a small high/low range.
pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceBar {
            timestamp: day(i),
            open: c,
            high: c * 1.01,
            low: c * 0.99,
            close: c,
            volume: 10_000.0 + (i % 7) as f64 * 1_000.0,
        })
        .collect()
}

pub fn make_series(closes: &[f64]) -> PriceSeries {
    PriceSeries::new(make_bars(closes)).unwrap()
}

/// A deterministic oscillating price path that crosses its averages often.
pub fn wave(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + 15.0 * (t / 9.0).sin() + 5.0 * (t / 3.7).cos() + 0.05 * t
        })
        .collect()
}

pub fn csv_text(bars: &[PriceBar]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            b.timestamp.format("%Y-%m-%d"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        )
        .unwrap();
    }
    out
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
