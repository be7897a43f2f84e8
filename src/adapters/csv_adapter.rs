//! CSV price data adapter.
//!
//! Columns are found by header name, case-insensitively: `timestamp` (or
//! `date`), `open`, `high`, `low`, `close`, `volume`. Extra columns are
//! ignored.

use crate::domain::error::EngineError;
use crate::domain::ohlcv::PriceBar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvAdapter {
    path: PathBuf,
}

/// Field positions resolved from the header row.
struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, EngineError> {
        let find = |names: &[&str]| -> Result<usize, EngineError> {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
                .ok_or_else(|| EngineError::data_invalid(format!("missing {} column", names[0])))
        };
        Ok(Columns {
            timestamp: find(&["timestamp", "date"])?,
            open: find(&["open"])?,
            high: find(&["high"])?,
            low: find(&["low"])?,
            close: find(&["close"])?,
            volume: find(&["volume"])?,
        })
    }
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Parse CSV text. Used by `load_bars` and directly by tests.
    pub fn parse(content: &str) -> Result<Vec<PriceBar>, EngineError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| EngineError::data_invalid(format!("CSV header error: {e}")))?
            .clone();
        let cols = Columns::from_headers(&headers)?;

        let mut bars = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record =
                result.map_err(|e| EngineError::data_invalid(format!("CSV parse error: {e}")))?;
            let line = row + 2;
            bars.push(PriceBar {
                timestamp: parse_timestamp(field(&record, cols.timestamp, "timestamp", line)?)
                    .ok_or_else(|| {
                        EngineError::data_invalid(format!("line {line}: invalid timestamp"))
                    })?,
                open: number(&record, cols.open, "open", line)?,
                high: number(&record, cols.high, "high", line)?,
                low: number(&record, cols.low, "low", line)?,
                close: number(&record, cols.close, "close", line)?,
                volume: number(&record, cols.volume, "volume", line)?,
            });
        }
        Ok(bars)
    }
}

fn field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    name: &str,
    line: usize,
) -> Result<&'r str, EngineError> {
    record
        .get(idx)
        .ok_or_else(|| EngineError::data_invalid(format!("line {line}: missing {name} value")))
}

fn number(record: &csv::StringRecord, idx: usize, name: &str, line: usize) -> Result<f64, EngineError> {
    let raw = field(record, idx, name, line)?;
    raw.parse::<f64>().map_err(|e| {
        EngineError::data_invalid(format!("line {line}: invalid {name} value '{raw}': {e}"))
    })
}

/// `YYYY-MM-DD` (midnight), `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl DataPort for CsvAdapter {
    fn load_bars(&self) -> Result<Vec<PriceBar>, EngineError> {
        let content = fs::read_to_string(&self.path)?;
        let bars = Self::parse(&content)?;
        log::debug!("loaded {} bars from {}", bars.len(), self.path.display());
        Ok(bars)
    }
}
