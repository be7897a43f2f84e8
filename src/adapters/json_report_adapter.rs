//! JSON report adapter implementing ReportPort.
//!
//! Writes the whole result record, pretty printed, with every float already
//! sanitised to a finite value.

use std::fs;
use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::EngineError;
use crate::ports::report_port::ReportPort;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        JsonReportAdapter
    }

    pub fn render(result: &BacktestResult) -> Result<String, EngineError> {
        serde_json::to_string_pretty(result).map_err(|e| EngineError::Report {
            reason: format!("failed to serialise result: {e}"),
        })
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), EngineError> {
        let json = Self::render(result)?;
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, json)?;
        log::debug!("wrote {} report to {}", result.strategy, output_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_pretty_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/result.json");
        JsonReportAdapter::new()
            .write(&BacktestResult::empty("rsi"), &path)
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["strategy"], "rsi");
        assert_eq!(value["metrics"]["total_trades"], 0);
        assert!(text.contains('\n'));
    }

    #[test]
    fn write_all_suffixes_each_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cmp.json");
        let results = [BacktestResult::empty("rsi"), BacktestResult::empty("ma_cross")];
        JsonReportAdapter::new().write_all(&results, &path).unwrap();
        assert!(dir.path().join("cmp_0_rsi.json").exists());
        assert!(dir.path().join("cmp_1_ma_cross.json").exists());
    }
}
