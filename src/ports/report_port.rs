//! Report output port trait.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::EngineError;

/// Port for writing backtest results.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), EngineError>;

    /// Default implementation: one file per result, suffixed with its position.
    fn write_all(&self, results: &[BacktestResult], output_path: &Path) -> Result<(), EngineError> {
        for (i, result) in results.iter().enumerate() {
            let stem = output_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "report".to_string());
            let ext = output_path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            let path = output_path.with_file_name(format!("{stem}_{i}_{}{ext}", result.strategy));
            self.write(result, &path)?;
        }
        Ok(())
    }
}
