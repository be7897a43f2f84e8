//! Domain error types.

/// A parse error with line/column information for rule scripts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    /// Format the error with the offending source line and a caret under the column.
    pub fn display_with_context(&self, input: &str) -> String {
        let source_line = input
            .lines()
            .nth(self.line.saturating_sub(1))
            .unwrap_or("");
        let caret = " ".repeat(self.column.saturating_sub(1)) + "^";
        format!(
            "{source_line}\n{caret}\n{err}",
            source_line = source_line,
            caret = caret,
            err = self
        )
    }
}

/// A fault raised while evaluating a rule script on one bar.
///
/// Never fatal: the custom strategy logs it and treats the bar as a hold.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptFault {
    pub message: String,
}

impl ScriptFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Top-level error type for strategylab.
///
/// Only these variants abort a backtest call; per-bar script faults and
/// degenerate metric inputs are recovered where they occur.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy '{id}' (expected one of: ma_cross, rsi, bollinger, custom)")]
    UnknownStrategy { id: String },

    #[error("invalid rule script: {0}")]
    ScriptInvalid(#[from] ParseError),

    #[error("invalid price data: {reason}")]
    DataInvalid { reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        EngineError::ConfigInvalid {
            section: section.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn data_invalid(reason: impl Into<String>) -> Self {
        EngineError::DataInvalid {
            reason: reason.into(),
        }
    }

    /// True for the configuration family (unknown strategy, malformed parameters).
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigParse { .. }
                | EngineError::ConfigMissing { .. }
                | EngineError::ConfigInvalid { .. }
                | EngineError::UnknownStrategy { .. }
        )
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) | EngineError::Report { .. } => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. }
            | EngineError::UnknownStrategy { .. } => 2,
            EngineError::ScriptInvalid(_) => 4,
            EngineError::DataInvalid { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = ParseError::new("unexpected token ')'", 2, 7);
        assert_eq!(err.to_string(), "line 2, column 7: unexpected token ')'");
    }

    #[test]
    fn parse_error_context_points_at_column() {
        let src = "signal = 1\nx = (1 +)\n";
        let err = ParseError::new("unexpected token ')'", 2, 9);
        let shown = err.display_with_context(src);
        let lines: Vec<&str> = shown.lines().collect();
        assert_eq!(lines[0], "x = (1 +)");
        assert_eq!(lines[1], "        ^");
    }

    #[test]
    fn script_invalid_wraps_parse_error() {
        let err: EngineError = ParseError::new("bad", 1, 1).into();
        assert!(matches!(err, EngineError::ScriptInvalid(_)));
        assert!(!err.is_config());
    }

    #[test]
    fn config_family() {
        assert!(EngineError::UnknownStrategy { id: "x".into() }.is_config());
        assert!(EngineError::config_invalid("strategy", "period", "must be > 0").is_config());
        assert!(!EngineError::data_invalid("empty").is_config());
    }
}
