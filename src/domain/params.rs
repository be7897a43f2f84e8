//! Strategy parameters as supplied by a caller or a config file.
//!
//! Keys are free-form; each strategy reads the keys it knows, accepting the
//! alias spellings listed at its call sites (`rsi_period` or `period`, and so
//! on). Malformed values are `ConfigInvalid` errors naming the offending key.

use std::collections::BTreeMap;

use crate::domain::error::EngineError;

const SECTION: &str = "strategy";

/// Largest accepted window length.
pub const MAX_WINDOW: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyParams {
    values: BTreeMap<String, ParamValue>,
}

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number(mut self, key: &str, value: f64) -> Self {
        self.values.insert(key.to_string(), ParamValue::Number(value));
        self
    }

    pub fn with_text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values
            .insert(key.to_string(), ParamValue::Text(value.into()));
        self
    }

    /// Insert a raw config value: numeric text becomes a number.
    pub fn insert_raw(&mut self, key: &str, raw: &str) {
        let value = match raw.trim().parse::<f64>() {
            Ok(n) => ParamValue::Number(n),
            Err(_) => ParamValue::Text(raw.to_string()),
        };
        self.values.insert(key.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The first alias present, with the key it was found under.
    pub fn get<'s, 'k>(&'s self, aliases: &[&'k str]) -> Option<(&'k str, &'s ParamValue)> {
        aliases
            .iter()
            .find_map(|&k| self.values.get(k).map(|v| (k, v)))
    }

    pub fn f64_or(&self, aliases: &[&str], default: f64) -> Result<f64, EngineError> {
        match self.get(aliases) {
            None => Ok(default),
            Some((_, ParamValue::Number(n))) if n.is_finite() => Ok(*n),
            Some((key, ParamValue::Number(n))) => Err(EngineError::config_invalid(
                SECTION,
                key,
                format!("expected a finite number, got {n}"),
            )),
            Some((key, ParamValue::Text(t))) => Err(EngineError::config_invalid(
                SECTION,
                key,
                format!("expected a number, got '{t}'"),
            )),
        }
    }

    /// A window length: a whole number between 1 and [`MAX_WINDOW`].
    pub fn usize_or(&self, aliases: &[&str], default: usize) -> Result<usize, EngineError> {
        let Some((key, _)) = self.get(aliases) else {
            return Ok(default);
        };
        let n = self.f64_or(aliases, default as f64)?;
        if n < 1.0 || n.fract() != 0.0 {
            return Err(EngineError::config_invalid(
                SECTION,
                key,
                format!("expected a positive whole number, got {n}"),
            ));
        }
        if n > MAX_WINDOW as f64 {
            return Err(EngineError::config_invalid(
                SECTION,
                key,
                format!("window {n} exceeds the maximum of {MAX_WINDOW}"),
            ));
        }
        Ok(n as usize)
    }

    /// A fraction or threshold that must not be negative.
    pub fn non_negative_or(&self, aliases: &[&str], default: f64) -> Result<f64, EngineError> {
        let Some((key, _)) = self.get(aliases) else {
            return Ok(default);
        };
        let n = self.f64_or(aliases, default)?;
        if n < 0.0 {
            return Err(EngineError::config_invalid(
                SECTION,
                key,
                format!("must not be negative, got {n}"),
            ));
        }
        Ok(n)
    }

    pub fn text(&self, aliases: &[&str]) -> Result<Option<&str>, EngineError> {
        match self.get(aliases) {
            None => Ok(None),
            Some((_, ParamValue::Text(t))) => Ok(Some(t.as_str())),
            Some((key, ParamValue::Number(_))) => Err(EngineError::config_invalid(
                SECTION,
                key,
                "expected text, got a number",
            )),
        }
    }
}

/// Fail with `ConfigInvalid` on `key` unless `ok`.
pub(crate) fn ensure(ok: bool, key: &str, reason: impl Into<String>) -> Result<(), EngineError> {
    if ok {
        Ok(())
    } else {
        Err(EngineError::config_invalid(SECTION, key, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_absent() {
        let p = StrategyParams::new();
        assert_eq!(p.usize_or(&["period"], 14).unwrap(), 14);
        assert_eq!(p.f64_or(&["x"], 0.5).unwrap(), 0.5);
        assert_eq!(p.text(&["custom_code"]).unwrap(), None);
    }

    #[test]
    fn first_alias_wins() {
        let p = StrategyParams::new()
            .with_number("period", 10.0)
            .with_number("rsi_period", 7.0);
        assert_eq!(p.usize_or(&["rsi_period", "period"], 14).unwrap(), 7);
        assert_eq!(p.usize_or(&["period", "rsi_period"], 14).unwrap(), 10);
    }

    #[test]
    fn raw_values_are_typed() {
        let mut p = StrategyParams::new();
        p.insert_raw("period", " 20 ");
        p.insert_raw("custom_code", "signal = 1");
        assert_eq!(p.usize_or(&["period"], 1).unwrap(), 20);
        assert_eq!(p.text(&["custom_code"]).unwrap(), Some("signal = 1"));
    }

    #[test]
    fn malformed_windows_rejected() {
        for v in [0.0, -3.0, 2.5, f64::NAN] {
            let p = StrategyParams::new().with_number("period", v);
            let err = p.usize_or(&["period"], 14).unwrap_err();
            assert!(err.is_config(), "{v}");
        }
        let p = StrategyParams::new().with_text("period", "abc");
        assert!(matches!(
            p.usize_or(&["period"], 14),
            Err(EngineError::ConfigInvalid { key, .. }) if key == "period"
        ));
    }

    #[test]
    fn oversized_windows_rejected() {
        for v in [1e20, f64::MAX, (MAX_WINDOW + 1) as f64] {
            let p = StrategyParams::new().with_number("period", v);
            let err = p.usize_or(&["period"], 14).unwrap_err();
            assert!(err.is_config(), "{v}");
        }
        let p = StrategyParams::new().with_number("period", MAX_WINDOW as f64);
        assert_eq!(p.usize_or(&["period"], 14).unwrap(), MAX_WINDOW);
    }

    #[test]
    fn negative_threshold_rejected() {
        let p = StrategyParams::new().with_number("stop_loss", -0.1);
        assert!(p.non_negative_or(&["stop_loss"], 0.05).is_err());
    }
}
