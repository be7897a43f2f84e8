//! Runtime values of the rule script interpreter.
//!
//! Row and frame values are borrowed views into the [`IndicatorPanel`]; series
//! values share their backing storage through an `Arc`, so slicing a panel
//! column never copies it.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::domain::error::ScriptFault;
use crate::domain::panel::IndicatorPanel;

/// A contiguous, read-only window of a numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesView {
    data: Arc<[f64]>,
    start: usize,
    end: usize,
}

impl SeriesView {
    pub fn new(data: Arc<[f64]>, start: usize, end: usize) -> Self {
        let end = end.min(data.len());
        let start = start.min(end);
        SeriesView { data, start, end }
    }

    pub fn from_vec(values: Vec<f64>) -> Self {
        let len = values.len();
        SeriesView::new(values.into(), 0, len)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, counting from the end when negative.
    pub fn get(&self, index: i64) -> Option<f64> {
        resolve_index(index, self.len()).map(|i| self.as_slice()[i])
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> SeriesView {
        SeriesView::from_vec(self.as_slice().iter().map(|&v| f(v)).collect())
    }

    /// Values that are not NaN.
    pub fn defined(&self) -> impl Iterator<Item = f64> + '_ {
        self.as_slice().iter().copied().filter(|v| !v.is_nan())
    }
}

/// One bar of the panel.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'p> {
    pub panel: &'p IndicatorPanel,
    pub index: usize,
}

impl<'p> RowView<'p> {
    pub fn field(&self, name: &str) -> Result<Value<'p>, ScriptFault> {
        if matches!(name, "timestamp" | "date") {
            return Ok(match self.panel.timestamp(self.index) {
                Some(ts) => Value::Str(ts.format("%Y-%m-%d").to_string()),
                None => Value::None,
            });
        }
        self.panel
            .value(name, self.index)
            .map(Value::Number)
            .ok_or_else(|| ScriptFault::new(format!("unknown column '{name}'")))
    }
}

/// A run of consecutive bars `[start, end)` of the panel.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'p> {
    pub panel: &'p IndicatorPanel,
    pub start: usize,
    pub end: usize,
}

impl<'p> FrameView<'p> {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, name: &str) -> Result<SeriesView, ScriptFault> {
        self.panel
            .column(name)
            .map(|col| SeriesView::new(Arc::clone(col), self.start, self.end))
            .ok_or_else(|| ScriptFault::new(format!("unknown column '{name}'")))
    }

    pub fn row(&self, index: i64) -> Result<RowView<'p>, ScriptFault> {
        let i = resolve_index(index, self.len()).ok_or_else(|| {
            ScriptFault::new(format!(
                "row index {index} out of range for {} rows",
                self.len()
            ))
        })?;
        Ok(RowView {
            panel: self.panel,
            index: self.start + i,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Value<'p> {
    None,
    Bool(bool),
    Number(f64),
    Str(String),
    Series(SeriesView),
    List(Vec<Value<'p>>),
    Map(BTreeMap<String, Value<'p>>),
    Row(RowView<'p>),
    Frame(FrameView<'p>),
}

impl<'p> Value<'p> {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "str",
            Value::Series(_) => "series",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Row(_) => "row",
            Value::Frame(_) => "frame",
        }
    }

    /// Numeric value of a number or bool.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Truth value in a condition. NaN is false; vector values have no
    /// single truth value and fault.
    pub fn truthy(&self) -> Result<bool, ScriptFault> {
        Ok(match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Series(_) | Value::Row(_) | Value::Frame(_) => {
                return Err(ScriptFault::new(format!(
                    "the truth value of a {} is ambiguous; index a single value first",
                    self.type_name()
                )));
            }
        })
    }

    /// Numbers of an iterable value: a series, or a list of numbers.
    pub fn numbers(&self) -> Result<Vec<f64>, ScriptFault> {
        match self {
            Value::Series(s) => Ok(s.as_slice().to_vec()),
            Value::List(items) => items
                .iter()
                .map(|v| {
                    v.as_number().ok_or_else(|| {
                        ScriptFault::new(format!("expected a list of numbers, found {}", v.type_name()))
                    })
                })
                .collect(),
            other => Err(ScriptFault::new(format!(
                "expected a series or list, found {}",
                other.type_name()
            ))),
        }
    }

    /// Text shown by `str()` and f-string fields.
    pub fn display(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Series(s) => format!("series(len={})", s.len()),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Map(map) => {
                let mut out = String::from("{");
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "'{k}': {}", v.repr());
                }
                out.push('}');
                out
            }
            Value::Row(row) => format!("row({})", row.index),
            Value::Frame(frame) => format!("frame(rows={})", frame.len()),
        }
    }

    fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{s}'"),
            other => other.display(),
        }
    }
}

/// Integral floats keep a trailing `.0`; non-finite values print as
/// `nan`, `inf` and `-inf`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

/// Map a possibly negative index onto `0..len`.
pub fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { len + index } else { index };
    (0..len).contains(&i).then_some(i as usize)
}
