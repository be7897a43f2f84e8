//! Tree-walking evaluator for parsed rule scripts.
//!
//! One [`Interpreter`] evaluates one script on one bar. Every failure is a
//! [`ScriptFault`] tagged with the line of the statement that raised it; the
//! caller decides what a fault means for the bar.

use std::collections::HashMap;

use crate::domain::error::ScriptFault;
use crate::domain::script::{BinOp, CmpOp, Expr, ExprKind, FStringPart, Script, Stmt, StmtKind, UnaryOp};
use crate::domain::script_helpers;
use crate::domain::script_value::{format_number, resolve_index, SeriesView, Value};

/// Methods callable on values with `.name(...)`.
pub const METHODS: [&str; 8] = ["mean", "std", "min", "max", "sum", "abs", "last", "get"];

#[derive(Debug, Default)]
pub struct Interpreter<'p> {
    vars: HashMap<String, Value<'p>>,
}

impl<'p> Interpreter<'p> {
    pub fn new() -> Self {
        Interpreter {
            vars: HashMap::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: Value<'p>) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value<'p>> {
        self.vars.get(name)
    }

    pub fn run(&mut self, script: &Script) -> Result<(), ScriptFault> {
        self.exec_block(&script.body)
    }

    fn exec_block(&mut self, body: &[Stmt]) -> Result<(), ScriptFault> {
        for stmt in body {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), ScriptFault> {
        let at_line = |fault: ScriptFault| {
            ScriptFault::new(format!("line {}: {}", stmt.pos.line, fault.message))
        };
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let v = self.eval(value).map_err(at_line)?;
                self.vars.insert(target.clone(), v);
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.lookup(target).map_err(at_line)?;
                let rhs = self.eval(value).map_err(at_line)?;
                let v = binary(*op, current, rhs).map_err(at_line)?;
                self.vars.insert(target.clone(), v);
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test).and_then(|v| v.truthy()).map_err(at_line)? {
                        return self.exec_block(body);
                    }
                }
                self.exec_block(orelse)?;
            }
            StmtKind::Pass => {}
            StmtKind::Expr(e) => {
                self.eval(e).map_err(at_line)?;
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Value<'p>, ScriptFault> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptFault::new(format!("name '{name}' is not defined")))
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value<'p>, ScriptFault> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::None => Ok(Value::None),
            ExprKind::FString(parts) => self.eval_fstring(parts),
            ExprKind::Name(name) => self.lookup(name),
            ExprKind::List(items) => Ok(Value::List(
                items.iter().map(|e| self.eval(e)).collect::<Result<_, _>>()?,
            )),
            ExprKind::Unary { op, operand } => unary(*op, self.eval(operand)?),
            ExprKind::Binary { op, left, right } => binary(*op, self.eval(left)?, self.eval(right)?),
            ExprKind::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                for (op, e) in rest {
                    let right = self.eval(e)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::And(a, b) => {
                let left = self.eval(a)?;
                if left.truthy()? { self.eval(b) } else { Ok(left) }
            }
            ExprKind::Or(a, b) => {
                let left = self.eval(a)?;
                if left.truthy()? { Ok(left) } else { self.eval(b) }
            }
            ExprKind::Not(e) => Ok(Value::Bool(!self.eval(e)?.truthy()?)),
            ExprKind::Conditional { test, body, orelse } => {
                if self.eval(test)?.truthy()? {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            ExprKind::Call { func, args, kwargs } => {
                let helper = script_helpers::lookup(func)
                    .ok_or_else(|| ScriptFault::new(format!("unknown function '{func}'")))?;
                let args = args.iter().map(|e| self.eval(e)).collect::<Result<Vec<_>, _>>()?;
                let kwargs = kwargs
                    .iter()
                    .map(|(k, e)| Ok((k.clone(), self.eval(e)?)))
                    .collect::<Result<Vec<_>, ScriptFault>>()?;
                let bound = helper.bind(args, kwargs)?;
                helper.call(&bound)
            }
            ExprKind::Method { receiver, name, args } => {
                let receiver = self.eval(receiver)?;
                let args = args.iter().map(|e| self.eval(e)).collect::<Result<Vec<_>, _>>()?;
                call_method(receiver, name, args)
            }
            ExprKind::Attribute { value, name } => attribute(self.eval(value)?, name),
            ExprKind::Index { value, index: key } => index(self.eval(value)?, self.eval(key)?),
        }
    }

    fn eval_fstring(&self, parts: &[FStringPart]) -> Result<Value<'p>, ScriptFault> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => out.push_str(text),
                FStringPart::Field { expr, precision } => {
                    let v = self.eval(expr)?;
                    match precision {
                        None => out.push_str(&v.display()),
                        Some(p) => {
                            let n = v.as_number().ok_or_else(|| {
                                ScriptFault::new(format!(
                                    "format spec '.{p}f' needs a number, found {}",
                                    v.type_name()
                                ))
                            })?;
                            if n.is_finite() {
                                out.push_str(&format!("{n:.p$}", p = *p));
                            } else {
                                out.push_str(&format_number(n));
                            }
                        }
                    }
                }
            }
        }
        Ok(Value::Str(out))
    }
}

fn unary<'p>(op: UnaryOp, v: Value<'p>) -> Result<Value<'p>, ScriptFault> {
    let sign = match op {
        UnaryOp::Neg => -1.0,
        UnaryOp::Pos => 1.0,
    };
    match v {
        Value::Series(s) => Ok(Value::Series(s.map(|x| sign * x))),
        other => other
            .as_number()
            .map(|n| Value::Number(sign * n))
            .ok_or_else(|| {
                ScriptFault::new(format!("bad operand type for unary minus: '{}'", other.type_name()))
            }),
    }
}

/// Scalar arithmetic. Division by zero faults.
fn scalar_arith(op: BinOp, a: f64, b: f64) -> Result<f64, ScriptFault> {
    if matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) && b == 0.0 {
        return Err(ScriptFault::new("division by zero"));
    }
    Ok(arith(op, a, b))
}

/// Element arithmetic. Division by zero gives NaN.
fn series_arith(op: BinOp, a: f64, b: f64) -> f64 {
    if matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) && b == 0.0 {
        return f64::NAN;
    }
    arith(op, a, b)
}

fn arith(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        // result takes the sign of the divisor
        BinOp::Mod => a - b * (a / b).floor(),
        BinOp::Pow => a.powf(b),
    }
}

fn binary<'p>(op: BinOp, left: Value<'p>, right: Value<'p>) -> Result<Value<'p>, ScriptFault> {
    match (&left, &right) {
        (Value::Series(a), Value::Series(b)) => {
            if a.len() != b.len() {
                return Err(ScriptFault::new(format!(
                    "series lengths differ ({} and {})",
                    a.len(),
                    b.len()
                )));
            }
            let values = a
                .as_slice()
                .iter()
                .zip(b.as_slice())
                .map(|(&x, &y)| series_arith(op, x, y))
                .collect();
            return Ok(Value::Series(SeriesView::from_vec(values)));
        }
        (Value::Series(a), other) => {
            if let Some(y) = other.as_number() {
                return Ok(Value::Series(a.map(|x| series_arith(op, x, y))));
            }
        }
        (other, Value::Series(b)) => {
            if let Some(x) = other.as_number() {
                return Ok(Value::Series(b.map(|y| series_arith(op, x, y))));
            }
        }
        (Value::Str(a), Value::Str(b)) if op == BinOp::Add => {
            return Ok(Value::Str(format!("{a}{b}")));
        }
        (Value::List(a), Value::List(b)) if op == BinOp::Add => {
            return Ok(Value::List(a.iter().chain(b).cloned().collect()));
        }
        _ => {
            if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
                return scalar_arith(op, a, b).map(Value::Number);
            }
        }
    }
    Err(ScriptFault::new(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    )))
}

/// Comparisons follow IEEE rules for NaN: every ordering and `==` is false.
fn compare(op: CmpOp, left: &Value<'_>, right: &Value<'_>) -> Result<bool, ScriptFault> {
    use std::cmp::Ordering;

    let ordering: Option<Ordering> = match (left, right) {
        (Value::Series(_), _) | (_, Value::Series(_)) => {
            return Err(ScriptFault::new(
                "cannot compare a series; index a single value first",
            ));
        }
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::None, Value::None) => Some(Ordering::Equal),
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return match op {
                    CmpOp::Eq => Ok(false),
                    CmpOp::Ne => Ok(true),
                    _ => Err(ScriptFault::new(format!(
                        "'{}' not supported between '{}' and '{}'",
                        op.symbol(),
                        left.type_name(),
                        right.type_name()
                    ))),
                };
            }
        },
    };
    let Some(ord) = ordering else {
        // NaN on either side
        return Ok(op == CmpOp::Ne);
    };
    Ok(match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::Ne => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
    })
}

fn attribute<'p>(value: Value<'p>, name: &str) -> Result<Value<'p>, ScriptFault> {
    match &value {
        Value::Row(row) => row.field(name),
        Value::Frame(frame) => match name {
            "iloc" => Ok(value),
            _ => frame.column(name).map(Value::Series),
        },
        Value::Series(_) if matches!(name, "iloc" | "values") => Ok(value),
        Value::Map(map) => map
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptFault::new(format!("no key '{name}'"))),
        other => Err(ScriptFault::new(format!(
            "'{}' has no attribute '{name}'",
            other.type_name()
        ))),
    }
}

fn integer_index(v: &Value<'_>) -> Result<i64, ScriptFault> {
    match v.as_number() {
        Some(n) if n.is_finite() && n.fract() == 0.0 => Ok(n as i64),
        _ => Err(ScriptFault::new(format!(
            "index must be a whole number, found {}",
            v.display()
        ))),
    }
}

fn index<'p>(value: Value<'p>, key: Value<'p>) -> Result<Value<'p>, ScriptFault> {
    match (&value, &key) {
        (Value::Row(_) | Value::Frame(_) | Value::Map(_), Value::Str(name)) => attribute(value, name),
        (Value::Frame(frame), _) => frame.row(integer_index(&key)?).map(Value::Row),
        (Value::Series(s), _) => {
            let i = integer_index(&key)?;
            s.get(i).map(Value::Number).ok_or_else(|| {
                ScriptFault::new(format!("index {i} out of range for series of length {}", s.len()))
            })
        }
        (Value::List(items), _) => {
            let i = integer_index(&key)?;
            resolve_index(i, items.len())
                .map(|at| items[at].clone())
                .ok_or_else(|| ScriptFault::new(format!("list index {i} out of range")))
        }
        _ => Err(ScriptFault::new(format!(
            "'{}' cannot be indexed by {}",
            value.type_name(),
            key.type_name()
        ))),
    }
}

fn call_method<'p>(receiver: Value<'p>, name: &str, args: Vec<Value<'p>>) -> Result<Value<'p>, ScriptFault> {
    if let Value::Map(map) = &receiver {
        if name == "get" {
            let (key, default) = match args.as_slice() {
                [Value::Str(k)] => (k, Value::None),
                [Value::Str(k), d] => (k, d.clone()),
                _ => return Err(ScriptFault::new("get() takes a key and an optional default")),
            };
            return Ok(map.get(key).cloned().unwrap_or(default));
        }
    }
    let Value::Series(series) = &receiver else {
        return Err(ScriptFault::new(format!(
            "'{}' has no method '{name}'",
            receiver.type_name()
        )));
    };
    if !args.is_empty() {
        return Err(ScriptFault::new(format!("{name}() takes no arguments")));
    }
    let defined: Vec<f64> = series.defined().collect();
    let reduce = |f: fn(f64, f64) -> f64| defined.iter().copied().reduce(f).unwrap_or(f64::NAN);
    let n = defined.len() as f64;
    let mean = defined.iter().sum::<f64>() / n;
    Ok(match name {
        "mean" => Value::Number(if defined.is_empty() { f64::NAN } else { mean }),
        // sample standard deviation, as for columns
        "std" => Value::Number(if defined.len() < 2 {
            f64::NAN
        } else {
            (defined.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        }),
        "min" => Value::Number(reduce(f64::min)),
        "max" => Value::Number(reduce(f64::max)),
        "sum" => Value::Number(defined.iter().sum()),
        "abs" => Value::Series(series.map(f64::abs)),
        "last" => Value::Number(series.get(-1).unwrap_or(f64::NAN)),
        _ => {
            return Err(ScriptFault::new(format!("series has no method '{name}'")));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::{PriceBar, PriceSeries};
    use crate::domain::panel::IndicatorPanel;
    use crate::domain::script_parser::parse;
    use crate::domain::script_value::{FrameView, RowView};
    use chrono::NaiveDate;

    fn make_panel(closes: &[f64]) -> IndicatorPanel {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                timestamp: start + chrono::Duration::days(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1000.0,
            })
            .collect();
        IndicatorPanel::from_series(&PriceSeries::new(bars).unwrap())
    }

    fn run<'p>(src: &str, setup: impl FnOnce(&mut Interpreter<'p>)) -> Result<Interpreter<'p>, ScriptFault> {
        let script = parse(src).unwrap();
        let mut interp = Interpreter::new();
        setup(&mut interp);
        interp.run(&script)?;
        Ok(interp)
    }

    fn number(interp: &Interpreter<'_>, name: &str) -> f64 {
        interp.get(name).and_then(Value::as_number).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        let i = run("x = 2 + 3 * 4 ** 2 / 8\ny = -7 // 2\nz = -7 % 3", |_| {}).unwrap();
        assert_eq!(number(&i, "x"), 8.0);
        assert_eq!(number(&i, "y"), -4.0);
        assert_eq!(number(&i, "z"), 2.0);
    }

    #[test]
    fn augmented_assignment() {
        let i = run("x = 10\nx -= 4\nx *= 2", |_| {}).unwrap();
        assert_eq!(number(&i, "x"), 12.0);
    }

    #[test]
    fn division_by_zero_faults_with_line() {
        let err = run("a = 1\nb = a / 0", |_| {}).unwrap_err();
        assert_eq!(err.message, "line 2: division by zero");
    }

    #[test]
    fn undefined_name_faults() {
        let err = run("x = y + 1", |_| {}).unwrap_err();
        assert!(err.message.contains("name 'y' is not defined"));
    }

    #[test]
    fn if_elif_else_picks_first_true_branch() {
        let src = "if x > 5:\n    r = 'big'\nelif x > 2:\n    r = 'mid'\nelse:\n    r = 'small'\n";
        let i = run(src, |i| i.set("x", Value::Number(3.0))).unwrap();
        assert_eq!(i.get("r").unwrap().display(), "mid");
    }

    #[test]
    fn nan_comparisons_are_false() {
        let i = run("a = x > 1\nb = x < 1\nc = x == x\nd = x != x\ne = bool(x)", |i| {
            i.set("x", Value::Number(f64::NAN))
        })
        .unwrap();
        for name in ["a", "b", "c", "e"] {
            assert!(matches!(i.get(name), Some(Value::Bool(false))), "{name}");
        }
        assert!(matches!(i.get("d"), Some(Value::Bool(true))));
    }

    #[test]
    fn chained_comparison() {
        let i = run("a = 1 < 2 <= 2\nb = 1 < 3 < 2", |_| {}).unwrap();
        assert!(matches!(i.get("a"), Some(Value::Bool(true))));
        assert!(matches!(i.get("b"), Some(Value::Bool(false))));
    }

    #[test]
    fn short_circuit_avoids_fault() {
        let i = run("a = False and 1 / 0\nb = True or 1 / 0\nc = 0 or 5", |_| {}).unwrap();
        assert!(matches!(i.get("a"), Some(Value::Bool(false))));
        assert!(matches!(i.get("b"), Some(Value::Bool(true))));
        assert_eq!(number(&i, "c"), 5.0);
    }

    #[test]
    fn ordering_mismatched_types_faults() {
        assert!(run("a = 'x' < 1", |_| {}).is_err());
        let i = run("a = 'x' == 1", |_| {}).unwrap();
        assert!(matches!(i.get("a"), Some(Value::Bool(false))));
    }

    #[test]
    fn row_and_frame_access() {
        let panel = make_panel(&[10.0, 11.0, 12.0, 13.0]);
        let src = "a = current['close']\nb = current.high\nc = data['close'][-2]\n\
                   d = data.iloc[0].close\ne = len(data)\nf = data['close'].mean()\ng = current['date']";
        let i = run(src, |i| {
            i.set("current", Value::Row(RowView { panel: &panel, index: 2 }));
            i.set("data", Value::Frame(FrameView { panel: &panel, start: 0, end: 3 }));
        })
        .unwrap();
        assert_eq!(number(&i, "a"), 12.0);
        assert_eq!(number(&i, "b"), 13.0);
        assert_eq!(number(&i, "c"), 11.0);
        assert_eq!(number(&i, "d"), 10.0);
        assert_eq!(number(&i, "e"), 3.0);
        assert_eq!(number(&i, "f"), 11.0);
        assert_eq!(i.get("g").unwrap().display(), "2024-01-03");
    }

    #[test]
    fn unknown_column_faults() {
        let panel = make_panel(&[10.0]);
        let err = run("x = current['nope']", |i| {
            i.set("current", Value::Row(RowView { panel: &panel, index: 0 }))
        })
        .unwrap_err();
        assert!(err.message.contains("unknown column 'nope'"));
    }

    #[test]
    fn frame_index_out_of_range_faults() {
        let panel = make_panel(&[10.0, 11.0]);
        let err = run("x = data[5]", |i| {
            i.set("data", Value::Frame(FrameView { panel: &panel, start: 0, end: 2 }))
        })
        .unwrap_err();
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn series_arithmetic_is_elementwise() {
        let panel = make_panel(&[10.0, 20.0]);
        let src = "s = (data['high'] - data['low']) / 2\nx = s[0]\ny = (data['close'] / 0)[1]";
        let i = run(src, |i| {
            i.set("data", Value::Frame(FrameView { panel: &panel, start: 0, end: 2 }))
        })
        .unwrap();
        assert_eq!(number(&i, "x"), 1.0);
        assert!(number(&i, "y").is_nan());
    }

    #[test]
    fn series_in_condition_faults() {
        let panel = make_panel(&[10.0, 20.0]);
        let err = run("if data['close'] > 5:\n    x = 1\n", |i| {
            i.set("data", Value::Frame(FrameView { panel: &panel, start: 0, end: 2 }))
        })
        .unwrap_err();
        assert!(err.message.starts_with("line 1:"));
    }

    #[test]
    fn helper_calls_with_keywords() {
        let i = run("m = custom_bollinger([1, 2, 3, 4, 5], period=3)\nu = m['upper'][-1]\nv = m.get('nope', -1)", |_| {})
            .unwrap();
        // mean 4, sample std 1
        assert!((number(&i, "u") - 6.0).abs() < 1e-12);
        assert_eq!(number(&i, "v"), -1.0);
    }

    #[test]
    fn fstrings() {
        let i = run("r = f\"RSI {x:.2f} at {n} ok={flag}\"", |i| {
            i.set("x", Value::Number(28.456));
            i.set("n", Value::Number(5.0));
            i.set("flag", Value::Bool(true));
        })
        .unwrap();
        assert_eq!(i.get("r").unwrap().display(), "RSI 28.46 at 5.0 ok=True");
    }

    #[test]
    fn string_concatenation() {
        let i = run("r = 'a' + 'b'", |_| {}).unwrap();
        assert_eq!(i.get("r").unwrap().display(), "ab");
        assert!(run("r = 'a' + 1", |_| {}).is_err());
    }

    #[test]
    fn conditional_expression() {
        let i = run("r = 1 if x > 0 else -1", |i| i.set("x", Value::Number(-3.0))).unwrap();
        assert_eq!(number(&i, "r"), -1.0);
    }
}
