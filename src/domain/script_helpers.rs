//! Built-in functions callable from rule scripts.
//!
//! The registry is fixed at compile time. Scripts can only call what is listed
//! in [`HELPERS`]; the sandbox rejects any other call before the first bar is
//! evaluated.
//!
//! Reductions (`sum`, `mean`, `std`, `max`, `min`) skip NaN, so they work on
//! columns that are still warming up.

use std::collections::BTreeMap;

use crate::domain::error::ScriptFault;
use crate::domain::indicator::channels::{
    calculate_rolling_max, calculate_rolling_min, fibonacci_retracements as fib_levels,
    find_peaks_troughs,
};
use crate::domain::indicator::statistics::{calculate_rolling_corr, calculate_rolling_rank};
use crate::domain::indicator::volume::calculate_volume_profile;
use crate::domain::indicator::{
    calculate_bollinger, calculate_ema, calculate_macd, calculate_rsi, calculate_sma,
    calculate_stddev, calculate_stochastic, calculate_zscore,
};
use crate::domain::script_value::{format_number, SeriesView, Value};

/// Bumped whenever a helper is added, removed or changes meaning.
pub const HELPER_REGISTRY_VERSION: u32 = 2;

const MAX_PROFILE_BINS: usize = 10_000;

pub type HelperFn = fn(&[Value<'_>]) -> Result<Value<'static>, ScriptFault>;

/// A registered function: its parameter list (name, default) and body.
///
/// Parameters without a default are required. A variadic helper takes its
/// positional arguments as given and accepts no keywords.
pub struct Helper {
    pub name: &'static str,
    pub params: &'static [(&'static str, Option<f64>)],
    pub variadic: bool,
    pub func: HelperFn,
}

const fn helper(
    name: &'static str,
    params: &'static [(&'static str, Option<f64>)],
    func: HelperFn,
) -> Helper {
    Helper {
        name,
        params,
        variadic: false,
        func,
    }
}

const X: &[(&str, Option<f64>)] = &[("x", None)];
const SERIES_PERIOD_20: &[(&str, Option<f64>)] = &[("series", None), ("period", Some(20.0))];

pub static HELPERS: &[Helper] = &[
    // primitives
    helper("len", X, len),
    Helper {
        name: "max",
        params: &[],
        variadic: true,
        func: max,
    },
    Helper {
        name: "min",
        params: &[],
        variadic: true,
        func: min,
    },
    helper("abs", X, abs),
    helper("round", &[("x", None), ("ndigits", Some(0.0))], round),
    helper("sum", X, sum),
    helper("mean", X, mean),
    helper("std", X, population_std),
    helper("sqrt", X, sqrt),
    helper("log", X, log),
    helper("exp", X, exp),
    helper("sin", X, sin),
    helper("cos", X, cos),
    helper("tan", X, tan),
    helper("float", X, to_float),
    helper("int", X, to_int),
    helper("str", X, to_str),
    helper("bool", X, to_bool),
    helper("isnan", X, isnan),
    // builders
    helper("custom_ma", SERIES_PERIOD_20, custom_ma),
    helper("custom_ema", SERIES_PERIOD_20, custom_ema),
    helper("custom_std", SERIES_PERIOD_20, custom_std),
    helper(
        "custom_corr",
        &[("series1", None), ("series2", None), ("period", Some(20.0))],
        custom_corr,
    ),
    helper("custom_rank", SERIES_PERIOD_20, custom_rank),
    helper("custom_zscore", SERIES_PERIOD_20, custom_zscore),
    helper("custom_rsi", &[("series", None), ("period", Some(14.0))], custom_rsi),
    helper(
        "custom_bollinger",
        &[("series", None), ("period", Some(20.0)), ("std_dev", Some(2.0))],
        custom_bollinger,
    ),
    helper(
        "custom_macd",
        &[
            ("series", None),
            ("fast", Some(12.0)),
            ("slow", Some(26.0)),
            ("signal", Some(9.0)),
        ],
        custom_macd,
    ),
    helper(
        "custom_stochastic",
        &[
            ("high", None),
            ("low", None),
            ("close", None),
            ("k_period", Some(14.0)),
            ("d_period", Some(3.0)),
        ],
        custom_stochastic,
    ),
    helper(
        "support_resistance",
        &[("high", None), ("low", None), ("period", Some(20.0))],
        support_resistance,
    ),
    helper(
        "fibonacci_retracements",
        &[("high_price", None), ("low_price", None)],
        fibonacci_retracements,
    ),
    helper(
        "volume_profile",
        &[("price", None), ("volume", None), ("bins", Some(20.0))],
        volume_profile,
    ),
    helper("wave_analysis", SERIES_PERIOD_20, wave_analysis),
    // predicates
    helper(
        "is_golden_cross",
        &[("fast_ma", None), ("slow_ma", None), ("prev_fast", None), ("prev_slow", None)],
        is_golden_cross,
    ),
    helper(
        "is_death_cross",
        &[("fast_ma", None), ("slow_ma", None), ("prev_fast", None), ("prev_slow", None)],
        is_death_cross,
    ),
    helper("is_oversold", &[("rsi", None), ("threshold", Some(30.0))], is_oversold),
    helper("is_overbought", &[("rsi", None), ("threshold", Some(70.0))], is_overbought),
    helper(
        "is_breakout",
        &[("price", None), ("resistance", None), ("volume_ratio", Some(1.5))],
        is_breakout,
    ),
    helper(
        "is_breakdown",
        &[("price", None), ("support", None), ("volume_ratio", Some(1.5))],
        is_breakdown,
    ),
    helper(
        "is_divergence",
        &[("price_trend", None), ("indicator_trend", None)],
        is_divergence,
    ),
];

/// Volume ratio a breakout or breakdown must exceed.
const BREAKOUT_VOLUME_RATIO: f64 = 1.5;

pub fn lookup(name: &str) -> Option<&'static Helper> {
    HELPERS.iter().find(|h| h.name == name)
}

impl Helper {
    /// Match call arguments to parameters, filling defaults.
    pub fn bind<'p>(
        &self,
        args: Vec<Value<'p>>,
        kwargs: Vec<(String, Value<'p>)>,
    ) -> Result<Vec<Value<'p>>, ScriptFault> {
        let name = self.name;
        if self.variadic {
            if !kwargs.is_empty() {
                return Err(ScriptFault::new(format!(
                    "{name}() takes no keyword arguments"
                )));
            }
            return Ok(args);
        }
        if args.len() > self.params.len() {
            return Err(ScriptFault::new(format!(
                "{name}() takes at most {} arguments ({} given)",
                self.params.len(),
                args.len()
            )));
        }
        let mut slots: Vec<Option<Value<'p>>> = args.into_iter().map(Some).collect();
        slots.resize_with(self.params.len(), || None);
        for (key, value) in kwargs {
            let Some(i) = self.params.iter().position(|(p, _)| *p == key) else {
                return Err(ScriptFault::new(format!(
                    "{name}() got an unexpected keyword argument '{key}'"
                )));
            };
            if slots[i].is_some() {
                return Err(ScriptFault::new(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            slots[i] = Some(value);
        }
        slots
            .into_iter()
            .zip(self.params)
            .map(|(slot, (param, default))| match (slot, default) {
                (Some(v), _) => Ok(v),
                (None, Some(d)) => Ok(Value::Number(*d)),
                (None, None) => Err(ScriptFault::new(format!(
                    "{name}() missing required argument '{param}'"
                ))),
            })
            .collect()
    }

    pub fn call(&self, args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
        (self.func)(args)
    }
}

// --- argument access ---

fn number(args: &[Value<'_>], i: usize, name: &str) -> Result<f64, ScriptFault> {
    let v = arg(args, i, name)?;
    v.as_number().ok_or_else(|| {
        ScriptFault::new(format!(
            "argument '{name}' must be a number, found {}",
            v.type_name()
        ))
    })
}

fn series(args: &[Value<'_>], i: usize, name: &str) -> Result<SeriesView, ScriptFault> {
    match arg(args, i, name)? {
        Value::Series(s) => Ok(s.clone()),
        v @ Value::List(_) => Ok(SeriesView::from_vec(v.numbers()?)),
        v => Err(ScriptFault::new(format!(
            "argument '{name}' must be a series, found {}",
            v.type_name()
        ))),
    }
}

fn period(args: &[Value<'_>], i: usize, name: &str) -> Result<usize, ScriptFault> {
    let p = number(args, i, name)?;
    if p.is_finite() && p >= 1.0 && p.fract() == 0.0 {
        Ok(p as usize)
    } else {
        Err(ScriptFault::new(format!(
            "argument '{name}' must be a positive whole number, got {}",
            format_number(p)
        )))
    }
}

fn arg<'a, 'p>(args: &'a [Value<'p>], i: usize, name: &str) -> Result<&'a Value<'p>, ScriptFault> {
    args.get(i)
        .ok_or_else(|| ScriptFault::new(format!("missing argument '{name}'")))
}

fn series_value(values: Vec<f64>) -> Value<'static> {
    Value::Series(SeriesView::from_vec(values))
}

fn map_value<const N: usize>(entries: [(&str, Value<'static>); N]) -> Value<'static> {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    )
}

// --- primitives ---

fn len(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let n = match arg(args, 0, "x")? {
        Value::Series(s) => s.len(),
        Value::List(items) => items.len(),
        Value::Str(s) => s.chars().count(),
        Value::Map(m) => m.len(),
        Value::Frame(f) => f.len(),
        v => {
            return Err(ScriptFault::new(format!(
                "object of type '{}' has no len()",
                v.type_name()
            )));
        }
    };
    Ok(Value::Number(n as f64))
}

fn extreme(
    args: &[Value<'_>],
    name: &str,
    pick: fn(f64, f64) -> f64,
) -> Result<Value<'static>, ScriptFault> {
    let values: Vec<f64> = match args {
        [] => return Err(ScriptFault::new(format!("{name}() expected at least 1 argument"))),
        [single] if single.as_number().is_none() => single.numbers()?,
        many => many
            .iter()
            .map(|v| {
                v.as_number().ok_or_else(|| {
                    ScriptFault::new(format!("{name}() arguments must be numbers, found {}", v.type_name()))
                })
            })
            .collect::<Result<_, _>>()?,
    };
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .reduce(pick)
        .map(Value::Number)
        .ok_or_else(|| ScriptFault::new(format!("{name}() arg is an empty sequence")))
}

fn max(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    extreme(args, "max", f64::max)
}

fn min(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    extreme(args, "min", f64::min)
}

/// Apply `f` to a number or element-wise to a series. A number outside
/// `domain` is a fault; series elements outside it become NaN.
fn elementwise(
    args: &[Value<'_>],
    name: &str,
    f: fn(f64) -> f64,
    domain: fn(f64) -> bool,
) -> Result<Value<'static>, ScriptFault> {
    match arg(args, 0, "x")? {
        Value::Series(s) => Ok(Value::Series(
            s.map(|v| if domain(v) { f(v) } else { f64::NAN }),
        )),
        v => {
            let x = v.as_number().ok_or_else(|| {
                ScriptFault::new(format!("{name}() expects a number or series, found {}", v.type_name()))
            })?;
            if !domain(x) && !x.is_nan() {
                return Err(ScriptFault::new(format!("{name}(): math domain error")));
            }
            Ok(Value::Number(f(x)))
        }
    }
}

fn any(_: f64) -> bool {
    true
}

fn abs(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    elementwise(args, "abs", f64::abs, any)
}

fn sqrt(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    elementwise(args, "sqrt", f64::sqrt, |x| x >= 0.0)
}

fn log(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    elementwise(args, "log", f64::ln, |x| x > 0.0)
}

fn exp(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    elementwise(args, "exp", f64::exp, any)
}

fn sin(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    elementwise(args, "sin", f64::sin, any)
}

fn cos(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    elementwise(args, "cos", f64::cos, any)
}

fn tan(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    elementwise(args, "tan", f64::tan, any)
}

/// Round half to even at `ndigits` decimal places.
fn round(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let digits = number(args, 1, "ndigits")?;
    if digits.fract() != 0.0 || digits.abs() > 15.0 {
        return Err(ScriptFault::new("round() ndigits must be a whole number between -15 and 15"));
    }
    let scale = 10f64.powi(digits as i32);
    let f = move |v: f64| (v * scale).round_ties_even() / scale;
    match arg(args, 0, "x")? {
        Value::Series(s) => Ok(Value::Series(s.map(f))),
        _ => Ok(Value::Number(f(number(args, 0, "x")?))),
    }
}

fn sum(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let values = arg(args, 0, "x")?.numbers()?;
    Ok(Value::Number(values.iter().filter(|v| !v.is_nan()).sum()))
}

fn defined(args: &[Value<'_>]) -> Result<Vec<f64>, ScriptFault> {
    Ok(arg(args, 0, "x")?
        .numbers()?
        .into_iter()
        .filter(|v| !v.is_nan())
        .collect())
}

fn mean(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let values = defined(args)?;
    if values.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(values.iter().sum::<f64>() / values.len() as f64))
}

/// Population standard deviation.
fn population_std(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let values = defined(args)?;
    if values.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let n = values.len() as f64;
    let m = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
    Ok(Value::Number(var.sqrt()))
}

fn to_float(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    match arg(args, 0, "x")? {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| ScriptFault::new(format!("could not convert string to float: '{s}'"))),
        _ => Ok(Value::Number(number(args, 0, "x")?)),
    }
}

fn to_int(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let x = match arg(args, 0, "x")? {
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(|i| i as f64)
            .map_err(|_| ScriptFault::new(format!("invalid literal for int(): '{s}'")))?,
        _ => number(args, 0, "x")?,
    };
    if !x.is_finite() {
        return Err(ScriptFault::new(format!(
            "cannot convert {} to integer",
            format_number(x)
        )));
    }
    Ok(Value::Number(x.trunc()))
}

fn to_str(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    Ok(Value::Str(arg(args, 0, "x")?.display()))
}

fn to_bool(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    Ok(Value::Bool(arg(args, 0, "x")?.truthy()?))
}

fn isnan(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    Ok(Value::Bool(number(args, 0, "x")?.is_nan()))
}

// --- builders ---

fn custom_ma(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let s = series(args, 0, "series")?;
    Ok(series_value(calculate_sma(s.as_slice(), period(args, 1, "period")?)))
}

fn custom_ema(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let s = series(args, 0, "series")?;
    Ok(series_value(calculate_ema(s.as_slice(), period(args, 1, "period")?)))
}

fn custom_std(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let s = series(args, 0, "series")?;
    Ok(series_value(calculate_stddev(s.as_slice(), period(args, 1, "period")?)))
}

fn custom_corr(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let a = series(args, 0, "series1")?;
    let b = series(args, 1, "series2")?;
    Ok(series_value(calculate_rolling_corr(
        a.as_slice(),
        b.as_slice(),
        period(args, 2, "period")?,
    )))
}

fn custom_rank(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let s = series(args, 0, "series")?;
    Ok(series_value(calculate_rolling_rank(s.as_slice(), period(args, 1, "period")?)))
}

fn custom_zscore(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let s = series(args, 0, "series")?;
    Ok(series_value(calculate_zscore(s.as_slice(), period(args, 1, "period")?)))
}

fn custom_rsi(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let s = series(args, 0, "series")?;
    Ok(series_value(calculate_rsi(s.as_slice(), period(args, 1, "period")?)))
}

fn custom_bollinger(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let s = series(args, 0, "series")?;
    let bands = calculate_bollinger(
        s.as_slice(),
        period(args, 1, "period")?,
        number(args, 2, "std_dev")?,
    );
    let width = bands.width();
    let percent = bands.percent_b(s.as_slice());
    Ok(map_value([
        ("upper", series_value(bands.upper)),
        ("middle", series_value(bands.middle)),
        ("lower", series_value(bands.lower)),
        ("width", series_value(width)),
        ("percent", series_value(percent)),
    ]))
}

fn custom_macd(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let s = series(args, 0, "series")?;
    let macd = calculate_macd(
        s.as_slice(),
        period(args, 1, "fast")?,
        period(args, 2, "slow")?,
        period(args, 3, "signal")?,
    );
    Ok(map_value([
        ("macd", series_value(macd.line)),
        ("signal", series_value(macd.signal)),
        ("histogram", series_value(macd.histogram)),
    ]))
}

fn custom_stochastic(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let high = series(args, 0, "high")?;
    let low = series(args, 1, "low")?;
    let close = series(args, 2, "close")?;
    let st = calculate_stochastic(
        high.as_slice(),
        low.as_slice(),
        close.as_slice(),
        period(args, 3, "k_period")?,
        period(args, 4, "d_period")?,
    );
    Ok(map_value([
        ("k", series_value(st.k)),
        ("d", series_value(st.d)),
        ("j", series_value(st.j)),
    ]))
}

fn support_resistance(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let high = series(args, 0, "high")?;
    let low = series(args, 1, "low")?;
    let p = period(args, 2, "period")?;
    Ok(map_value([
        ("resistance", series_value(calculate_rolling_max(high.as_slice(), p))),
        ("support", series_value(calculate_rolling_min(low.as_slice(), p))),
    ]))
}

fn fibonacci_retracements(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let high = number(args, 0, "high_price")?;
    let low = number(args, 1, "low_price")?;
    Ok(Value::Map(
        fib_levels(high, low)
            .into_iter()
            .map(|(name, level)| (name.to_string(), Value::Number(level)))
            .collect(),
    ))
}

/// Volume-by-price histogram with its point of control. Input the profile
/// cannot be built from (empty, mismatched lengths, NaN) gives empty buckets
/// and a `poc` of 0.
fn volume_profile(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let price = series(args, 0, "price")?;
    let volume = series(args, 1, "volume")?;
    let bins = period(args, 2, "bins")?;
    if bins > MAX_PROFILE_BINS {
        return Err(ScriptFault::new(format!(
            "argument 'bins' must be at most {MAX_PROFILE_BINS}, got {bins}"
        )));
    }
    Ok(match calculate_volume_profile(price.as_slice(), volume.as_slice(), bins) {
        Some(vp) => map_value([
            ("volume_dist", series_value(vp.volume)),
            ("price_levels", series_value(vp.edges)),
            ("poc", Value::Number(vp.poc)),
        ]),
        None => map_value([
            ("volume_dist", Value::List(Vec::new())),
            ("price_levels", Value::List(Vec::new())),
            ("poc", Value::Number(0.0)),
        ]),
    })
}

/// Strict local peaks and troughs as `[index, value]` pairs. The window
/// argument is accepted for compatibility and does not change the result.
fn wave_analysis(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let s = series(args, 0, "series")?;
    period(args, 1, "period")?;
    let (peaks, troughs) = find_peaks_troughs(s.as_slice());
    let pairs = |points: Vec<(usize, f64)>| {
        Value::List(
            points
                .into_iter()
                .map(|(i, v)| Value::List(vec![Value::Number(i as f64), Value::Number(v)]))
                .collect(),
        )
    };
    Ok(map_value([("peaks", pairs(peaks)), ("troughs", pairs(troughs))]))
}

// --- predicates ---

fn is_golden_cross(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let (fast, slow) = (number(args, 0, "fast_ma")?, number(args, 1, "slow_ma")?);
    let (pf, ps) = (number(args, 2, "prev_fast")?, number(args, 3, "prev_slow")?);
    Ok(Value::Bool(fast > slow && pf <= ps))
}

fn is_death_cross(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let (fast, slow) = (number(args, 0, "fast_ma")?, number(args, 1, "slow_ma")?);
    let (pf, ps) = (number(args, 2, "prev_fast")?, number(args, 3, "prev_slow")?);
    Ok(Value::Bool(fast < slow && pf >= ps))
}

fn is_oversold(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    Ok(Value::Bool(number(args, 0, "rsi")? < number(args, 1, "threshold")?))
}

fn is_overbought(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    Ok(Value::Bool(number(args, 0, "rsi")? > number(args, 1, "threshold")?))
}

fn is_breakout(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let price = number(args, 0, "price")?;
    let resistance = number(args, 1, "resistance")?;
    let ratio = number(args, 2, "volume_ratio")?;
    Ok(Value::Bool(price > resistance && ratio > BREAKOUT_VOLUME_RATIO))
}

fn is_breakdown(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let price = number(args, 0, "price")?;
    let support = number(args, 1, "support")?;
    let ratio = number(args, 2, "volume_ratio")?;
    Ok(Value::Bool(price < support && ratio > BREAKOUT_VOLUME_RATIO))
}

fn is_divergence(args: &[Value<'_>]) -> Result<Value<'static>, ScriptFault> {
    let sign = |v: f64| if v > 0.0 { 1.0 } else if v < 0.0 { -1.0 } else { v };
    let a = sign(number(args, 0, "price_trend")?);
    let b = sign(number(args, 1, "indicator_trend")?);
    Ok(Value::Bool(a != b))
}
