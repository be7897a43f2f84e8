//! Performance metrics over a simulated equity curve and trade log.
//!
//! Rates (total/annualized return, volatility, max drawdown, win rate) are
//! reported in percent; the Sharpe ratio is a plain ratio. Every field is
//! finite: a degenerate computation (zero variance, empty curve, zero capital)
//! falls back to 0 instead of propagating NaN or infinity.

use serde::Serialize;

use super::portfolio::{PortfolioSnapshot, TradeRecord, TradeSide};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsConfig {
    /// Annual risk-free rate as a fraction.
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            periods_per_year: TRADING_DAYS_PER_YEAR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub round_trips: usize,
    pub winning_trades: usize,
    pub final_value: f64,
}

impl Metrics {
    pub fn compute(
        snapshots: &[PortfolioSnapshot],
        trades: &[TradeRecord],
        initial_capital: f64,
        config: &MetricsConfig,
    ) -> Self {
        let Some(last) = snapshots.last() else {
            return Metrics::default();
        };
        let final_value = last.value;

        let growth = if initial_capital > 0.0 {
            final_value / initial_capital
        } else {
            log::debug!("initial capital {initial_capital} is not positive; returns default to 0");
            f64::NAN
        };
        let total_return = growth - 1.0;

        let n = snapshots.len() as f64;
        let annualized_return = growth.powf(config.periods_per_year / n) - 1.0;

        let returns = period_returns(snapshots);
        let volatility = sample_std(&returns) * config.periods_per_year.sqrt();

        let sharpe_ratio = if volatility > 0.0 {
            (finite_or_zero("annualized_return", annualized_return) - config.risk_free_rate)
                / volatility
        } else {
            log::debug!("volatility is zero; sharpe ratio defaults to 0");
            0.0
        };

        let max_drawdown = compute_max_drawdown(snapshots);
        let pairs = pair_round_trips(trades);
        let winning_trades = pairs.iter().filter(|p| p.is_win()).count();
        let win_rate = if pairs.is_empty() {
            0.0
        } else {
            winning_trades as f64 / pairs.len() as f64
        };

        Metrics {
            total_return: finite_or_zero("total_return", total_return * 100.0),
            annualized_return: finite_or_zero("annualized_return", annualized_return * 100.0),
            volatility: finite_or_zero("volatility", volatility * 100.0),
            sharpe_ratio: finite_or_zero("sharpe_ratio", sharpe_ratio),
            max_drawdown: finite_or_zero("max_drawdown", max_drawdown * 100.0),
            win_rate: finite_or_zero("win_rate", win_rate * 100.0),
            total_trades: trades.len(),
            round_trips: pairs.len(),
            winning_trades,
            final_value: finite_or_zero("final_value", final_value),
        }
    }
}

/// Replace a non-finite metric with 0, logging the degenerate input.
pub fn finite_or_zero(name: &str, value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        log::debug!("metric {name} is degenerate ({value}); defaulting to 0");
        0.0
    }
}

/// Per-bar simple returns of the portfolio value. Bars following a
/// zero-valued bar have no defined return and are skipped.
fn period_returns(snapshots: &[PortfolioSnapshot]) -> Vec<f64> {
    snapshots
        .windows(2)
        .filter(|w| w[0].value > 0.0)
        .map(|w| (w[1].value - w[0].value) / w[0].value)
        .collect()
}

/// Sample standard deviation (n-1). Fewer than two observations give 0.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

/// Most negative (value - running peak) / running peak, as a fraction <= 0.
fn compute_max_drawdown(snapshots: &[PortfolioSnapshot]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for snap in snapshots {
        peak = peak.max(snap.value);
        if peak > 0.0 {
            let dd = (snap.value - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// A buy matched with the sell that closed it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip<'a> {
    pub buy: &'a TradeRecord,
    pub sell: &'a TradeRecord,
}

impl RoundTrip<'_> {
    pub fn is_win(&self) -> bool {
        self.sell.net_price() > self.buy.net_price()
    }
}

/// Match each sell with the most recent prior unmatched buy.
///
/// Sells with no open buy before them are left unmatched, as are buys still
/// open at the end of the log.
pub fn pair_round_trips(trades: &[TradeRecord]) -> Vec<RoundTrip<'_>> {
    let mut open: Vec<&TradeRecord> = Vec::new();
    let mut pairs = Vec::new();
    for trade in trades {
        match trade.side {
            TradeSide::Buy => open.push(trade),
            TradeSide::Sell => {
                if let Some(buy) = open.pop() {
                    pairs.push(RoundTrip { buy, sell: trade });
                }
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn t(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::days(i as i64)
    }

    fn make_curve(values: &[f64]) -> Vec<PortfolioSnapshot> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| PortfolioSnapshot {
                timestamp: t(i),
                cash: v,
                shares: 0.0,
                price: 1.0,
                value: v,
            })
            .collect()
    }

    fn trade(i: usize, side: TradeSide, price: f64) -> TradeRecord {
        TradeRecord {
            timestamp: t(i),
            side,
            price,
            quantity: 1.0,
            amount: Some(price),
            reason: String::new(),
        }
    }

    #[test]
    fn empty_curve_is_all_zero() {
        let m = Metrics::compute(&[], &[], 100_000.0, &MetricsConfig::default());
        assert_eq!(m, Metrics::default());
    }

    #[test]
    fn total_return_percent() {
        let m = Metrics::compute(
            &make_curve(&[100.0, 110.0, 120.0]),
            &[],
            100.0,
            &MetricsConfig::default(),
        );
        assert!((m.total_return - 20.0).abs() < 1e-9);
        assert!((m.final_value - 120.0).abs() < 1e-9);
    }

    #[test]
    fn annualized_uses_snapshot_count() {
        let values: Vec<f64> = (0..252).map(|i| 100.0 + i as f64 * 10.0 / 251.0).collect();
        let m = Metrics::compute(&make_curve(&values), &[], 100.0, &MetricsConfig::default());
        // 252 snapshots = one year: annualized equals total
        assert!((m.annualized_return - m.total_return).abs() < 1e-9);
    }

    #[test]
    fn flat_curve_has_zero_volatility_and_sharpe() {
        let m = Metrics::compute(
            &make_curve(&[100.0, 100.0, 100.0]),
            &[],
            100.0,
            &MetricsConfig::default(),
        );
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
    }

    #[test]
    fn volatility_sample_std() {
        let m = Metrics::compute(
            &make_curve(&[100.0, 110.0, 99.0]),
            &[],
            100.0,
            &MetricsConfig::default(),
        );
        // returns 0.1, -0.1 → sample std = sqrt(0.02)
        let expected = 0.02_f64.sqrt() * 252.0_f64.sqrt() * 100.0;
        assert!((m.volatility - expected).abs() < 1e-9);
    }

    #[test]
    fn sharpe_uses_risk_free_rate() {
        let curve = make_curve(&[100.0, 110.0, 99.0, 105.0]);
        let config = MetricsConfig {
            risk_free_rate: 0.0,
            ..MetricsConfig::default()
        };
        let m = Metrics::compute(&curve, &[], 100.0, &config);
        let expected = m.annualized_return / m.volatility;
        assert!((m.sharpe_ratio - expected).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_is_negative_percent() {
        let m = Metrics::compute(
            &make_curve(&[100.0, 120.0, 90.0, 130.0, 117.0]),
            &[],
            100.0,
            &MetricsConfig::default(),
        );
        // 120 → 90 = -25%
        assert!((m.max_drawdown + 25.0).abs() < 1e-9);
    }

    #[test]
    fn win_rate_nearest_preceding_buy() {
        use crate::domain::portfolio::TradeSide::{Buy, Sell};
        let trades = vec![
            trade(0, Buy, 10.0),
            trade(1, Sell, 12.0),
            trade(2, Buy, 20.0),
            trade(3, Sell, 15.0),
        ];
        let m = Metrics::compute(
            &make_curve(&[100.0, 101.0, 102.0, 103.0]),
            &trades,
            100.0,
            &MetricsConfig::default(),
        );
        assert_eq!(m.total_trades, 4);
        assert_eq!(m.round_trips, 2);
        assert_eq!(m.winning_trades, 1);
        assert!((m.win_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn pairing_is_not_positional() {
        use crate::domain::portfolio::TradeSide::{Buy, Sell};
        // buy 10, buy 30, sell 20: the sell closes the 30 buy (a loss), not the 10 buy
        let trades = vec![trade(0, Buy, 10.0), trade(1, Buy, 30.0), trade(2, Sell, 20.0)];
        let pairs = pair_round_trips(&trades);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].buy.price, 30.0);
        assert!(!pairs[0].is_win());
    }

    #[test]
    fn unmatched_sell_is_ignored() {
        use crate::domain::portfolio::TradeSide::{Buy, Sell};
        let trades = vec![trade(0, Sell, 10.0), trade(1, Buy, 5.0)];
        assert!(pair_round_trips(&trades).is_empty());
    }

    #[test]
    fn zero_capital_is_clamped() {
        let m = Metrics::compute(
            &make_curve(&[0.0, 0.0]),
            &[],
            0.0,
            &MetricsConfig::default(),
        );
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.annualized_return, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
    }

    #[test]
    fn finite_or_zero_clamps() {
        assert_eq!(finite_or_zero("x", f64::NAN), 0.0);
        assert_eq!(finite_or_zero("x", f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero("x", -1.5), -1.5);
    }
}
