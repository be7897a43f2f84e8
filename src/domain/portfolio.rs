//! Bar-by-bar portfolio simulation.
//!
//! A single deterministic pass over the series in bar order. The book is
//! long-only and whole-position: an entry buys as many whole shares as cash
//! allows, an exit liquidates everything. Every bar appends one snapshot,
//! marked at that bar's close after any trade on that bar.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::ohlcv::PriceSeries;
use super::signal::Signal;

/// Proportional transaction cost applied on both sides of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostModel {
    pub fee_rate: f64,
}

impl CostModel {
    pub fn none() -> Self {
        CostModel { fee_rate: 0.0 }
    }

    pub fn proportional(fee_rate: f64) -> Self {
        CostModel { fee_rate }
    }

    /// Cash needed to buy `quantity` shares at `price`.
    pub fn buy_cost(&self, price: f64, quantity: f64) -> f64 {
        price * quantity * (1.0 + self.fee_rate)
    }

    /// Cash received for selling `quantity` shares at `price`.
    pub fn sell_proceeds(&self, price: f64, quantity: f64) -> f64 {
        price * quantity * (1.0 - self.fee_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub timestamp: NaiveDateTime,
    pub side: TradeSide,
    pub price: f64,
    pub quantity: f64,
    /// Cash moved by the trade, fees included.
    pub amount: Option<f64>,
    pub reason: String,
}

impl TradeRecord {
    /// Net cash per share: what a buy paid or a sell received, fees included.
    pub fn net_price(&self) -> f64 {
        match self.amount {
            Some(amount) if self.quantity > 0.0 => amount / self.quantity,
            _ => self.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub timestamp: NaiveDateTime,
    pub cash: f64,
    pub shares: f64,
    pub price: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub trades: Vec<TradeRecord>,
    pub snapshots: Vec<PortfolioSnapshot>,
    pub cash: f64,
    pub shares: f64,
    pub final_value: f64,
}

/// Run the book over `series`, driven by one signal per bar.
///
/// The book acts on each signal's direction: +1 buys when flat and cash covers
/// at least one share, -1 sells when shares are held. Covering a short
/// therefore opens a long position, and opening one closes any long. Signals
/// beyond the end of the series are ignored; bars without a signal hold.
pub fn simulate(
    series: &PriceSeries,
    signals: &[Signal],
    initial_capital: f64,
    cost: CostModel,
) -> Simulation {
    let mut cash = initial_capital;
    let mut shares = 0.0_f64;
    let mut trades = Vec::new();
    let mut snapshots = Vec::with_capacity(series.len());

    for (i, bar) in series.bars().iter().enumerate() {
        let price = bar.close;
        let signal = signals.get(i);
        match signal.map(Signal::value) {
            Some(1) if shares == 0.0 && price > 0.0 => {
                let quantity = (cash / cost.buy_cost(price, 1.0)).floor();
                if quantity >= 1.0 {
                    let amount = cost.buy_cost(price, quantity);
                    cash -= amount;
                    shares = quantity;
                    trades.push(TradeRecord {
                        timestamp: bar.timestamp,
                        side: TradeSide::Buy,
                        price,
                        quantity,
                        amount: Some(amount),
                        reason: signal.map(|s| s.reason.clone()).unwrap_or_default(),
                    });
                }
            }
            Some(-1) if shares > 0.0 => {
                let amount = cost.sell_proceeds(price, shares);
                cash += amount;
                trades.push(TradeRecord {
                    timestamp: bar.timestamp,
                    side: TradeSide::Sell,
                    price,
                    quantity: shares,
                    amount: Some(amount),
                    reason: signal.map(|s| s.reason.clone()).unwrap_or_default(),
                });
                shares = 0.0;
            }
            _ => {}
        }

        snapshots.push(PortfolioSnapshot {
            timestamp: bar.timestamp,
            cash,
            shares,
            price,
            value: cash + shares * price,
        });
    }

    let final_value = snapshots.last().map(|s| s.value).unwrap_or(initial_capital);
    Simulation {
        trades,
        snapshots,
        cash,
        shares,
        final_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::PriceBar;
    use crate::domain::signal::SignalAction;
    use chrono::NaiveDate;

    fn make_series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        PriceSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| PriceBar {
                    timestamp: start + chrono::Duration::days(i as i64),
                    open: c,
                    high: c,
                    low: c,
                    close: c,
                    volume: 100.0,
                })
                .collect(),
        )
        .unwrap()
    }

    fn signals_for(series: &PriceSeries, actions: &[SignalAction]) -> Vec<Signal> {
        series
            .bars()
            .iter()
            .zip(actions.iter())
            .map(|(b, &a)| Signal::new(b.timestamp, a, format!("{a:?}")))
            .collect()
    }

    use crate::domain::signal::SignalAction::{EnterLong as B, ExitLong as S, Hold as H};

    #[test]
    fn buy_and_sell_without_fees() {
        let series = make_series(&[10.0, 12.0, 9.0]);
        let signals = signals_for(&series, &[B, H, S]);
        let sim = simulate(&series, &signals, 1000.0, CostModel::none());

        assert_eq!(sim.trades.len(), 2);
        assert_eq!(sim.trades[0].side, TradeSide::Buy);
        assert_eq!(sim.trades[0].quantity, 100.0);
        assert_eq!(sim.trades[1].side, TradeSide::Sell);
        assert!((sim.final_value - 900.0).abs() < 1e-9);
        assert_eq!(sim.shares, 0.0);
    }

    #[test]
    fn one_snapshot_per_bar_marked_at_close() {
        let series = make_series(&[10.0, 12.0, 9.0, 11.0]);
        let signals = signals_for(&series, &[B, H, H, H]);
        let sim = simulate(&series, &signals, 1005.0, CostModel::none());
        assert_eq!(sim.snapshots.len(), 4);
        assert!((sim.snapshots[1].value - (5.0 + 100.0 * 12.0)).abs() < 1e-9);
        assert!((sim.final_value - (5.0 + 100.0 * 11.0)).abs() < 1e-9);
    }

    #[test]
    fn fee_reduces_quantity_and_proceeds() {
        let series = make_series(&[100.0, 100.0]);
        let signals = signals_for(&series, &[B, S]);
        let sim = simulate(&series, &signals, 10_000.0, CostModel::proportional(0.001));
        // floor(10000 / 100.1) = 99
        assert_eq!(sim.trades[0].quantity, 99.0);
        let cost = 99.0 * 100.0 * 1.001;
        assert!((sim.trades[0].amount.unwrap() - cost).abs() < 1e-9);
        let proceeds = 99.0 * 100.0 * 0.999;
        assert!((sim.final_value - (10_000.0 - cost + proceeds)).abs() < 1e-9);
    }

    #[test]
    fn insufficient_cash_skips_buy() {
        let series = make_series(&[500.0, 500.0]);
        let signals = signals_for(&series, &[B, S]);
        let sim = simulate(&series, &signals, 100.0, CostModel::none());
        assert!(sim.trades.is_empty());
        assert_eq!(sim.final_value, 100.0);
    }

    #[test]
    fn exit_while_flat_is_ignored() {
        let series = make_series(&[10.0, 11.0]);
        let signals = signals_for(&series, &[S, H]);
        let sim = simulate(&series, &signals, 100.0, CostModel::none());
        assert!(sim.trades.is_empty());
    }

    #[test]
    fn short_transitions_follow_their_direction() {
        let series = make_series(&[10.0, 11.0, 12.0]);
        let signals = signals_for(
            &series,
            &[SignalAction::EnterShort, SignalAction::ExitShort, SignalAction::EnterShort],
        );
        let sim = simulate(&series, &signals, 100.0, CostModel::none());
        assert_eq!(sim.trades.len(), 2);
        assert_eq!(sim.trades[0].side, TradeSide::Buy);
        assert_eq!(sim.trades[0].price, 11.0);
        assert_eq!(sim.trades[0].quantity, 9.0);
        assert_eq!(sim.trades[1].side, TradeSide::Sell);
        assert_eq!(sim.trades[1].price, 12.0);
        assert_eq!(sim.snapshots.len(), 3);
        assert_eq!(sim.final_value, 109.0);
    }

    #[test]
    fn net_price_includes_fees() {
        let trade = TradeRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            side: TradeSide::Buy,
            price: 100.0,
            quantity: 10.0,
            amount: Some(1001.0),
            reason: String::new(),
        };
        assert!((trade.net_price() - 100.1).abs() < 1e-9);
    }
}
