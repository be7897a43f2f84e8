//! End-to-end engine tests through the public call contract.
//!
//! Tests cover:
//! - The moving-average worked example (entry at bar 3, exit at bar 6)
//! - RSI stop-loss exit and its effect on metrics
//! - Custom rule scripts over the full indicator panel
//! - Empty results for short series, recovered script faults
//! - Batch runs matching sequential runs
//! - Data port and JSON report adapters wired together

mod common;

use approx::assert_relative_eq;
use common::*;
use strategylab::adapters::json_report_adapter::JsonReportAdapter;
use strategylab::domain::backtest::{run_backtest, run_batch, run_series, BacktestRequest};
use strategylab::domain::error::EngineError;
use strategylab::domain::metrics::Metrics;
use strategylab::domain::params::StrategyParams;
use strategylab::domain::portfolio::TradeSide;
use strategylab::domain::strategy::StrategyKind;
use strategylab::ports::data_port::DataPort;
use strategylab::ports::report_port::ReportPort;

fn ma_request(short: f64, long: f64) -> BacktestRequest {
    BacktestRequest::new(
        StrategyKind::MaCross,
        StrategyParams::new()
            .with_number("short_window", short)
            .with_number("long_window", long),
    )
}

fn custom_request(script: &str) -> BacktestRequest {
    BacktestRequest::new(
        StrategyKind::Custom,
        StrategyParams::new().with_text("custom_code", script),
    )
}

mod worked_examples {
    use super::*;

    #[test]
    fn ma_cross_example() {
        let bars = make_bars(&[10.0, 10.0, 10.0, 12.0, 14.0, 16.0, 9.0, 9.0, 9.0]);
        let result = run_backtest(bars, &ma_request(2.0, 3.0)).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].side, TradeSide::Buy);
        assert_eq!(result.trades[0].timestamp, day(3));
        assert_eq!(result.trades[0].quantity, 8333.0);
        assert_eq!(result.trades[1].side, TradeSide::Sell);
        assert_eq!(result.trades[1].timestamp, day(6));

        assert_relative_eq!(result.metrics.final_value, 75_001.0, epsilon = 1e-6);
        assert_relative_eq!(result.metrics.total_return, -24.999, epsilon = 1e-9);
        assert_eq!(result.metrics.round_trips, 1);
        assert_eq!(result.metrics.win_rate, 0.0);
        assert!(result.metrics.max_drawdown <= 0.0);
    }

    #[test]
    fn rsi_stop_loss_example() {
        let bars = make_bars(&[100.0, 99.0, 98.0, 97.0, 96.0, 91.0]);
        let req = BacktestRequest::new(StrategyKind::Rsi, StrategyParams::new().with_number("rsi_period", 3.0));
        let result = run_backtest(bars, &req).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].price, 97.0);
        assert_eq!(result.trades[0].quantity, 1030.0);
        assert_eq!(result.trades[1].price, 91.0);
        assert!(result.trades[1].reason.starts_with("Stop loss"));
        assert_relative_eq!(result.metrics.final_value, 93_820.0, epsilon = 1e-6);
        assert_relative_eq!(result.metrics.total_return, -6.18, epsilon = 1e-9);
    }
}

mod custom_rules {
    use super::*;

    #[test]
    fn panel_columns_drive_trades() {
        let script = "\
if current.close > current.ma5 and position == 0:
    signal = 1
    reason = 'above ma5'
elif current.close < current.ma5 and position == 1:
    signal = -1
    reason = 'below ma5'
";
        let result = run_backtest(make_bars(&wave(300)), &custom_request(script)).unwrap();
        assert!(!result.trades.is_empty());
        for (i, t) in result.trades.iter().enumerate() {
            let expected = if i % 2 == 0 { TradeSide::Buy } else { TradeSide::Sell };
            assert_eq!(t.side, expected);
        }
        let buy = &result.trades[0];
        assert_eq!(buy.reason, "above ma5");
        assert_relative_eq!(
            buy.amount.unwrap(),
            buy.price * buy.quantity * 1.001,
            max_relative = 1e-12
        );
        // no evaluation before bar max(20, min(50, 300 / 10))
        assert!(buy.timestamp >= day(30));
    }

    #[test]
    fn helpers_are_callable() {
        let script = "\
r = custom_rsi(data.close, 14)
bands = custom_bollinger(data.close, period=20, std_dev=2)
if is_oversold(r[-1], 40) and current.close < bands.middle[-1]:
    signal = 1
elif is_overbought(r[-1], 60):
    signal = -1
";
        let req = custom_request(script);
        let a = run_backtest(make_bars(&wave(300)), &req).unwrap();
        let b = run_backtest(make_bars(&wave(300)), &req).unwrap();
        assert_eq!(a, b);
        assert!(!a.trades.is_empty());
        assert_eq!(a.trades[0].side, TradeSide::Buy);
    }

    #[test]
    fn always_faulting_script_is_recovered() {
        let result = run_backtest(make_bars(&wave(120)), &custom_request("signal = 1 / 0")).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.snapshots.len(), 120);
        assert_relative_eq!(result.metrics.final_value, 100_000.0);
    }

    #[test]
    fn out_of_range_signal_is_a_hold() {
        let result = run_backtest(make_bars(&wave(60)), &custom_request("signal = 2")).unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn syntax_error_is_fatal() {
        let err = run_backtest(make_bars(&wave(60)), &custom_request("if x > :\n  signal = 1")).unwrap_err();
        match err {
            EngineError::ScriptInvalid(parse) => assert_eq!(parse.line, 1),
            other => panic!("expected ScriptInvalid, got {other:?}"),
        }
    }

    #[test]
    fn forbidden_constructs_are_rejected() {
        for src in ["import os", "signal = open('x')", "x = lambda: 1"] {
            let err = run_backtest(make_bars(&wave(60)), &custom_request(src)).unwrap_err();
            assert!(matches!(err, EngineError::ScriptInvalid(_)), "{src}");
        }
    }

    #[test]
    fn runaway_expression_is_script_invalid() {
        let script = format!("signal = 0{}", " + 0".repeat(400_000));
        let err = run_backtest(make_bars(&wave(60)), &custom_request(&script)).unwrap_err();
        assert!(matches!(err, EngineError::ScriptInvalid(_)));
    }
}

mod edge_cases {
    use super::*;

    #[test]
    fn short_series_gives_empty_result() {
        for kind in StrategyKind::ALL {
            let req = BacktestRequest::new(kind, StrategyParams::new());
            let result = run_backtest(make_bars(&[100.0; 10]), &req).unwrap();
            assert!(result.trades.is_empty(), "{kind}");
            assert!(result.snapshots.is_empty(), "{kind}");
            assert!(result.equity_curve.is_empty(), "{kind}");
            assert_eq!(result.metrics, Metrics::default(), "{kind}");
        }
    }

    #[test]
    fn constant_prices_have_zero_risk_metrics() {
        let result = run_backtest(make_bars(&[50.0; 80]), &ma_request(5.0, 10.0)).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.metrics.volatility, 0.0);
        assert_eq!(result.metrics.sharpe_ratio, 0.0);
        assert_eq!(result.metrics.max_drawdown, 0.0);
        assert_relative_eq!(result.metrics.final_value, 100_000.0);
    }

    #[test]
    fn invalid_params_are_config_errors() {
        let err = run_backtest(make_bars(&wave(100)), &ma_request(30.0, 10.0)).unwrap_err();
        assert!(err.is_config());
        let req = BacktestRequest::new(
            StrategyKind::Bollinger,
            StrategyParams::new().with_text("period", "twenty"),
        );
        assert!(run_backtest(make_bars(&wave(100)), &req).unwrap_err().is_config());
    }

    #[test]
    fn oversized_window_is_config_error() {
        let err = run_backtest(make_bars(&wave(30)), &ma_request(2.0, 1e20)).unwrap_err();
        assert!(err.is_config());
        let req = BacktestRequest::new(StrategyKind::Rsi, StrategyParams::new().with_number("rsi_period", 1e20));
        assert!(run_backtest(make_bars(&wave(30)), &req).unwrap_err().is_config());
    }

    #[test]
    fn negative_price_is_data_invalid() {
        let mut bars = make_bars(&wave(50));
        bars[10].close = -1.0;
        let err = run_backtest(bars, &ma_request(2.0, 5.0)).unwrap_err();
        assert!(matches!(err, EngineError::DataInvalid { .. }));
    }
}

mod batch_and_adapters {
    use super::*;

    #[test]
    fn batch_matches_sequential() {
        let series = make_series(&wave(250));
        let requests = vec![
            ma_request(5.0, 20.0),
            BacktestRequest::new(StrategyKind::Rsi, StrategyParams::new()),
            BacktestRequest::new(StrategyKind::Bollinger, StrategyParams::new()),
            custom_request("if current.rsi14 < 35:\n    signal = 1\nelif current.rsi14 > 65:\n    signal = -1"),
        ];
        let batch = run_batch(&series, &requests);
        for (req, out) in requests.iter().zip(batch) {
            assert_eq!(out.unwrap(), run_series(&series, req).unwrap());
        }
    }

    #[test]
    fn data_port_to_json_report() {
        let port = MockDataPort::new(make_bars(&wave(200)));
        let result = run_backtest(port.load_bars().unwrap(), &ma_request(5.0, 20.0)).unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        JsonReportAdapter::new().write(&result, &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["strategy"], "ma_cross");
        assert_eq!(json["equity_curve"].as_array().unwrap().len(), 200);
        assert_eq!(json["equity_curve"][0]["date"], "2023-01-02");
        assert_eq!(json["trades"].as_array().unwrap().len(), result.trades.len());
    }

    #[test]
    fn failing_data_port_propagates() {
        let port = MockDataPort::failing("feed offline");
        assert!(matches!(port.load_bars(), Err(EngineError::DataInvalid { .. })));
    }
}
