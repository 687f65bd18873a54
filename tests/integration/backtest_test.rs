//! Backtests against fixed price histories

use crate::support::{epoch, FixtureSource};
use chrono::Duration;
use momentum_radar::backtest::{BacktestEngine, BacktestJobs, BacktestParams, JobStatus};
use momentum_radar::config::BacktestConfig;
use momentum_radar::source::MarketDataSource;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn engine() -> Arc<BacktestEngine> {
    let source: Arc<dyn MarketDataSource> = Arc::new(FixtureSource::new(Vec::new()));
    Arc::new(BacktestEngine::new(source, &BacktestConfig::default()))
}

fn params(threshold: f64) -> BacktestParams {
    BacktestParams {
        strategy: "momentum".to_string(),
        symbol: Some("bitcoin".to_string()),
        start: epoch(),
        end: epoch() + Duration::days(10),
        entry_threshold: threshold,
        hold_hours: 24,
    }
}

#[tokio::test]
async fn test_unreachable_threshold_never_trades() {
    let report = assert_ok!(engine().run(&params(101.0)).await);
    assert!(report.trades.is_empty());
    assert_eq!(report.metrics.trade_count, 0);
    assert_eq!(report.metrics.total_return, 0.0);
    assert_eq!(report.metrics.sharpe_ratio, 0.0);
}

#[tokio::test]
async fn test_same_inputs_same_report() {
    let engine = engine();
    let first = engine.run(&params(55.0)).await.unwrap();
    let second = engine.run(&params(55.0)).await.unwrap();

    assert!(!first.trades.is_empty());
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.trades, second.trades);
    assert_eq!(first.equity_curve, second.equity_curve);
}

#[tokio::test]
async fn test_jobs_report_completion_and_failure() {
    let jobs = BacktestJobs::new(engine(), &BacktestConfig::default());

    let ok = jobs.submit(params(60.0));
    let mut bad_params = params(60.0);
    bad_params.end = bad_params.start - Duration::days(1);
    let bad = jobs.submit(bad_params);

    let ok = jobs.wait(ok, std::time::Duration::from_secs(5)).await.unwrap();
    assert_eq!(ok.status, JobStatus::Completed);
    assert!(ok.report.is_some());

    let bad = jobs.wait(bad, std::time::Duration::from_secs(5)).await.unwrap();
    assert_eq!(bad.status, JobStatus::Failed);
    assert!(bad.error.is_some());
    assert_eq!(jobs.len(), 2);
}

#[tokio::test]
async fn test_unknown_strategy_is_rejected() {
    let mut p = params(60.0);
    p.strategy = "grid".to_string();
    assert_err!(engine().run(&p).await);
}
