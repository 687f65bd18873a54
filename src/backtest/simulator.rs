//! Threshold entry/exit simulation over price series

use super::types::{BacktestMetrics, BacktestReport, ExitReason, Trade};
use crate::config::BacktestConfig;
use crate::features::clamp;
use crate::source::{to_f64, PricePoint};
use chrono::{DateTime, Duration, Utc};

const NEUTRAL_SCORE: f64 = 50.0;

struct Position {
    entry_time: DateTime<Utc>,
    entry_price: f64,
    entry_score: f64,
}

/// Outcome of one series before it is turned into a report
#[derive(Debug, Clone)]
pub struct SeriesRun {
    pub trades: Vec<Trade>,
    /// Mark-to-market equity per sample, starting at 1.0
    pub equity_curve: Vec<f64>,
}

/// Replays price series through the momentum threshold strategy
///
/// The simulation path has no randomness: identical inputs produce
/// identical trades and equity.
#[derive(Debug, Clone)]
pub struct BacktestSimulator {
    lookback: usize,
    score_scale: f64,
    stop_loss_pct: f64,
    take_profit_pct: f64,
}

impl BacktestSimulator {
    pub fn new(config: &BacktestConfig) -> Self {
        Self {
            lookback: config.lookback.max(1),
            score_scale: config.score_scale,
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
        }
    }

    /// Proxy momentum score at `index`: neutral until `lookback` samples
    /// precede it, then 50 plus the scaled lookback return in percent
    pub fn proxy_score(&self, prices: &[f64], index: usize) -> f64 {
        if index < self.lookback || index >= prices.len() {
            return NEUTRAL_SCORE;
        }
        let base = prices[index - self.lookback];
        if base <= 0.0 {
            return NEUTRAL_SCORE;
        }
        let return_pct = (prices[index] / base - 1.0) * 100.0;
        clamp(NEUTRAL_SCORE + return_pct * self.score_scale, 0.0, 100.0)
    }

    /// Simulate one asset
    pub fn simulate(
        &self,
        symbol: &str,
        series: &[PricePoint],
        threshold: f64,
        hold: Duration,
    ) -> SeriesRun {
        let prices: Vec<f64> = series.iter().map(|p| to_f64(p.price)).collect();
        let mut trades = Vec::new();
        let mut equity_curve = Vec::with_capacity(series.len());
        let mut equity = 1.0;
        let mut position: Option<Position> = None;

        for (index, point) in series.iter().enumerate() {
            let price = prices[index];

            if let Some(open) = position.as_ref() {
                let last = index + 1 == series.len();
                if let Some(reason) = self.exit_reason(open, point.timestamp, price, hold, last) {
                    let return_pct = price / open.entry_price - 1.0;
                    equity *= 1.0 + return_pct;
                    trades.push(Trade {
                        symbol: symbol.to_string(),
                        entry_time: open.entry_time,
                        exit_time: point.timestamp,
                        entry_price: open.entry_price,
                        exit_price: price,
                        entry_score: open.entry_score,
                        return_pct,
                        exit_reason: reason,
                    });
                    position = None;
                    equity_curve.push(equity);
                    continue;
                }
            } else if price > 0.0 && index + 1 < series.len() {
                let score = self.proxy_score(&prices, index);
                if score >= threshold {
                    position = Some(Position {
                        entry_time: point.timestamp,
                        entry_price: price,
                        entry_score: score,
                    });
                }
            }

            let marked = match position.as_ref() {
                Some(open) => equity * price / open.entry_price,
                None => equity,
            };
            equity_curve.push(marked);
        }

        SeriesRun {
            trades,
            equity_curve,
        }
    }

    fn exit_reason(
        &self,
        open: &Position,
        now: DateTime<Utc>,
        price: f64,
        hold: Duration,
        last: bool,
    ) -> Option<ExitReason> {
        if price <= open.entry_price * (1.0 - self.stop_loss_pct) {
            Some(ExitReason::StopLoss)
        } else if price >= open.entry_price * (1.0 + self.take_profit_pct) {
            Some(ExitReason::TakeProfit)
        } else if now - open.entry_time >= hold {
            Some(ExitReason::HoldElapsed)
        } else if last {
            Some(ExitReason::EndOfData)
        } else {
            None
        }
    }

    /// Run one asset and summarize it
    pub fn run_series(
        &self,
        symbol: &str,
        series: &[PricePoint],
        threshold: f64,
        hold: Duration,
    ) -> BacktestReport {
        let run = self.simulate(symbol, series, threshold, hold);
        let metrics = BacktestMetrics::compute(&run.trades, &run.equity_curve, hold.num_hours());

        BacktestReport {
            strategy: "momentum".to_string(),
            symbol: Some(symbol.to_string()),
            assets: 1,
            metrics,
            trades: run.trades,
            equity_curve: run.equity_curve,
        }
    }

    /// Equal-weight portfolio over several assets
    ///
    /// Each asset gets the same share of capital; the portfolio curve is the
    /// mean of the per-asset curves over their common length.
    pub fn run_portfolio(
        &self,
        universe: &[(String, Vec<PricePoint>)],
        threshold: f64,
        hold: Duration,
    ) -> BacktestReport {
        let runs: Vec<SeriesRun> = universe
            .iter()
            .map(|(symbol, series)| self.simulate(symbol, series, threshold, hold))
            .collect();

        let common = runs.iter().map(|r| r.equity_curve.len()).min().unwrap_or(0);
        let equity_curve: Vec<f64> = (0..common)
            .map(|i| runs.iter().map(|r| r.equity_curve[i]).sum::<f64>() / runs.len() as f64)
            .collect();

        let mut trades: Vec<Trade> = runs.into_iter().flat_map(|r| r.trades).collect();
        trades.sort_by(|a, b| {
            a.entry_time
                .cmp(&b.entry_time)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        let metrics = BacktestMetrics::compute(&trades, &equity_curve, hold.num_hours());

        BacktestReport {
            strategy: "momentum".to_string(),
            symbol: None,
            assets: universe.len(),
            metrics,
            trades,
            equity_curve,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn series(prices: &[f64]) -> Vec<PricePoint> {
        let start = Utc::now() - Duration::hours(prices.len() as i64);
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| {
                PricePoint::new(
                    start + Duration::hours(i as i64),
                    Decimal::try_from(*p).unwrap(),
                )
            })
            .collect()
    }

    fn simulator() -> BacktestSimulator {
        BacktestSimulator::new(&BacktestConfig {
            lookback: 2,
            score_scale: 5.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_proxy_score_neutral_then_scaled() {
        let sim = simulator();
        let prices = [100.0, 100.0, 102.0, 90.0];
        assert_eq!(sim.proxy_score(&prices, 0), 50.0);
        assert_eq!(sim.proxy_score(&prices, 1), 50.0);
        assert!((sim.proxy_score(&prices, 2) - 60.0).abs() < 1e-9);
        assert_eq!(sim.proxy_score(&prices, 3), 0.0);
    }

    #[test]
    fn test_unreachable_threshold_never_trades() {
        let sim = simulator();
        let data = series(&[100.0, 110.0, 130.0, 150.0, 140.0, 160.0]);
        let report = sim.run_series("X", &data, 101.0, Duration::hours(2));

        assert_eq!(report.metrics.trade_count, 0);
        assert_eq!(report.metrics.total_return, 0.0);
        assert_eq!(report.metrics.sharpe_ratio, 0.0);
        assert!(report.equity_curve.iter().all(|e| *e == 1.0));
    }

    #[test]
    fn test_take_profit_exit() {
        let sim = simulator();
        // Score at index 2 is 50 + 5*5 = 75, entry at 105; 130 is +23.8%
        let data = series(&[100.0, 100.0, 105.0, 130.0, 131.0]);
        let report = sim.run_series("X", &data, 70.0, Duration::hours(48));

        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.entry_price, 105.0);
        assert_eq!(trade.exit_price, 130.0);
        assert!((report.metrics.total_return - (130.0 / 105.0 - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_stop_loss_exit() {
        let sim = simulator();
        let data = series(&[100.0, 100.0, 105.0, 90.0, 95.0]);
        let report = sim.run_series("X", &data, 70.0, Duration::hours(48));

        assert_eq!(report.trades[0].exit_reason, ExitReason::StopLoss);
        assert!(report.metrics.total_return < 0.0);
        assert!(report.metrics.max_drawdown > 0.1);
        assert_eq!(report.metrics.win_rate, 0.0);
    }

    #[test]
    fn test_hold_elapsed_exit() {
        let sim = simulator();
        let data = series(&[100.0, 100.0, 105.0, 106.0, 107.0, 104.0]);
        let report = sim.run_series("X", &data, 70.0, Duration::hours(2));

        let trade = &report.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::HoldElapsed);
        assert_eq!(trade.exit_time - trade.entry_time, Duration::hours(2));
    }

    #[test]
    fn test_end_of_data_exit() {
        let sim = simulator();
        let data = series(&[100.0, 100.0, 105.0, 106.0]);
        let report = sim.run_series("X", &data, 70.0, Duration::hours(48));
        assert_eq!(report.trades[0].exit_reason, ExitReason::EndOfData);
        assert_eq!(report.equity_curve.len(), data.len());
    }

    #[test]
    fn test_runs_are_deterministic() {
        let sim = simulator();
        let prices: Vec<f64> = (0..200)
            .map(|i| 100.0 + 10.0 * ((i as f64) / 7.0).sin() + i as f64 * 0.1)
            .collect();
        let data = series(&prices);

        let a = sim.run_series("X", &data, 55.0, Duration::hours(6));
        let b = sim.run_series("X", &data, 55.0, Duration::hours(6));
        assert_eq!(a, b);
        assert!(a.metrics.trade_count > 0);
    }

    #[test]
    fn test_portfolio_averages_assets() {
        let sim = simulator();
        let up = series(&[100.0, 100.0, 105.0, 130.0, 131.0]);
        let flat = series(&[100.0, 100.0, 100.0, 100.0, 100.0]);
        let report = sim.run_portfolio(
            &[("UP".to_string(), up), ("FLAT".to_string(), flat)],
            70.0,
            Duration::hours(48),
        );

        assert!(report.symbol.is_none());
        assert_eq!(report.assets, 2);
        assert_eq!(report.metrics.trade_count, 1);
        let expected = (130.0 / 105.0 - 1.0) / 2.0;
        assert!((report.metrics.total_return - expected).abs() < 1e-9);
    }
}
