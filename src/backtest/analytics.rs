//! Backtest analytics and reporting

use super::types::{BacktestMetrics, BacktestReport, Trade};

/// Annualized Sharpe-like ratio of per-trade returns
///
/// `periods_per_year` is the number of holding periods in a year. Returns
/// 0.0 without trades or when the returns have no variance.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    if std <= f64::EPSILON || !std.is_finite() {
        return 0.0;
    }
    mean / std * periods_per_year.max(0.0).sqrt()
}

/// Largest peak-to-trough decline of an equity curve, as a fraction
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let Some(&first) = equity.first() else {
        return 0.0;
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &value in equity {
        peak = peak.max(value);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }
    max_dd
}

/// Fraction of positive returns
pub fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().filter(|&&r| r > 0.0).count() as f64 / returns.len() as f64
}

/// Holding periods per year for a hold of `hold_hours`
pub fn periods_per_year(hold_hours: i64) -> f64 {
    if hold_hours <= 0 {
        return 0.0;
    }
    365.0 * 24.0 / hold_hours as f64
}

impl BacktestMetrics {
    /// Compute metrics from the trade log and equity curve
    pub fn compute(trades: &[Trade], equity_curve: &[f64], hold_hours: i64) -> Self {
        let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        let total_return = match (equity_curve.first(), equity_curve.last()) {
            (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
            _ => 0.0,
        };
        let avg_trade_return = if returns.is_empty() {
            0.0
        } else {
            returns.iter().sum::<f64>() / returns.len() as f64
        };

        Self {
            total_return,
            sharpe_ratio: sharpe_ratio(&returns, periods_per_year(hold_hours)),
            max_drawdown: max_drawdown(equity_curve),
            win_rate: win_rate(&returns),
            trade_count: trades.len(),
            avg_trade_return,
        }
    }
}

impl BacktestReport {
    /// Format as table for CLI output
    pub fn format_table(&self) -> String {
        let m = &self.metrics;
        let target = self
            .symbol
            .clone()
            .unwrap_or_else(|| format!("portfolio ({} assets)", self.assets));

        let mut out = format!(
            r#"
══════════════════════════════════════════════════════
               BACKTEST RESULTS
══════════════════════════════════════════════════════
Strategy:         {}
Target:           {}

PERFORMANCE
───────────────────────────────────────────────────────
Total Return:     {:+.2}%
Sharpe Ratio:     {:.2}
Max Drawdown:     {:.2}%
Win Rate:         {:.1}%

ACTIVITY
───────────────────────────────────────────────────────
Total Trades:     {}
Avg Trade:        {:+.2}%
"#,
            self.strategy,
            target,
            m.total_return * 100.0,
            m.sharpe_ratio,
            m.max_drawdown * 100.0,
            m.win_rate * 100.0,
            m.trade_count,
            m.avg_trade_return * 100.0,
        );

        if !self.trades.is_empty() {
            out.push_str("\nTRADES\n───────────────────────────────────────────────────────\n");
            for trade in self.trades.iter().take(20) {
                out.push_str(&format!(
                    "{:<8} {} → {}  {:+.2}%  {:?}\n",
                    trade.symbol,
                    trade.entry_time.format("%m-%d %H:%M"),
                    trade.exit_time.format("%m-%d %H:%M"),
                    trade.return_pct * 100.0,
                    trade.exit_reason,
                ));
            }
            if self.trades.len() > 20 {
                out.push_str(&format!("... {} more\n", self.trades.len() - 20));
            }
        }
        out.push_str("══════════════════════════════════════════════════════\n");
        out
    }
}
