//! Backtest command implementation

use super::OutputFormat;
use crate::backtest::{BacktestEngine, BacktestParams};
use crate::config::Config;
use crate::source::{MarketDataClient, MarketDataSource};
use chrono::{Duration, Utc};
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct BacktestArgs {
    /// Asset id to test; omit for the equal-weight portfolio
    #[arg(long)]
    pub symbol: Option<String>,

    /// Days of history ending now
    #[arg(long, default_value = "30")]
    pub days: i64,

    /// Proxy score that opens a position
    #[arg(long, default_value = "70")]
    pub threshold: f64,

    /// Hours a position is held
    #[arg(long, default_value = "24")]
    pub hold_hours: i64,

    /// Strategy name
    #[arg(long, default_value = "momentum")]
    pub strategy: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl BacktestArgs {
    pub fn params(&self) -> BacktestParams {
        let end = Utc::now();
        BacktestParams {
            strategy: self.strategy.clone(),
            symbol: self.symbol.clone(),
            start: end - Duration::days(self.days.max(1)),
            end,
            entry_threshold: self.threshold,
            hold_hours: self.hold_hours,
        }
    }

    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let source: Arc<dyn MarketDataSource> = Arc::new(MarketDataClient::new(config.source.clone())?);
        let engine = BacktestEngine::new(source, &config.backtest);
        let params = self.params();
        let max_runtime = std::time::Duration::from_secs(config.backtest.max_runtime_secs.max(1));

        tracing::info!(
            strategy = %params.strategy,
            symbol = ?params.symbol,
            days = self.days,
            threshold = params.entry_threshold,
            "Running backtest"
        );
        let report = tokio::time::timeout(max_runtime, engine.run(&params))
            .await
            .map_err(|_| anyhow::anyhow!("Backtest exceeded max runtime of {:?}", max_runtime))??;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Table => print!("{}", report.format_table()),
        }
        Ok(())
    }
}
