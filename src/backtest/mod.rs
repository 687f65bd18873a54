//! Backtesting module
//!
//! Replays historical price series through the momentum threshold strategy
//! and reports trade logs and performance metrics. Jobs run in the
//! background and are kept in memory for the life of the process.

mod analytics;
mod engine;
mod simulator;
mod types;

pub use analytics::{max_drawdown, periods_per_year, sharpe_ratio, win_rate};
pub use engine::{BacktestEngine, BacktestJobs};
pub use simulator::{BacktestSimulator, SeriesRun};
pub use types::{
    BacktestError, BacktestJob, BacktestMetrics, BacktestParams, BacktestReport, ExitReason,
    JobStatus, Trade, STRATEGIES,
};
