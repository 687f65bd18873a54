//! Backtest types

use crate::source::SourceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Strategies the engine knows how to run
pub const STRATEGIES: &[&str] = &["momentum"];

/// Longest history the engine asks the source for
pub const MAX_HISTORY_DAYS: i64 = 365;

/// A position can never be held longer than the history it runs on
pub const MAX_HOLD_HOURS: i64 = MAX_HISTORY_DAYS * 24;

/// Parameters of one backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestParams {
    pub strategy: String,
    /// Single asset id; `None` runs the portfolio simulation
    pub symbol: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Proxy score at or above which a position is opened
    pub entry_threshold: f64,
    pub hold_hours: i64,
}

impl BacktestParams {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if !STRATEGIES.contains(&self.strategy.as_str()) {
            return Err(BacktestError::UnknownStrategy(self.strategy.clone()));
        }
        if self.start >= self.end {
            return Err(BacktestError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        if !(1..=MAX_HOLD_HOURS).contains(&self.hold_hours) {
            return Err(BacktestError::InvalidParams(format!(
                "hold_hours must be between 1 and {}, got {}",
                MAX_HOLD_HOURS, self.hold_hours
            )));
        }
        if !self.entry_threshold.is_finite() {
            return Err(BacktestError::InvalidParams(
                "entry_threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn hold(&self) -> chrono::Duration {
        chrono::Duration::hours(self.hold_hours.clamp(1, MAX_HOLD_HOURS))
    }
}

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    HoldElapsed,
    StopLoss,
    TakeProfit,
    EndOfData,
}

/// One round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Proxy score that opened the position
    pub entry_score: f64,
    /// Fractional return, 0.05 = +5%
    pub return_pct: f64,
    pub exit_reason: ExitReason,
}

/// Summary statistics of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Fractional total return of the compounded equity
    pub total_return: f64,
    /// Annualized mean/std of per-trade returns
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough fall of the equity curve, as a fraction
    pub max_drawdown: f64,
    /// Fraction of trades with a positive return
    pub win_rate: f64,
    pub trade_count: usize,
    pub avg_trade_return: f64,
}

/// Complete result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub strategy: String,
    /// `None` for a portfolio run
    pub symbol: Option<String>,
    /// Assets simulated
    pub assets: usize,
    pub metrics: BacktestMetrics,
    pub trades: Vec<Trade>,
    /// Mark-to-market equity, starting at 1.0
    pub equity_curve: Vec<f64>,
}

/// A backtest request and its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestJob {
    pub id: Uuid,
    pub params: BacktestParams,
    pub status: JobStatus,
    pub report: Option<BacktestReport>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BacktestJob {
    pub fn new(params: BacktestParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            params,
            status: JobStatus::Queued,
            report: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Backtest errors
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("Unknown strategy {0}")]
    UnknownStrategy(String),

    #[error("Invalid range: start {start} is not before end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Not enough history for {symbol}: {points} points")]
    InsufficientData { symbol: String, points: usize },

    #[error("Market data error: {0}")]
    Source(#[from] SourceError),

    #[error("Backtest exceeded max runtime of {0:?}")]
    Timeout(Duration),

    #[error("Backtest task aborted: {0}")]
    Aborted(String),
}
