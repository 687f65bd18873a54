//! Backtest engine and job registry

use super::simulator::BacktestSimulator;
use super::types::{
    BacktestError, BacktestJob, BacktestParams, BacktestReport, JobStatus, MAX_HISTORY_DAYS,
};
use crate::config::BacktestConfig;
use crate::source::{MarketDataSource, PricePoint};
use crate::telemetry::{self, LatencyMetric};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Fetches history through a [`MarketDataSource`] and runs the simulator
pub struct BacktestEngine {
    source: Arc<dyn MarketDataSource>,
    simulator: BacktestSimulator,
    portfolio_size: usize,
}

impl BacktestEngine {
    pub fn new(source: Arc<dyn MarketDataSource>, config: &BacktestConfig) -> Self {
        Self {
            source,
            simulator: BacktestSimulator::new(config),
            portfolio_size: config.portfolio_size.max(1),
        }
    }

    pub fn simulator(&self) -> &BacktestSimulator {
        &self.simulator
    }

    /// Run one backtest to completion
    pub async fn run(&self, params: &BacktestParams) -> Result<BacktestReport, BacktestError> {
        params.validate()?;
        let started = Instant::now();

        let report = match params.symbol.as_deref() {
            Some(asset_id) => {
                let series = self.history(asset_id, params).await?;
                if series.len() < 2 {
                    return Err(BacktestError::InsufficientData {
                        symbol: asset_id.to_string(),
                        points: series.len(),
                    });
                }
                self.simulator
                    .run_series(asset_id, &series, params.entry_threshold, params.hold())
            }
            None => {
                let universe = self.portfolio_universe(params).await?;
                self.simulator
                    .run_portfolio(&universe, params.entry_threshold, params.hold())
            }
        };

        telemetry::record_latency(LatencyMetric::BacktestJob, started.elapsed());
        tracing::info!(
            symbol = params.symbol.as_deref().unwrap_or("portfolio"),
            trades = report.metrics.trade_count,
            total_return = report.metrics.total_return,
            "Backtest complete"
        );
        Ok(report)
    }

    /// History inside the requested range, oldest first
    async fn history(
        &self,
        asset_id: &str,
        params: &BacktestParams,
    ) -> Result<Vec<PricePoint>, BacktestError> {
        let days = history_days(params.start, Utc::now());
        let mut series = self.source.fetch_history(asset_id, days).await?;
        series.retain(|p| p.timestamp >= params.start && p.timestamp <= params.end);
        series.sort_by_key(|p| p.timestamp);
        Ok(series)
    }

    async fn portfolio_universe(
        &self,
        params: &BacktestParams,
    ) -> Result<Vec<(String, Vec<PricePoint>)>, BacktestError> {
        let assets = self
            .source
            .fetch_universe(1, self.portfolio_size as u32, false)
            .await?;

        let mut universe = Vec::with_capacity(assets.len());
        for asset in assets {
            let series = self.history(&asset.id, params).await?;
            if series.len() < 2 {
                tracing::warn!(asset = %asset.id, points = series.len(), "Skipping asset without history");
                continue;
            }
            universe.push((asset.id, series));
        }

        if universe.is_empty() {
            return Err(BacktestError::InsufficientData {
                symbol: "portfolio".to_string(),
                points: 0,
            });
        }
        Ok(universe)
    }
}

/// Days of history needed to cover `start`, at least one
fn history_days(start: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    ((now - start).num_days() + 1).clamp(1, MAX_HISTORY_DAYS) as u32
}

/// In-memory job table; every job runs on its own task
pub struct BacktestJobs {
    engine: Arc<BacktestEngine>,
    jobs: Arc<DashMap<Uuid, BacktestJob>>,
    max_runtime: Duration,
}

impl BacktestJobs {
    pub fn new(engine: Arc<BacktestEngine>, config: &BacktestConfig) -> Self {
        Self {
            engine,
            jobs: Arc::new(DashMap::new()),
            max_runtime: Duration::from_secs(config.max_runtime_secs),
        }
    }

    /// Queue a job and start it in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, params: BacktestParams) -> Uuid {
        let job = BacktestJob::new(params.clone());
        let id = job.id;
        self.jobs.insert(id, job);

        let engine = self.engine.clone();
        let jobs = self.jobs.clone();
        let max_runtime = self.max_runtime;
        tokio::spawn(async move {
            Self::execute(engine, jobs, id, params, max_runtime).await;
        });

        tracing::info!(job = %id, "Backtest job queued");
        id
    }

    async fn execute(
        engine: Arc<BacktestEngine>,
        jobs: Arc<DashMap<Uuid, BacktestJob>>,
        id: Uuid,
        params: BacktestParams,
        max_runtime: Duration,
    ) {
        if let Some(mut job) = jobs.get_mut(&id) {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
        }

        let task = tokio::spawn(async move { engine.run(&params).await });
        let abort = task.abort_handle();
        let outcome = match tokio::time::timeout(max_runtime, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(BacktestError::Aborted(join_error.to_string())),
            Err(_) => {
                abort.abort();
                Err(BacktestError::Timeout(max_runtime))
            }
        };

        if let Some(mut job) = jobs.get_mut(&id) {
            job.finished_at = Some(Utc::now());
            match outcome {
                Ok(report) => {
                    job.status = JobStatus::Completed;
                    job.report = Some(report);
                }
                Err(e) => {
                    tracing::warn!(job = %id, error = %e, "Backtest job failed");
                    job.status = JobStatus::Failed;
                    job.error = Some(e.to_string());
                }
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<BacktestJob> {
        self.jobs.get(&id).map(|job| job.value().clone())
    }

    /// All jobs, newest first
    pub fn list(&self) -> Vec<BacktestJob> {
        let mut jobs: Vec<BacktestJob> = self.jobs.iter().map(|j| j.value().clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Poll until the job reaches a terminal state or `timeout` passes
    pub async fn wait(&self, id: Uuid, timeout: Duration) -> Option<BacktestJob> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.get(id)?;
            if job.status.is_terminal() || Instant::now() >= deadline {
                return Some(job);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
