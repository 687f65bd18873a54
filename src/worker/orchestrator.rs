//! Scheduled cycle orchestration

use super::pipeline::{CycleKind, CycleReport, Pipeline};
use crate::config::{ClusteringConfig, WorkerConfig};
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Persisted counter of failed cycles
pub const CYCLE_ERRORS: &str = "cycle_errors";

/// Runs the fast, full and clustering cycles on independent intervals
pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    fast_interval: Duration,
    full_interval: Duration,
    cluster_interval: Duration,
}

impl Orchestrator {
    pub fn new(pipeline: Arc<Pipeline>, worker: &WorkerConfig, clustering: &ClusteringConfig) -> Self {
        Self {
            pipeline,
            fast_interval: Duration::from_secs(worker.fast_interval_secs.max(1)),
            full_interval: Duration::from_secs(worker.full_interval_secs.max(1)),
            cluster_interval: Duration::from_secs(clustering.interval_secs.max(1)),
        }
    }

    /// Start one scheduling task per cycle
    ///
    /// Tasks stop once `shutdown` flips to true or its sender is dropped.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let schedule = [
            (CycleKind::Full, self.full_interval),
            (CycleKind::Fast, self.fast_interval),
            (CycleKind::Clustering, self.cluster_interval),
        ];

        schedule
            .into_iter()
            .map(|(kind, period)| {
                let orchestrator = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { orchestrator.schedule(kind, period, shutdown).await })
            })
            .collect()
    }

    async fn schedule(&self, kind: CycleKind, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(cycle = %kind, period_secs = period.as_secs(), "Cycle scheduled");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle(kind).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(cycle = %kind, "Cycle stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Run one cycle on its own task
    ///
    /// Errors and panics are counted and logged; they never reach the
    /// scheduler, so the next tick runs as usual.
    pub async fn run_cycle(&self, kind: CycleKind) -> Option<CycleReport> {
        let started = Instant::now();
        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::spawn(async move { pipeline.run(kind, Utc::now()).await });

        let failure = match task.await {
            Ok(Ok(report)) => {
                telemetry::record_latency(latency_metric(kind), started.elapsed());
                telemetry::increment(CounterMetric::Cycles);
                if let Err(e) = self.pipeline.cache().incr_counter(kind.counter()).await {
                    tracing::warn!(error = %e, "Failed to persist cycle counter");
                }
                tracing::info!(
                    cycle = %kind,
                    fetched = report.fetched,
                    scored = report.scored,
                    alerts = report.alerts,
                    clusters = report.clusters,
                    elapsed_ms = report.elapsed_ms,
                    "Cycle complete"
                );
                return Some(report);
            }
            Ok(Err(e)) => e.to_string(),
            Err(join_error) => format!("cycle task panicked: {}", join_error),
        };

        telemetry::increment(CounterMetric::CycleErrors);
        tracing::error!(cycle = %kind, error = %failure, "Cycle failed");
        if let Err(e) = self.pipeline.cache().incr_counter(CYCLE_ERRORS).await {
            tracing::warn!(error = %e, "Failed to persist cycle error counter");
        }
        None
    }
}

fn latency_metric(kind: CycleKind) -> LatencyMetric {
    match kind {
        CycleKind::Fast => LatencyMetric::FastCycle,
        CycleKind::Full => LatencyMetric::FullCycle,
        CycleKind::Clustering => LatencyMetric::ClusterCycle,
    }
}
