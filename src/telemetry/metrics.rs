//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Market data source request
    SourceRequest,
    /// Fast refresh cycle
    FastCycle,
    /// Full refresh cycle
    FullCycle,
    /// Clustering cycle
    ClusterCycle,
    /// Broadcast tick
    BroadcastTick,
    /// Backtest job runtime
    BacktestJob,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Assets in the latest scored batch
    ScoredAssets,
    /// Members of the ranking set
    RankedAssets,
    /// Clusters produced by the latest clustering run
    Clusters,
    /// Live broadcast connections
    Connections,
    /// Active alert rules
    ActiveAlertRules,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Requests issued to the market data source
    SourceRequests,
    /// Retried external calls
    Retries,
    /// Completed refresh cycles
    Cycles,
    /// Failed refresh cycles
    CycleErrors,
    /// Assets skipped because scoring failed
    ScoringFailures,
    /// Alert rules that fired
    AlertsTriggered,
    /// Failed alert channel deliveries
    AlertDispatchFailures,
    /// Broadcast messages sent
    BroadcastMessages,
    /// Connections dropped after a failed send
    DroppedConnections,
}

fn latency_name(metric: LatencyMetric) -> &'static str {
    match metric {
        LatencyMetric::SourceRequest => "momentum_source_request_latency_ms",
        LatencyMetric::FastCycle => "momentum_fast_cycle_latency_ms",
        LatencyMetric::FullCycle => "momentum_full_cycle_latency_ms",
        LatencyMetric::ClusterCycle => "momentum_cluster_cycle_latency_ms",
        LatencyMetric::BroadcastTick => "momentum_broadcast_tick_latency_ms",
        LatencyMetric::BacktestJob => "momentum_backtest_job_latency_ms",
    }
}

fn gauge_name(metric: GaugeMetric) -> &'static str {
    match metric {
        GaugeMetric::ScoredAssets => "momentum_scored_assets",
        GaugeMetric::RankedAssets => "momentum_ranked_assets",
        GaugeMetric::Clusters => "momentum_clusters",
        GaugeMetric::Connections => "momentum_broadcast_connections",
        GaugeMetric::ActiveAlertRules => "momentum_active_alert_rules",
    }
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::SourceRequests => "momentum_source_requests_total",
        CounterMetric::Retries => "momentum_retries_total",
        CounterMetric::Cycles => "momentum_cycles_total",
        CounterMetric::CycleErrors => "momentum_cycle_errors_total",
        CounterMetric::ScoringFailures => "momentum_scoring_failures_total",
        CounterMetric::AlertsTriggered => "momentum_alerts_triggered_total",
        CounterMetric::AlertDispatchFailures => "momentum_alert_dispatch_failures_total",
        CounterMetric::BroadcastMessages => "momentum_broadcast_messages_total",
        CounterMetric::DroppedConnections => "momentum_dropped_connections_total",
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let name = latency_name(metric);
    metrics::histogram!(name).record(duration.as_secs_f64() * 1000.0);
    tracing::trace!(
        metric = name,
        value_ms = duration.as_millis() as u64,
        "Recording latency"
    );
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(gauge_name(metric)).set(value);
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    increment_by(metric, 1);
}

/// Increment a counter by `n`
pub fn increment_by(metric: CounterMetric, n: u64) {
    metrics::counter!(counter_name(metric)).increment(n);
}
