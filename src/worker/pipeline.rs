//! One scoring cycle: fetch, fuse, score, cache, rank, alert

use super::history::{VenueCounts, VolumeHistory};
use crate::alert::AlertManager;
use crate::cache::{CacheError, ScoreCache};
use crate::cluster::ClusterEngine;
use crate::config::WorkerConfig;
use crate::features::FeatureVector;
use crate::fusion::Fusion;
use crate::rank::RankTracker;
use crate::scoring::{ClusterTag, ScoredResult, ScoringEngine};
use crate::source::{AssetSnapshot, MarketDataSource, SourceError};
use crate::telemetry::{self, GaugeMetric};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Assets fused concurrently
const FUSION_CONCURRENCY: usize = 16;
/// Volume observations kept per asset
const VOLUME_SAMPLES: usize = 48;
const VENUE_TTL_HOURS: i64 = 6;

/// Which scheduled cycle ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    Fast,
    Full,
    Clustering,
}

impl CycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleKind::Fast => "fast",
            CycleKind::Full => "full",
            CycleKind::Clustering => "clustering",
        }
    }

    /// Name of the persisted completion counter
    pub fn counter(&self) -> &'static str {
        match self {
            CycleKind::Fast => "fast_cycles",
            CycleKind::Full => "full_cycles",
            CycleKind::Clustering => "cluster_cycles",
        }
    }
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub kind: CycleKind,
    pub fetched: usize,
    pub scored: usize,
    pub alerts: usize,
    pub clusters: usize,
    pub elapsed_ms: u64,
}

/// Whole-cycle failures
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Market data error: {0}")]
    Source(#[from] SourceError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// The scoring pipeline shared by every cycle
///
/// Alerts see the batch scored in a cycle. Ranks are always read back from
/// the cached ranking, so a fast cycle over a subset records global
/// positions rather than positions inside its own batch.
pub struct Pipeline {
    source: Arc<dyn MarketDataSource>,
    fusion: Arc<Fusion>,
    scoring: ScoringEngine,
    cache: ScoreCache,
    ranks: Arc<RankTracker>,
    alerts: Arc<AlertManager>,
    clusterer: ClusterEngine,
    config: WorkerConfig,
    volumes: VolumeHistory,
    venues: VenueCounts,
    cluster_tags: RwLock<HashMap<String, ClusterTag>>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        fusion: Arc<Fusion>,
        scoring: ScoringEngine,
        cache: ScoreCache,
        ranks: Arc<RankTracker>,
        alerts: Arc<AlertManager>,
        clusterer: ClusterEngine,
        config: WorkerConfig,
    ) -> Self {
        Self {
            source,
            fusion,
            scoring,
            cache,
            ranks,
            alerts,
            clusterer,
            config,
            volumes: VolumeHistory::new(VOLUME_SAMPLES),
            venues: VenueCounts::new(chrono::Duration::hours(VENUE_TTL_HOURS)),
            cluster_tags: RwLock::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &ScoreCache {
        &self.cache
    }

    /// Run one cycle of the given kind
    pub async fn run(&self, kind: CycleKind, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        match kind {
            CycleKind::Fast => self.run_fast(now).await,
            CycleKind::Full => self.run_full(now).await,
            CycleKind::Clustering => self.run_clustering().await,
        }
    }

    /// Refresh the top-N subset, upserting each result
    pub async fn run_fast(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let snapshots = self
            .source
            .fetch_universe(1, self.config.fast_top_n, self.config.with_history)
            .await?;

        let results = self.score_snapshots(&snapshots, now).await;
        for result in &results {
            self.cache.set_scored_result(result).await?;
        }

        let alerts = self.record_and_alert(&results, now).await?;
        Ok(CycleReport {
            kind: CycleKind::Fast,
            fetched: snapshots.len(),
            scored: results.len(),
            alerts,
            clusters: 0,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Refresh the whole universe and replace the ranking
    ///
    /// A failed page aborts the cycle before anything is written, so the
    /// cached ranking from the previous cycle stays in place.
    pub async fn run_full(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let page_size = self.config.page_size.max(1);
        let mut snapshots = Vec::new();

        for page in 1..=self.config.max_pages.max(1) {
            if page > 1 && self.config.page_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.page_pause_ms)).await;
            }

            let batch = self
                .source
                .fetch_universe(page, page_size, self.config.with_history)
                .await?;
            let last_page = batch.len() < page_size as usize;
            snapshots.extend(batch);
            if last_page {
                break;
            }
        }

        let results = self.score_snapshots(&snapshots, now).await;
        self.cache.set_scored_results(&results).await?;
        telemetry::set_gauge(GaugeMetric::RankedAssets, results.len() as f64);

        let alerts = self.record_and_alert(&results, now).await?;
        Ok(CycleReport {
            kind: CycleKind::Full,
            fetched: snapshots.len(),
            scored: results.len(),
            alerts,
            clusters: 0,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Cluster the cached ranking and tag each record
    pub async fn run_clustering(&self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let mut results = self.cache.all_results().await?;
        let outcome = self.clusterer.compute_clusters(&results);

        let clusters = outcome.clusters().len();
        if !outcome.is_skipped() {
            outcome.assign(&mut results);
            self.cache.update_records(&results).await?;
            self.cache.set_clusters(outcome.clusters()).await?;

            let tags = results
                .iter()
                .filter_map(|r| r.cluster.clone().map(|tag| (r.asset_id.clone(), tag)))
                .collect();
            *self.cluster_tags.write() = tags;
            telemetry::set_gauge(GaugeMetric::Clusters, clusters as f64);
        }

        Ok(CycleReport {
            kind: CycleKind::Clustering,
            fetched: results.len(),
            scored: 0,
            alerts: 0,
            clusters,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Fuse and score a batch; assets that fail scoring are dropped
    pub async fn score_snapshots(
        &self,
        snapshots: &[AssetSnapshot],
        now: DateTime<Utc>,
    ) -> Vec<ScoredResult> {
        let mut vectors: Vec<FeatureVector> = Vec::with_capacity(snapshots.len());
        for (chunk, batch) in snapshots.chunks(FUSION_CONCURRENCY).enumerate() {
            let offset = chunk * FUSION_CONCURRENCY;
            let fused = join_all(
                batch
                    .iter()
                    .enumerate()
                    .map(|(i, snapshot)| self.feature_vector(offset + i, snapshot, now)),
            )
            .await;
            vectors.extend(fused);
        }

        let mut results = self.scoring.score_batch(&vectors);
        {
            let tags = self.cluster_tags.read();
            for result in results.iter_mut() {
                result.cluster = tags.get(&result.asset_id).cloned();
            }
        }

        telemetry::set_gauge(GaugeMetric::ScoredAssets, results.len() as f64);
        results
    }

    async fn feature_vector(
        &self,
        index: usize,
        snapshot: &AssetSnapshot,
        now: DateTime<Utc>,
    ) -> FeatureVector {
        let (reading, venues) = tokio::join!(
            self.fusion.fetch(&snapshot.symbol),
            self.venue_count(index, &snapshot.id, now),
        );
        let volume_history = self.volumes.observe(&snapshot.id, snapshot.volume_f64());
        FeatureVector::build(snapshot, &reading, venues, &volume_history)
    }

    /// Venue count for the first `venue_lookup_limit` assets of a batch
    async fn venue_count(&self, index: usize, asset_id: &str, now: DateTime<Utc>) -> Option<u32> {
        if let Some(count) = self.venues.get(asset_id, now) {
            return Some(count);
        }
        if index >= self.config.venue_lookup_limit {
            return None;
        }

        match self.source.fetch_venue_count(asset_id).await {
            Ok(count) => {
                self.venues.insert(asset_id, count, now);
                Some(count)
            }
            Err(e) => {
                tracing::warn!(asset = %asset_id, error = %e, "Venue lookup failed");
                None
            }
        }
    }

    async fn record_and_alert(
        &self,
        results: &[ScoredResult],
        now: DateTime<Utc>,
    ) -> Result<usize, CycleError> {
        let ranking = self.cache.all_results().await?;
        self.ranks.record_ranks(&ranking, now);
        Ok(self.alerts.check_alerts(results, now).await.len())
    }
}
