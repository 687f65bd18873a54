//! Read and command surface for an HTTP layer
//!
//! Everything here reads the shared cache and in-process registries. "No
//! data yet" is an empty list or `None`, never an error.

use crate::alert::{AlertError, AlertManager, AlertRule, NewAlertRule};
use crate::backtest::{BacktestJob, BacktestJobs, BacktestParams};
use crate::broadcast::BroadcastManager;
use crate::cache::{CacheError, ScoreCache};
use crate::cluster::Cluster;
use crate::config::RankingConfig;
use crate::rank::{RankChange, RankSnapshot, RankTracker};
use crate::scoring::{RiskFlag, ScoredResult};
use crate::worker::{CycleKind, CYCLE_ERRORS};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Largest accepted page
pub const MAX_PER_PAGE: usize = 250;

/// List ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Score,
    Confidence,
    RankDelta,
}

impl FromStr for SortKey {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "score" => Ok(SortKey::Score),
            "confidence" => Ok(SortKey::Confidence),
            "rank_delta" => Ok(SortKey::RankDelta),
            other => Err(ServiceError::InvalidSort(other.to_string())),
        }
    }
}

/// Optional list filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumFilters {
    pub min_score: Option<f64>,
    pub min_confidence: Option<f64>,
    pub min_market_cap: Option<f64>,
    pub cluster: Option<usize>,
    /// Drop results carrying any of these flags
    pub exclude_flags: Vec<RiskFlag>,
}

impl MomentumFilters {
    fn accepts(&self, result: &ScoredResult) -> bool {
        self.min_score.map_or(true, |min| result.score >= min)
            && self
                .min_confidence
                .map_or(true, |min| result.confidence >= min)
            && self
                .min_market_cap
                .map_or(true, |min| crate::source::to_f64(result.market_cap) >= min)
            && self.cluster.map_or(true, |id| {
                result.cluster.as_ref().map(|c| c.id) == Some(id)
            })
            && !self.exclude_flags.iter().any(|f| result.has_flag(*f))
    }
}

/// A ranked list entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumEntry {
    /// 1-based position by score
    pub rank: usize,
    pub rank_delta: i64,
    #[serde(flatten)]
    pub result: ScoredResult,
}

/// One page of the ranked universe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumPage {
    pub page: usize,
    pub per_page: usize,
    /// Entries matching the filters across all pages
    pub total: usize,
    pub items: Vec<MomentumEntry>,
}

/// A single asset with its rank history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinDetail {
    pub rank: Option<usize>,
    pub rank_delta: i64,
    pub rank_history: Vec<RankSnapshot>,
    #[serde(flatten)]
    pub result: ScoredResult,
}

/// Runtime counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub ranked_assets: usize,
    pub tracked_assets: usize,
    pub fast_cycles: i64,
    pub full_cycles: i64,
    pub cluster_cycles: i64,
    pub cycle_errors: i64,
    pub active_alert_rules: usize,
    pub backtest_jobs: usize,
    pub connections: usize,
}

/// Service errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unknown sort key {0:?}")]
    InvalidSort(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// Facade over the cache, rank tracker, alerts, backtests and broadcast
#[derive(Clone)]
pub struct MomentumService {
    cache: ScoreCache,
    ranks: Arc<RankTracker>,
    alerts: Arc<AlertManager>,
    jobs: Arc<BacktestJobs>,
    broadcast: Arc<BroadcastManager>,
    window_minutes: i64,
}

impl MomentumService {
    pub fn new(
        cache: ScoreCache,
        ranks: Arc<RankTracker>,
        alerts: Arc<AlertManager>,
        jobs: Arc<BacktestJobs>,
        broadcast: Arc<BroadcastManager>,
        ranking: &RankingConfig,
    ) -> Self {
        Self {
            cache,
            ranks,
            alerts,
            jobs,
            broadcast,
            window_minutes: ranking.default_window_minutes,
        }
    }

    /// Best `limit` assets under `sort`
    pub async fn top_movers(
        &self,
        limit: usize,
        sort: SortKey,
    ) -> Result<Vec<MomentumEntry>, ServiceError> {
        let page = self
            .momentum_page(1, limit, sort, &MomentumFilters::default())
            .await?;
        Ok(page.items)
    }

    /// Filtered, sorted page of the ranking; `page` is 1-based
    pub async fn momentum_page(
        &self,
        page: usize,
        per_page: usize,
        sort: SortKey,
        filters: &MomentumFilters,
    ) -> Result<MomentumPage, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let now = Utc::now();

        let mut entries: Vec<MomentumEntry> = self
            .cache
            .all_results()
            .await?
            .into_iter()
            .enumerate()
            .map(|(index, result)| MomentumEntry {
                rank: index + 1,
                rank_delta: self
                    .ranks
                    .rank_delta(&result.asset_id, self.window_minutes, now),
                result: result.without_explanation(),
            })
            .filter(|entry| filters.accepts(&entry.result))
            .collect();

        // Input is already in score order; stable sorts keep it for ties
        match sort {
            SortKey::Score => {}
            SortKey::Confidence => {
                entries.sort_by(|a, b| b.result.confidence.total_cmp(&a.result.confidence))
            }
            SortKey::RankDelta => entries.sort_by(|a, b| b.rank_delta.cmp(&a.rank_delta)),
        }

        let total = entries.len();
        let items = entries
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(MomentumPage {
            page,
            per_page,
            total,
            items,
        })
    }

    /// One asset by id or symbol; the full explanation only when `explain`
    pub async fn coin_detail(
        &self,
        id: &str,
        explain: bool,
    ) -> Result<Option<CoinDetail>, ServiceError> {
        let ranked = self.cache.all_results().await?;
        let position = ranked
            .iter()
            .position(|r| r.asset_id == id)
            .or_else(|| ranked.iter().position(|r| r.symbol.eq_ignore_ascii_case(id)));

        let (rank, result) = match position {
            Some(index) => (Some(index + 1), ranked[index].clone()),
            None => match self.cache.get_result(id).await? {
                Some(result) => (None, result),
                None => return Ok(None),
            },
        };

        let result = if explain {
            result
        } else {
            result.without_explanation()
        };

        Ok(Some(CoinDetail {
            rank,
            rank_delta: self
                .ranks
                .rank_delta(&result.asset_id, self.window_minutes, Utc::now()),
            rank_history: self.ranks.history(&result.asset_id),
            result,
        }))
    }

    pub fn rank_changes(&self, window_minutes: Option<i64>, limit: usize) -> Vec<RankChange> {
        let window = window_minutes.unwrap_or(self.window_minutes);
        self.ranks.rank_changes(window, limit, Utc::now())
    }

    pub fn create_alert(&self, rule: NewAlertRule) -> Result<Uuid, ServiceError> {
        Ok(self.alerts.create_rule(rule)?)
    }

    pub fn alerts_for(&self, contact: &str) -> Vec<AlertRule> {
        self.alerts.rules_for(contact)
    }

    pub async fn clusters(&self) -> Result<Vec<Cluster>, ServiceError> {
        Ok(self.cache.clusters().await?)
    }

    /// Queue a backtest; invalid parameters surface as a failed job
    pub fn create_backtest_job(&self, params: BacktestParams) -> Uuid {
        self.jobs.submit(params)
    }

    pub fn backtest_result(&self, job_id: Uuid) -> Option<BacktestJob> {
        self.jobs.get(job_id)
    }

    pub async fn stats(&self) -> Result<ServiceStats, ServiceError> {
        Ok(ServiceStats {
            ranked_assets: self.cache.ranked_count().await?,
            tracked_assets: self.ranks.tracked(),
            fast_cycles: self.cache.counter(CycleKind::Fast.counter()).await?,
            full_cycles: self.cache.counter(CycleKind::Full.counter()).await?,
            cluster_cycles: self.cache.counter(CycleKind::Clustering.counter()).await?,
            cycle_errors: self.cache.counter(CYCLE_ERRORS).await?,
            active_alert_rules: self.alerts.active_count(),
            backtest_jobs: self.jobs.len(),
            connections: self.broadcast.connection_count(),
        })
    }
}
