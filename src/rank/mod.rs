//! Rank tracking
//!
//! Keeps a bounded history of each asset's position in the cached ranking
//! and reports how positions moved over a sliding window.

use crate::scoring::ScoredResult;
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One recorded position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankSnapshot {
    pub timestamp: DateTime<Utc>,
    /// 1-based position in the ranking
    pub rank: usize,
    pub score: f64,
}

/// Movement of one asset over a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankChange {
    pub asset_id: String,
    pub symbol: String,
    pub current_rank: usize,
    pub previous_rank: usize,
    /// Positive when the asset moved up
    pub delta: i64,
    pub score: f64,
}

#[derive(Debug)]
struct AssetHistory {
    symbol: String,
    entries: VecDeque<RankSnapshot>,
}

/// Sliding rank history per asset
///
/// Assets are kept in first-seen order, which is the tie-break for equal
/// rank movements.
pub struct RankTracker {
    history_window: Duration,
    history: RwLock<IndexMap<String, AssetHistory>>,
}

impl RankTracker {
    pub fn new(history_hours: i64) -> Self {
        Self {
            history_window: Duration::hours(history_hours),
            history: RwLock::new(IndexMap::new()),
        }
    }

    /// Record each result's position in the descending-score order of
    /// `results` and prune entries older than the history window
    ///
    /// Assets whose whole history falls outside the window are forgotten.
    pub fn record_ranks(&self, results: &[ScoredResult], now: DateTime<Utc>) {
        let mut order: Vec<&ScoredResult> = results.iter().collect();
        order.sort_by(|a, b| b.score.total_cmp(&a.score));

        let cutoff = now - self.history_window;
        let mut history = self.history.write();
        for (index, result) in order.into_iter().enumerate() {
            let entry = history
                .entry(result.asset_id.clone())
                .or_insert_with(|| AssetHistory {
                    symbol: result.symbol.clone(),
                    entries: VecDeque::new(),
                });

            entry.entries.push_back(RankSnapshot {
                timestamp: now,
                rank: index + 1,
                score: result.score,
            });
        }

        history.retain(|_, h| {
            while h.entries.front().is_some_and(|e| e.timestamp < cutoff) {
                h.entries.pop_front();
            }
            !h.entries.is_empty()
        });
    }

    /// Assets whose rank changed within the last `window_minutes`, largest
    /// movement first, truncated to `limit`
    pub fn rank_changes(
        &self,
        window_minutes: i64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<RankChange> {
        let start = now - Duration::minutes(window_minutes);
        let history = self.history.read();

        let mut changes: Vec<RankChange> = history
            .iter()
            .filter_map(|(asset_id, h)| Self::change(asset_id, h, start))
            .filter(|c| c.delta != 0)
            .collect();

        // Stable: equal movements keep first-seen order
        changes.sort_by(|a, b| b.delta.abs().cmp(&a.delta.abs()));
        changes.truncate(limit);
        changes
    }

    /// Rank change of a single asset, 0 when unknown
    pub fn rank_delta(&self, asset_id: &str, window_minutes: i64, now: DateTime<Utc>) -> i64 {
        let start = now - Duration::minutes(window_minutes);
        self.history
            .read()
            .get(asset_id)
            .and_then(|h| Self::change(asset_id, h, start))
            .map(|c| c.delta)
            .unwrap_or(0)
    }

    /// Full retained history for an asset, oldest first
    pub fn history(&self, asset_id: &str) -> Vec<RankSnapshot> {
        self.history
            .read()
            .get(asset_id)
            .map(|h| h.entries.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of assets with history
    pub fn tracked(&self) -> usize {
        self.history.read().len()
    }

    fn change(asset_id: &str, history: &AssetHistory, start: DateTime<Utc>) -> Option<RankChange> {
        let current = history.entries.back()?;
        if current.timestamp < start {
            return None;
        }
        let oldest = history.entries.iter().find(|e| e.timestamp >= start)?;

        Some(RankChange {
            asset_id: asset_id.to_string(),
            symbol: history.symbol.clone(),
            current_rank: current.rank,
            previous_rank: oldest.rank,
            delta: oldest.rank as i64 - current.rank as i64,
            score: current.score,
        })
    }
}
