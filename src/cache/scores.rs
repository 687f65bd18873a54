//! Typed access to scored results, rankings and counters

use super::{CacheError, CacheOp, CacheStore};
use crate::cluster::Cluster;
use crate::config::CacheConfig;
use crate::scoring::ScoredResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DATA_FIELD: &str = "data";

/// Scored-result facade over a [`CacheStore`]
#[derive(Clone)]
pub struct ScoreCache {
    store: Arc<dyn CacheStore>,
    prefix: String,
    result_ttl: Duration,
    cluster_ttl: Duration,
}

impl ScoreCache {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            prefix: config.key_prefix.clone(),
            result_ttl: Duration::from_secs(config.result_ttl_secs),
            cluster_ttl: Duration::from_secs(config.cluster_ttl_secs),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    fn result_key(&self, asset_id: &str) -> String {
        format!("{}:result:{}", self.prefix, asset_id)
    }

    fn ranking_key(&self) -> String {
        format!("{}:ranking", self.prefix)
    }

    fn clusters_key(&self) -> String {
        format!("{}:clusters", self.prefix)
    }

    fn counter_key(&self, name: &str) -> String {
        format!("{}:stats:{}", self.prefix, name)
    }

    fn record_op(&self, result: &ScoredResult) -> Result<CacheOp, CacheError> {
        let mut fields = HashMap::new();
        fields.insert(DATA_FIELD.to_string(), encode(result)?);
        fields.insert("symbol".to_string(), result.symbol.clone());
        fields.insert("score".to_string(), format!("{:.4}", result.score));

        Ok(CacheOp::HSet {
            key: self.result_key(&result.asset_id),
            fields,
            ttl: Some(self.result_ttl),
        })
    }

    fn rank_op(&self, result: &ScoredResult) -> CacheOp {
        CacheOp::ZAdd {
            key: self.ranking_key(),
            member: result.asset_id.clone(),
            score: result.score,
        }
    }

    /// Upsert one result: record and ranking change together
    pub async fn set_scored_result(&self, result: &ScoredResult) -> Result<(), CacheError> {
        let ops = vec![self.record_op(result)?, self.rank_op(result)];
        self.store.exec(ops).await
    }

    /// Replace the whole ranking with `results`
    ///
    /// The ranking is cleared first, so assets missing from `results` drop
    /// out of it. An empty slice leaves an empty ranking.
    pub async fn set_scored_results(&self, results: &[ScoredResult]) -> Result<(), CacheError> {
        let mut ops = Vec::with_capacity(results.len() * 2 + 1);
        ops.push(CacheOp::Del {
            key: self.ranking_key(),
        });
        for result in results {
            ops.push(self.record_op(result)?);
            ops.push(self.rank_op(result));
        }
        self.store.exec(ops).await
    }

    /// Rewrite stored records without touching the ranking
    pub async fn update_records(&self, results: &[ScoredResult]) -> Result<(), CacheError> {
        let ops = results
            .iter()
            .map(|r| self.record_op(r))
            .collect::<Result<Vec<_>, _>>()?;
        self.store.exec(ops).await
    }

    pub async fn get_result(&self, asset_id: &str) -> Result<Option<ScoredResult>, CacheError> {
        let key = self.result_key(asset_id);
        let fields = self.store.hget_all(&key).await?;
        match fields.get(DATA_FIELD) {
            Some(data) => decode(&key, data).map(Some),
            None => Ok(None),
        }
    }

    /// Up to `n` results by descending score
    ///
    /// Ranking members whose record has expired are skipped and removed, and
    /// reading continues down the ranking until `n` live results are found.
    pub async fn top(&self, n: usize) -> Result<Vec<ScoredResult>, CacheError> {
        let key = self.ranking_key();
        let mut results = Vec::with_capacity(n.min(1024));
        let mut stale = Vec::new();
        let mut start = 0;

        while results.len() < n {
            let want = n - results.len();
            let members = self
                .store
                .zrevrange(&key, start, start.saturating_add(want - 1))
                .await?;
            if members.is_empty() {
                break;
            }
            start += members.len();

            for (asset_id, _) in members {
                match self.get_result(&asset_id).await? {
                    Some(result) => results.push(result),
                    None => stale.push(asset_id),
                }
            }
        }

        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), "Pruning expired ranking members");
            let ops = stale
                .into_iter()
                .map(|member| CacheOp::ZRem {
                    key: key.clone(),
                    member,
                })
                .collect();
            self.store.exec(ops).await?;
        }
        Ok(results)
    }

    /// Every ranked result by descending score
    pub async fn all_results(&self) -> Result<Vec<ScoredResult>, CacheError> {
        let count = self.ranked_count().await?;
        self.top(count).await
    }

    pub async fn ranked_count(&self) -> Result<usize, CacheError> {
        self.store.zcard(&self.ranking_key()).await
    }

    /// Replace the stored cluster set
    pub async fn set_clusters(&self, clusters: &[Cluster]) -> Result<(), CacheError> {
        self.store
            .set(&self.clusters_key(), encode(&clusters)?, Some(self.cluster_ttl))
            .await
    }

    pub async fn clusters(&self) -> Result<Vec<Cluster>, CacheError> {
        let key = self.clusters_key();
        match self.store.get(&key).await? {
            Some(data) => decode(&key, &data),
            None => Ok(Vec::new()),
        }
    }

    pub async fn incr_counter(&self, name: &str) -> Result<i64, CacheError> {
        self.store.incr(&self.counter_key(name), 1).await
    }

    pub async fn counter(&self, name: &str) -> Result<i64, CacheError> {
        let key = self.counter_key(name);
        match self.store.get(&key).await? {
            Some(value) => value.parse().map_err(|e: std::num::ParseIntError| {
                CacheError::Decode {
                    key,
                    reason: e.to_string(),
                }
            }),
            None => Ok(0),
        }
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CacheError> {
    serde_json::to_string(value).map_err(|e| CacheError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(key: &str, data: &str) -> Result<T, CacheError> {
    serde_json::from_str(data).map_err(|e| CacheError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::features::FeatureVector;
    use crate::scoring::ScoringEngine;
    use rust_decimal_macros::dec;

    fn cache() -> ScoreCache {
        ScoreCache::new(Arc::new(MemoryStore::new()), &CacheConfig::default())
    }

    fn result(id: &str, score: f64) -> ScoredResult {
        let engine = ScoringEngine::new(Default::default());
        let vector = FeatureVector::neutral(id, id.to_uppercase(), dec!(1), dec!(1000000));
        let mut result = engine.score(&vector).unwrap();
        result.score = score;
        result
    }

    #[tokio::test]
    async fn test_upsert_and_top() {
        let cache = cache();
        cache.set_scored_result(&result("a", 10.0)).await.unwrap();
        cache.set_scored_result(&result("b", 30.0)).await.unwrap();
        cache.set_scored_result(&result("c", 20.0)).await.unwrap();
        cache.set_scored_result(&result("a", 40.0)).await.unwrap();

        let top: Vec<_> = cache
            .top(2)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.asset_id)
            .collect();
        assert_eq!(top, vec!["a", "b"]);
        assert_eq!(cache.ranked_count().await.unwrap(), 3);
        assert_eq!(cache.get_result("a").await.unwrap().unwrap().score, 40.0);
    }

    #[tokio::test]
    async fn test_bulk_replace_drops_stale_members() {
        let cache = cache();
        cache
            .set_scored_results(&[result("a", 10.0), result("b", 20.0)])
            .await
            .unwrap();
        cache.set_scored_results(&[result("c", 5.0)]).await.unwrap();

        let ids: Vec<_> = cache
            .all_results()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.asset_id)
            .collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[tokio::test]
    async fn test_bulk_replace_with_empty_list() {
        let cache = cache();
        cache
            .set_scored_results(&[result("a", 10.0), result("b", 20.0)])
            .await
            .unwrap();
        cache.set_scored_results(&[]).await.unwrap();
        assert!(cache.top(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_records_keeps_ranking() {
        let cache = cache();
        let mut r = result("a", 10.0);
        cache.set_scored_result(&r).await.unwrap();

        r.score = 99.0;
        cache.update_records(&[r]).await.unwrap();
        let members = cache.store().zrevrange("momentum:ranking", 0, 0).await.unwrap();
        assert_eq!(members[0].1, 10.0);
        assert_eq!(cache.get_result("a").await.unwrap().unwrap().score, 99.0);
    }

    #[tokio::test]
    async fn test_top_skips_and_prunes_expired_records() {
        let cache = cache();
        cache
            .set_scored_results(&[result("a", 30.0), result("b", 20.0), result("c", 10.0)])
            .await
            .unwrap();
        cache.store().del("momentum:result:a").await.unwrap();

        let top: Vec<_> = cache
            .top(2)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.asset_id)
            .collect();
        assert_eq!(top, vec!["b", "c"]);
        assert_eq!(cache.ranked_count().await.unwrap(), 2);
        assert_eq!(cache.all_results().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_data_is_empty() {
        let cache = cache();
        assert!(cache.get_result("nope").await.unwrap().is_none());
        assert!(cache.top(5).await.unwrap().is_empty());
        assert!(cache.top(0).await.unwrap().is_empty());
        assert!(cache.clusters().await.unwrap().is_empty());
        assert_eq!(cache.counter("cycles").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counters_and_clusters() {
        let cache = cache();
        cache.incr_counter("cycles").await.unwrap();
        cache.incr_counter("cycles").await.unwrap();
        assert_eq!(cache.counter("cycles").await.unwrap(), 2);

        let clusters = vec![Cluster {
            id: 0,
            label: "Leaders".to_string(),
            members: vec!["a".to_string()],
            avg_score: 50.0,
        }];
        cache.set_clusters(&clusters).await.unwrap();
        assert_eq!(cache.clusters().await.unwrap(), clusters);
    }
}
