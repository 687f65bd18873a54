//! Behavioral clustering of the scored universe

mod kmeans;

pub use kmeans::{kmeans, standardize};

use crate::config::ClusteringConfig;
use crate::scoring::{ClusterTag, ScoredResult};
use crate::source::to_f64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Labels assigned by descending average score, cycled when there are more
/// clusters than labels
pub const CLUSTER_LABELS: &[&str] = &[
    "Momentum Leaders",
    "Accumulating",
    "Range Bound",
    "Cooling Off",
    "Laggards",
];

/// A group of assets with similar behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub label: String,
    /// Member asset ids
    pub members: Vec<String>,
    pub avg_score: f64,
}

/// Result of a clustering run
#[derive(Debug, Clone)]
pub enum ClusterOutcome {
    /// Fresh clusters, ordered by average score descending
    Computed {
        clusters: Vec<Cluster>,
        assignments: HashMap<String, ClusterTag>,
    },
    /// Too few assets for the configured cluster count
    Skipped { assets: usize, required: usize },
}

impl ClusterOutcome {
    pub fn clusters(&self) -> &[Cluster] {
        match self {
            ClusterOutcome::Computed { clusters, .. } => clusters,
            ClusterOutcome::Skipped { .. } => &[],
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ClusterOutcome::Skipped { .. })
    }

    /// Write cluster tags onto results; a skipped run leaves them untouched
    pub fn assign(&self, results: &mut [ScoredResult]) {
        if let ClusterOutcome::Computed { assignments, .. } = self {
            for result in results.iter_mut() {
                result.cluster = assignments.get(&result.asset_id).cloned();
            }
        }
    }
}

/// Groups assets on score, turnover, size and fused signals
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    config: ClusteringConfig,
}

impl ClusterEngine {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Feature row: score, volume/market cap, log10 market cap, whale
    /// confidence, trend probability
    fn features(result: &ScoredResult) -> Vec<f64> {
        vec![
            result.score,
            result.volume_to_market_cap(),
            to_f64(result.market_cap).max(1.0).log10(),
            result.signals.whale_confidence,
            result.signals.trend_probability,
        ]
    }

    /// Cluster `results`, or skip when there are fewer than `k`
    pub fn compute_clusters(&self, results: &[ScoredResult]) -> ClusterOutcome {
        let k = self.config.clusters.max(1);
        if results.len() < k {
            tracing::info!(assets = results.len(), required = k, "Skipping clustering");
            return ClusterOutcome::Skipped {
                assets: results.len(),
                required: k,
            };
        }

        let mut rows: Vec<Vec<f64>> = results.iter().map(Self::features).collect();
        standardize(&mut rows);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let labels = kmeans(&rows, k, self.config.max_iterations, &mut rng);

        let mut groups: Vec<Vec<&ScoredResult>> = vec![Vec::new(); k];
        for (result, cluster) in results.iter().zip(&labels) {
            groups[*cluster].push(result);
        }

        let mut ranked: Vec<(f64, Vec<&ScoredResult>)> = groups
            .into_iter()
            .filter(|g| !g.is_empty())
            .map(|g| {
                let avg = g.iter().map(|r| r.score).sum::<f64>() / g.len() as f64;
                (avg, g)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut clusters = Vec::with_capacity(ranked.len());
        let mut assignments = HashMap::with_capacity(results.len());
        for (id, (avg_score, members)) in ranked.into_iter().enumerate() {
            let label = CLUSTER_LABELS[id % CLUSTER_LABELS.len()].to_string();
            for member in &members {
                assignments.insert(
                    member.asset_id.clone(),
                    ClusterTag {
                        id,
                        label: label.clone(),
                    },
                );
            }
            clusters.push(Cluster {
                id,
                label,
                members: members.iter().map(|r| r.asset_id.clone()).collect(),
                avg_score,
            });
        }

        tracing::info!(assets = results.len(), clusters = clusters.len(), "Computed clusters");
        ClusterOutcome::Computed {
            clusters,
            assignments,
        }
    }
}
