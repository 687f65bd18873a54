//! Scoring and ranking of a controlled population

use crate::support::snapshot;
use chrono::Utc;
use momentum_radar::cache::{MemoryStore, ScoreCache};
use momentum_radar::config::CacheConfig;
use momentum_radar::features::{FeatureKind, FeatureVector};
use momentum_radar::fusion::FusionReading;
use momentum_radar::rank::RankTracker;
use momentum_radar::scoring::ScoringEngine;
use std::sync::Arc;

#[tokio::test]
async fn test_strong_mover_ranks_in_top_half() {
    let engine = ScoringEngine::new(Default::default());
    let reading = FusionReading::default();

    // Flat-volume population with 24h changes between -5% and +4%
    let mut vectors: Vec<FeatureVector> = (0..10)
        .map(|i| {
            let s = snapshot(&format!("asset-{}", i), i as f64 - 5.0, 1_000_000);
            FeatureVector::build(&s, &reading, Some(8), &[1_000_000.0])
        })
        .collect();

    // +15% on twice its usual volume
    let mover = snapshot("mover", 15.0, 2_000_000);
    vectors.push(FeatureVector::build(&mover, &reading, Some(8), &[1_000_000.0]));

    let results = engine.score_batch(&vectors);
    assert_eq!(results.len(), 11);
    for r in &results {
        assert!((0.0..=100.0).contains(&r.score));
        assert!((0.0..=100.0).contains(&r.confidence));
    }

    let cache = ScoreCache::new(Arc::new(MemoryStore::new()), &CacheConfig::default());
    cache.set_scored_results(&results).await.unwrap();
    let ranked = cache.all_results().await.unwrap();
    let position = ranked.iter().position(|r| r.asset_id == "mover").unwrap();
    assert!(position < ranked.len() / 2, "mover ranked {}", position + 1);

    let mover = &ranked[position];
    let top: Vec<FeatureKind> = mover.top_features.iter().map(|c| c.feature).collect();
    assert!(top.contains(&FeatureKind::PriceMomentum));
    assert!(top.contains(&FeatureKind::VolumeSpike));

    let spike = mover
        .explanation
        .iter()
        .find(|c| c.feature == FeatureKind::VolumeSpike)
        .unwrap();
    assert!((spike.raw - 2.0).abs() < 1e-9);

    let tracker = RankTracker::new(24);
    tracker.record_ranks(&ranked, Utc::now());
    assert_eq!(tracker.history("mover")[0].rank, position + 1);
}

#[test]
fn test_confidence_drops_with_missing_features() {
    let engine = ScoringEngine::new(Default::default());
    let s = snapshot("full", 3.0, 1_000_000);

    let complete = engine
        .score(&FeatureVector::build(
            &s,
            &FusionReading::default(),
            Some(8),
            &[1_000_000.0],
        ))
        .unwrap();
    let sparse = engine
        .score(&FeatureVector::build(&s, &FusionReading::default(), None, &[]))
        .unwrap();

    assert!(sparse.confidence < complete.confidence);
}
