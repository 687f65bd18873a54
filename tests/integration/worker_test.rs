//! Scheduled cycles wired through the application

use crate::support::{snapshot, test_config, FixtureSource};
use momentum_radar::alert::{AlertKind, Channel, NewAlertRule};
use momentum_radar::app::App;
use momentum_radar::service::{MomentumFilters, SortKey};
use momentum_radar::worker::CycleKind;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio_test::assert_ok;

fn universe(ids: &[&str]) -> Vec<momentum_radar::source::AssetSnapshot> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| snapshot(id, i as f64, 1_000_000))
        .collect()
}

#[tokio::test]
async fn test_dropped_asset_leaves_ranking_after_full_cycle() {
    let source = Arc::new(FixtureSource::new(universe(&["alpha", "beta", "gamma", "delta"])));
    let app = App::with_source(test_config(), source.clone()).unwrap();

    app.orchestrator.run_cycle(CycleKind::Full).await.unwrap();
    assert!(app.service.coin_detail("gamma", false).await.unwrap().is_some());
    assert_eq!(app.cache.ranked_count().await.unwrap(), 4);

    source.set_universe(universe(&["alpha", "beta", "delta"]));
    app.orchestrator.run_cycle(CycleKind::Full).await.unwrap();

    let page = app
        .service
        .momentum_page(1, 50, SortKey::Score, &MomentumFilters::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert!(page.items.iter().all(|e| e.result.asset_id != "gamma"));
}

#[tokio::test]
async fn test_cycles_are_counted() {
    let app = App::build(test_config()).unwrap();

    let full = app.orchestrator.run_cycle(CycleKind::Full).await.unwrap();
    assert_eq!(full.scored, 40);
    let fast = app.orchestrator.run_cycle(CycleKind::Fast).await.unwrap();
    assert_eq!(fast.scored, 10);
    let clustering = app.orchestrator.run_cycle(CycleKind::Clustering).await.unwrap();
    assert!((1..=5).contains(&clustering.clusters));

    let stats = app.service.stats().await.unwrap();
    assert_eq!(stats.full_cycles, 1);
    assert_eq!(stats.fast_cycles, 1);
    assert_eq!(stats.cluster_cycles, 1);
    assert_eq!(stats.cycle_errors, 0);
    assert_eq!(stats.ranked_assets, 40);
    assert_eq!(stats.tracked_assets, 40);

    let clusters = app.service.clusters().await.unwrap();
    let members: usize = clusters.iter().map(|c| c.members.len()).sum();
    assert_eq!(members, 40);

    let tagged = app.service.top_movers(40, SortKey::Score).await.unwrap();
    assert!(tagged.iter().all(|e| e.result.cluster.is_some()));
}

#[tokio::test]
async fn test_alert_fires_once_per_rate_limit_window() {
    let app = App::build(test_config()).unwrap();
    assert_ok!(app.service.create_alert(NewAlertRule {
        contact: "@ops".to_string(),
        symbol: "BTC".to_string(),
        kind: AlertKind::ScoreAbove,
        threshold: 0.0,
        channels: vec![Channel::Log],
    }));

    let first = app.orchestrator.run_cycle(CycleKind::Fast).await.unwrap();
    assert_eq!(first.alerts, 1);
    let second = app.orchestrator.run_cycle(CycleKind::Fast).await.unwrap();
    assert_eq!(second.alerts, 0);

    let rules = app.service.alerts_for("@ops");
    assert_eq!(rules[0].trigger_count, 1);
    assert!(rules[0].last_triggered.is_some());
}

#[tokio::test]
async fn test_fast_cycle_reports_no_movement_for_unchanged_scores() {
    // Market-cap order puts the weakest movers on the first page
    let ids: Vec<String> = (0..20).map(|i| format!("asset{:02}", i)).collect();
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    let source = Arc::new(FixtureSource::new(universe(&ids)));
    let app = App::with_source(test_config(), source).unwrap();

    let t0 = Utc::now() - Duration::hours(2);
    app.pipeline.run_full(t0).await.unwrap();
    app.pipeline.run_full(t0 + Duration::hours(1)).await.unwrap();

    let now = t0 + Duration::hours(1) + Duration::minutes(1);
    let fast = app.pipeline.run_fast(now).await.unwrap();
    assert_eq!(fast.scored, 10);

    assert!(app.ranks.rank_changes(30, 50, now).is_empty());
}
