//! Deterministic feature vectors for offline scoring and tests

use super::vector::{FeatureKind, FeatureVector, Technicals};
use crate::source::{seeded_rng, AssetSnapshot};
use rand::Rng;

/// Fill every feature of `snapshot` from a symbol-seeded generator
///
/// The snapshot's own price changes are kept when present. Output has no
/// defaulted features and goes through the scoring engine unchanged.
pub fn synthetic_vector(snapshot: &AssetSnapshot) -> FeatureVector {
    let mut rng = seeded_rng(&snapshot.symbol, "features");
    let mut vector = FeatureVector::neutral(
        snapshot.id.clone(),
        snapshot.symbol.clone(),
        snapshot.price,
        snapshot.market_cap,
    );
    vector.name = snapshot.name.clone();
    vector.volume_24h = snapshot.volume_24h;

    let market_cap = snapshot.market_cap_f64().max(1.0);
    let return_1h = rng.gen_range(-3.0..3.0);
    let return_24h = rng.gen_range(-12.0..12.0);
    let return_7d = rng.gen_range(-25.0..25.0);

    vector.set(FeatureKind::Momentum1h, snapshot.change_1h.unwrap_or(return_1h));
    vector.set(FeatureKind::PriceMomentum, snapshot.change_24h.unwrap_or(return_24h));
    vector.set(FeatureKind::Momentum7d, snapshot.change_7d.unwrap_or(return_7d));
    vector.set(FeatureKind::VolumeSpike, rng.gen_range(0.3..3.5));
    vector.set(FeatureKind::OrderbookImbalance, rng.gen_range(-0.7..0.7));
    vector.set(
        FeatureKind::LiquidityDepth,
        market_cap * rng.gen_range(0.0001..0.015),
    );
    vector.set(FeatureKind::OnchainInflow, 10f64.powf(rng.gen_range(3.0..8.5)));
    vector.set(FeatureKind::CrossVenue, rng.gen_range(1..=20u32) as f64);
    vector.set(FeatureKind::PredictiveTrend, rng.gen_range(0.1..0.9));

    vector.whale_confidence = rng.gen_range(0.0..1.0);
    vector.liquidity_score = rng.gen_range(0.1..1.0);
    vector.technicals = Technicals::from_series(&snapshot.sparkline_f64());
    vector
}
