//! Per-asset feature vector

use super::indicators::{ema_cross, rsi, trailing_return, volatility, volume_ratio};
use crate::fusion::{FusionReading, LIQUIDITY_NEUTRAL, TREND_NEUTRAL, WHALE_NEUTRAL};
use crate::source::AssetSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Hours back used to recover each return window from an hourly sparkline
const RETURN_PERIODS: [usize; 3] = [1, 24, 167];
const RSI_PERIOD: usize = 14;
const EMA_FAST: usize = 12;
const EMA_SLOW: usize = 26;

/// A scored input feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// 1h price change
    Momentum1h,
    /// 24h price change
    PriceMomentum,
    /// 7d price change
    Momentum7d,
    /// Current volume relative to its trailing median
    VolumeSpike,
    /// Orderbook bid/ask imbalance
    OrderbookImbalance,
    /// Orderbook depth near mid
    LiquidityDepth,
    /// Whale accumulation out of exchanges
    OnchainInflow,
    /// Number of venues listing the asset
    CrossVenue,
    /// Predictive trend probability
    PredictiveTrend,
}

impl FeatureKind {
    /// Every feature, in scoring order
    pub const ALL: [FeatureKind; 9] = [
        FeatureKind::Momentum1h,
        FeatureKind::PriceMomentum,
        FeatureKind::Momentum7d,
        FeatureKind::VolumeSpike,
        FeatureKind::OrderbookImbalance,
        FeatureKind::LiquidityDepth,
        FeatureKind::OnchainInflow,
        FeatureKind::CrossVenue,
        FeatureKind::PredictiveTrend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Momentum1h => "momentum_1h",
            FeatureKind::PriceMomentum => "price_momentum",
            FeatureKind::Momentum7d => "momentum_7d",
            FeatureKind::VolumeSpike => "volume_spike",
            FeatureKind::OrderbookImbalance => "orderbook_imbalance",
            FeatureKind::LiquidityDepth => "liquidity_depth",
            FeatureKind::OnchainInflow => "onchain_inflow",
            FeatureKind::CrossVenue => "cross_venue",
            FeatureKind::PredictiveTrend => "predictive_trend",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicators derived from the sparkline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technicals {
    pub rsi: f64,
    /// Fast EMA above slow EMA
    pub ema_bullish: bool,
    /// Coefficient of variation of the series
    pub volatility: f64,
}

impl Technicals {
    /// Compute indicators; `None` for fewer than two points
    pub fn from_series(series: &[f64]) -> Option<Self> {
        if series.len() < 2 {
            return None;
        }
        Some(Self {
            rsi: rsi(series, RSI_PERIOD),
            ema_bullish: ema_cross(series, EMA_FAST, EMA_SLOW),
            volatility: volatility(series),
        })
    }
}

/// Scoring inputs for one asset at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub asset_id: String,
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    pub market_cap: Decimal,
    pub volume_24h: Decimal,
    /// Percent
    pub return_1h: f64,
    /// Percent
    pub return_24h: f64,
    /// Percent
    pub return_7d: f64,
    /// Current volume over trailing median
    pub volume_ratio: f64,
    /// In [-1, 1]
    pub orderbook_imbalance: f64,
    pub liquidity_depth_usd: f64,
    pub onchain_inflow_usd: f64,
    pub venue_count: u32,
    /// In [0, 1]
    pub trend_probability: f64,
    /// Fused whale confidence in [0, 1]
    pub whale_confidence: f64,
    /// Fused liquidity score in [0, 1]
    pub liquidity_score: f64,
    pub technicals: Option<Technicals>,
    /// Features that fell back to a neutral default
    pub defaulted: BTreeSet<FeatureKind>,
}

impl FeatureVector {
    /// Vector with every feature at its neutral default
    pub fn neutral(
        asset_id: impl Into<String>,
        symbol: impl Into<String>,
        price: Decimal,
        market_cap: Decimal,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            asset_id: asset_id.into(),
            name: symbol.clone(),
            symbol,
            price,
            market_cap,
            volume_24h: Decimal::ZERO,
            return_1h: 0.0,
            return_24h: 0.0,
            return_7d: 0.0,
            volume_ratio: 1.0,
            orderbook_imbalance: 0.0,
            liquidity_depth_usd: 0.0,
            onchain_inflow_usd: 0.0,
            venue_count: 1,
            trend_probability: TREND_NEUTRAL,
            whale_confidence: WHALE_NEUTRAL,
            liquidity_score: LIQUIDITY_NEUTRAL,
            technicals: None,
            defaulted: FeatureKind::ALL.into_iter().collect(),
        }
    }

    /// Build from a snapshot, the fusion reading, an optional venue count
    /// and the asset's trailing volume history
    pub fn build(
        snapshot: &AssetSnapshot,
        fusion: &FusionReading,
        venues: Option<u32>,
        volume_history: &[f64],
    ) -> Self {
        let mut vector = Self::neutral(
            snapshot.id.clone(),
            snapshot.symbol.clone(),
            snapshot.price,
            snapshot.market_cap,
        );
        vector.name = snapshot.name.clone();
        vector.volume_24h = snapshot.volume_24h;

        let sparkline = snapshot.sparkline_f64();
        let changes = [snapshot.change_1h, snapshot.change_24h, snapshot.change_7d];
        let kinds = [
            FeatureKind::Momentum1h,
            FeatureKind::PriceMomentum,
            FeatureKind::Momentum7d,
        ];
        for ((kind, change), period) in kinds.into_iter().zip(changes).zip(RETURN_PERIODS) {
            let value = change
                .filter(|c| c.is_finite())
                .or_else(|| trailing_return(&sparkline, period));
            if let Some(value) = value {
                vector.set(kind, value);
            }
        }

        if !volume_history.is_empty() {
            vector.set(
                FeatureKind::VolumeSpike,
                volume_ratio(snapshot.volume_f64(), volume_history),
            );
        }

        if let Some(whale) = &fusion.whale {
            vector.whale_confidence = whale.confidence;
            vector.set(FeatureKind::OnchainInflow, whale.inflow_usd);
        }
        if let Some(trend) = &fusion.trend {
            vector.set(FeatureKind::PredictiveTrend, trend.probability);
        }
        if let Some(liquidity) = &fusion.liquidity {
            vector.liquidity_score = liquidity.score;
            vector.set(FeatureKind::OrderbookImbalance, liquidity.imbalance);
            vector.set(FeatureKind::LiquidityDepth, liquidity.depth_usd);
        }
        if let Some(venues) = venues {
            vector.set(FeatureKind::CrossVenue, venues as f64);
        }

        vector.technicals = Technicals::from_series(&sparkline);
        vector
    }

    /// Provide a real value for `kind`, clearing its defaulted mark
    pub fn set(&mut self, kind: FeatureKind, value: f64) {
        match kind {
            FeatureKind::Momentum1h => self.return_1h = value,
            FeatureKind::PriceMomentum => self.return_24h = value,
            FeatureKind::Momentum7d => self.return_7d = value,
            FeatureKind::VolumeSpike => self.volume_ratio = value,
            FeatureKind::OrderbookImbalance => self.orderbook_imbalance = value,
            FeatureKind::LiquidityDepth => self.liquidity_depth_usd = value,
            FeatureKind::OnchainInflow => self.onchain_inflow_usd = value,
            FeatureKind::CrossVenue => self.venue_count = value.max(0.0).round() as u32,
            FeatureKind::PredictiveTrend => self.trend_probability = value,
        }
        self.defaulted.remove(&kind);
    }

    /// Raw value of a feature
    pub fn raw(&self, kind: FeatureKind) -> f64 {
        match kind {
            FeatureKind::Momentum1h => self.return_1h,
            FeatureKind::PriceMomentum => self.return_24h,
            FeatureKind::Momentum7d => self.return_7d,
            FeatureKind::VolumeSpike => self.volume_ratio,
            FeatureKind::OrderbookImbalance => self.orderbook_imbalance,
            FeatureKind::LiquidityDepth => self.liquidity_depth_usd,
            FeatureKind::OnchainInflow => self.onchain_inflow_usd,
            FeatureKind::CrossVenue => self.venue_count as f64,
            FeatureKind::PredictiveTrend => self.trend_probability,
        }
    }

    pub fn is_defaulted(&self, kind: FeatureKind) -> bool {
        self.defaulted.contains(&kind)
    }

    pub fn defaulted_count(&self) -> usize {
        self.defaulted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{LiquidityDetails, TrendDetails, WhaleDetails};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn snapshot(sparkline: Vec<Decimal>) -> AssetSnapshot {
        AssetSnapshot {
            id: "solana".to_string(),
            symbol: "SOL".to_string(),
            name: "Solana".to_string(),
            price: dec!(150),
            market_cap: dec!(70000000000),
            volume_24h: dec!(3000000000),
            change_1h: Some(0.4),
            change_24h: None,
            change_7d: None,
            sparkline,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_neutral_vector_is_fully_defaulted() {
        let vector = FeatureVector::neutral("x", "X", dec!(1), dec!(1000));
        assert_eq!(vector.defaulted_count(), FeatureKind::ALL.len());
        assert_eq!(vector.volume_ratio, 1.0);
        assert_eq!(vector.trend_probability, 0.5);
    }

    #[test]
    fn test_set_clears_default() {
        let mut vector = FeatureVector::neutral("x", "X", dec!(1), dec!(1000));
        vector.set(FeatureKind::PriceMomentum, 15.0);
        assert!(!vector.is_defaulted(FeatureKind::PriceMomentum));
        assert_eq!(vector.raw(FeatureKind::PriceMomentum), 15.0);
        assert_eq!(vector.defaulted_count(), FeatureKind::ALL.len() - 1);
    }

    #[test]
    fn test_build_backfills_returns_from_sparkline() {
        let sparkline: Vec<Decimal> = (0..168).map(|i| dec!(100) + Decimal::from(i)).collect();
        let vector = FeatureVector::build(&snapshot(sparkline), &FusionReading::default(), None, &[]);

        assert_eq!(vector.return_1h, 0.4);
        assert!(!vector.is_defaulted(FeatureKind::PriceMomentum));
        assert!(vector.return_24h > 0.0);
        assert!(!vector.is_defaulted(FeatureKind::Momentum7d));
        assert!(vector.technicals.is_some());
        assert!(vector.is_defaulted(FeatureKind::VolumeSpike));
        assert!(vector.is_defaulted(FeatureKind::CrossVenue));
    }

    #[test]
    fn test_build_without_sparkline_defaults_missing_returns() {
        let vector = FeatureVector::build(&snapshot(vec![]), &FusionReading::default(), Some(4), &[]);
        assert!(vector.is_defaulted(FeatureKind::PriceMomentum));
        assert!(vector.is_defaulted(FeatureKind::Momentum7d));
        assert!(!vector.is_defaulted(FeatureKind::CrossVenue));
        assert_eq!(vector.venue_count, 4);
        assert!(vector.technicals.is_none());
    }

    #[test]
    fn test_build_uses_fusion_reading() {
        let reading = FusionReading {
            whale: Some(WhaleDetails::from_activity(5, 5_000_000.0, 1_000_000.0)),
            trend: Some(TrendDetails {
                probability: 0.8,
                horizon_hours: 24,
            }),
            liquidity: Some(LiquidityDetails {
                depth_usd: 2_000_000.0,
                imbalance: -0.2,
                score: 0.8,
                spread_bps: None,
            }),
        };
        let vector = FeatureVector::build(&snapshot(vec![]), &reading, Some(9), &[1.0e9, 2.0e9]);

        assert_eq!(vector.trend_probability, 0.8);
        assert_eq!(vector.orderbook_imbalance, -0.2);
        assert_eq!(vector.liquidity_score, 0.8);
        assert_eq!(vector.onchain_inflow_usd, 1_000_000.0);
        assert_eq!(vector.volume_ratio, 2.0);
        assert!(vector.whale_confidence > 0.0);
        assert!(!vector.is_defaulted(FeatureKind::LiquidityDepth));
    }

    #[test]
    fn test_feature_kind_names() {
        assert_eq!(FeatureKind::PriceMomentum.to_string(), "price_momentum");
        assert_eq!(
            serde_json::to_string(&FeatureKind::VolumeSpike).unwrap(),
            "\"volume_spike\""
        );
    }
}
