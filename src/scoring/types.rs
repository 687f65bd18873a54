//! Scoring types

use crate::features::{FeatureKind, Technicals};
use crate::source::to_f64;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Weight per feature
///
/// Defaults sum to 1.0, so a vector with every feature at its upper bound
/// scores exactly 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub momentum_1h: f64,
    pub price_momentum: f64,
    pub momentum_7d: f64,
    pub volume_spike: f64,
    pub orderbook_imbalance: f64,
    pub liquidity_depth: f64,
    pub onchain_inflow: f64,
    pub cross_venue: f64,
    pub predictive_trend: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            momentum_1h: 0.10,
            price_momentum: 0.25,
            momentum_7d: 0.10,
            volume_spike: 0.20,
            orderbook_imbalance: 0.08,
            liquidity_depth: 0.07,
            onchain_inflow: 0.07,
            cross_venue: 0.05,
            predictive_trend: 0.08,
        }
    }
}

impl Weights {
    pub fn get(&self, kind: FeatureKind) -> f64 {
        match kind {
            FeatureKind::Momentum1h => self.momentum_1h,
            FeatureKind::PriceMomentum => self.price_momentum,
            FeatureKind::Momentum7d => self.momentum_7d,
            FeatureKind::VolumeSpike => self.volume_spike,
            FeatureKind::OrderbookImbalance => self.orderbook_imbalance,
            FeatureKind::LiquidityDepth => self.liquidity_depth,
            FeatureKind::OnchainInflow => self.onchain_inflow,
            FeatureKind::CrossVenue => self.cross_venue,
            FeatureKind::PredictiveTrend => self.predictive_trend,
        }
    }

    /// Sum of all weights
    pub fn total(&self) -> f64 {
        FeatureKind::ALL.iter().map(|k| self.get(*k)).sum()
    }

    /// Reject negative or non-finite weights
    pub fn validate(&self) -> Result<(), ScoringError> {
        for kind in FeatureKind::ALL {
            let weight = self.get(kind);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ScoringError::InvalidWeight {
                    feature: kind,
                    weight,
                });
            }
        }
        Ok(())
    }
}

/// Normalization bounds `(lo, hi)` per feature
///
/// Liquidity is bounded as depth / market cap and inflow as log10(1 + usd).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureBounds {
    pub momentum_1h: (f64, f64),
    pub price_momentum: (f64, f64),
    pub momentum_7d: (f64, f64),
    pub volume_spike: (f64, f64),
    pub orderbook_imbalance: (f64, f64),
    pub liquidity_depth: (f64, f64),
    pub onchain_inflow: (f64, f64),
    pub cross_venue: (f64, f64),
    pub predictive_trend: (f64, f64),
}

impl Default for FeatureBounds {
    fn default() -> Self {
        Self {
            momentum_1h: (-10.0, 10.0),
            price_momentum: (-20.0, 20.0),
            momentum_7d: (-40.0, 40.0),
            volume_spike: (0.0, 5.0),
            orderbook_imbalance: (-1.0, 1.0),
            liquidity_depth: (0.0, 0.02),
            onchain_inflow: (3.0, 9.0),
            cross_venue: (0.0, 20.0),
            predictive_trend: (0.0, 1.0),
        }
    }
}

impl FeatureBounds {
    pub fn get(&self, kind: FeatureKind) -> (f64, f64) {
        match kind {
            FeatureKind::Momentum1h => self.momentum_1h,
            FeatureKind::PriceMomentum => self.price_momentum,
            FeatureKind::Momentum7d => self.momentum_7d,
            FeatureKind::VolumeSpike => self.volume_spike,
            FeatureKind::OrderbookImbalance => self.orderbook_imbalance,
            FeatureKind::LiquidityDepth => self.liquidity_depth,
            FeatureKind::OnchainInflow => self.onchain_inflow,
            FeatureKind::CrossVenue => self.cross_venue,
            FeatureKind::PredictiveTrend => self.predictive_trend,
        }
    }
}

/// One feature's share of the composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: FeatureKind,
    /// Value as found in the feature vector
    pub raw: f64,
    /// Value after normalization, in [0, 1]
    pub normalized: f64,
    pub weight: f64,
    /// `normalized * weight * 100`
    pub contribution: f64,
    /// Human-readable explanation
    pub note: String,
}

/// Risk tags attached to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    /// Orderbook imbalance was unavailable
    ThinOrderbook,
    /// Orderbook depth was unavailable
    EstimatedLiquidity,
    /// Listed on too few venues
    LowVenueConfirmation,
    /// Fused liquidity score under threshold
    LowLiquidityScore,
    /// Sparkline dispersion above threshold
    HighVolatility,
}

/// Fused auxiliary signals carried on a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionSignals {
    pub whale_confidence: f64,
    pub trend_probability: f64,
    pub liquidity_score: f64,
}

/// Cluster assignment written back by the clustering engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterTag {
    pub id: usize,
    pub label: String,
}

/// Scored, explainable result for one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub asset_id: String,
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    pub market_cap: Decimal,
    pub volume_24h: Decimal,
    /// 24h price change in percent
    pub change_24h: f64,
    /// Composite score in [0, 100]
    pub score: f64,
    /// Confidence in [0, 100]
    pub confidence: f64,
    /// Three largest contributions, descending
    pub top_features: Vec<Contribution>,
    /// Every contribution, in feature order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub explanation: Vec<Contribution>,
    pub risk_flags: Vec<RiskFlag>,
    pub signals: FusionSignals,
    pub technicals: Option<Technicals>,
    pub cluster: Option<ClusterTag>,
    pub generated_at: DateTime<Utc>,
}

impl ScoredResult {
    /// Copy without the full explanation payload
    pub fn without_explanation(&self) -> Self {
        Self {
            explanation: Vec::new(),
            ..self.clone()
        }
    }

    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.risk_flags.contains(&flag)
    }

    pub fn price_f64(&self) -> f64 {
        to_f64(self.price)
    }

    /// Turnover ratio, 0.0 for a zero market cap
    pub fn volume_to_market_cap(&self) -> f64 {
        let market_cap = to_f64(self.market_cap);
        if market_cap <= 0.0 {
            return 0.0;
        }
        to_f64(self.volume_24h) / market_cap
    }
}

/// Per-asset scoring failures
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("{asset}: non-finite value for {feature}")]
    NonFinite { asset: String, feature: FeatureKind },

    #[error("Invalid weight {weight} for {feature}")]
    InvalidWeight { feature: FeatureKind, weight: f64 },
}
