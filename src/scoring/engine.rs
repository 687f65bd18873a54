//! Composite scoring engine

use super::types::{Contribution, FusionSignals, RiskFlag, ScoredResult, ScoringError, Weights};
use crate::config::ScoringConfig;
use crate::features::{clamp, normalize, FeatureKind, FeatureVector};
use crate::source::to_f64;
use crate::telemetry::{self, CounterMetric};
use chrono::Utc;

/// Number of contributions surfaced as top features
const TOP_FEATURES: usize = 3;

/// Weighted-feature scoring engine
///
/// Live and synthetic vectors go through the same path; the engine only
/// sees feature vectors.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score with the configured weights
    pub fn score(&self, vector: &FeatureVector) -> Result<ScoredResult, ScoringError> {
        self.score_with_weights(vector, &self.config.weights)
    }

    /// Score with explicit weights
    pub fn score_with_weights(
        &self,
        vector: &FeatureVector,
        weights: &Weights,
    ) -> Result<ScoredResult, ScoringError> {
        weights.validate()?;
        self.check_finite(vector)?;

        let explanation: Vec<Contribution> = FeatureKind::ALL
            .iter()
            .map(|kind| self.contribution(vector, *kind, weights.get(*kind)))
            .collect();

        let total: f64 = explanation.iter().map(|c| c.contribution).sum();
        let score = clamp(total, self.config.min_score, self.config.max_score);
        let confidence = self.confidence(vector);

        let mut ranked = explanation.clone();
        ranked.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
        ranked.truncate(TOP_FEATURES);

        Ok(ScoredResult {
            asset_id: vector.asset_id.clone(),
            symbol: vector.symbol.clone(),
            name: vector.name.clone(),
            price: vector.price,
            market_cap: vector.market_cap,
            volume_24h: vector.volume_24h,
            change_24h: vector.return_24h,
            score,
            confidence,
            top_features: ranked,
            explanation,
            risk_flags: self.risk_flags(vector),
            signals: FusionSignals {
                whale_confidence: vector.whale_confidence,
                trend_probability: vector.trend_probability,
                liquidity_score: vector.liquidity_score,
            },
            technicals: vector.technicals.clone(),
            cluster: None,
            generated_at: Utc::now(),
        })
    }

    /// Score many vectors, logging and skipping failures
    pub fn score_batch(&self, vectors: &[FeatureVector]) -> Vec<ScoredResult> {
        vectors
            .iter()
            .filter_map(|vector| match self.score(vector) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!(asset = %vector.asset_id, error = %e, "Scoring failed, skipping asset");
                    telemetry::increment(CounterMetric::ScoringFailures);
                    None
                }
            })
            .collect()
    }

    /// 100, minus a penalty per defaulted feature and for thin liquidity
    pub fn confidence(&self, vector: &FeatureVector) -> f64 {
        let mut confidence =
            100.0 - self.config.missing_feature_penalty * vector.defaulted_count() as f64;
        if vector.liquidity_score < self.config.low_liquidity_threshold {
            confidence -= self.config.low_liquidity_penalty;
        }
        clamp(confidence, 0.0, 100.0)
    }

    fn check_finite(&self, vector: &FeatureVector) -> Result<(), ScoringError> {
        if let Some(kind) = FeatureKind::ALL
            .into_iter()
            .find(|k| !vector.raw(*k).is_finite())
        {
            return Err(ScoringError::NonFinite {
                asset: vector.asset_id.clone(),
                feature: kind,
            });
        }
        Ok(())
    }

    /// Value fed to normalization for `kind`
    fn scaled_input(vector: &FeatureVector, kind: FeatureKind) -> f64 {
        match kind {
            FeatureKind::LiquidityDepth => {
                let market_cap = to_f64(vector.market_cap);
                if market_cap > 0.0 {
                    vector.liquidity_depth_usd / market_cap
                } else {
                    0.0
                }
            }
            FeatureKind::OnchainInflow => (1.0 + vector.onchain_inflow_usd.max(0.0)).log10(),
            other => vector.raw(other),
        }
    }

    fn contribution(&self, vector: &FeatureVector, kind: FeatureKind, weight: f64) -> Contribution {
        let raw = vector.raw(kind);
        let input = Self::scaled_input(vector, kind);
        let (lo, hi) = self.config.bounds.get(kind);
        let normalized = normalize(input, lo, hi);

        Contribution {
            feature: kind,
            raw,
            normalized,
            weight,
            contribution: normalized * weight * 100.0,
            note: note(kind, raw, input, vector.is_defaulted(kind)),
        }
    }

    fn risk_flags(&self, vector: &FeatureVector) -> Vec<RiskFlag> {
        let mut flags = Vec::new();
        if vector.is_defaulted(FeatureKind::OrderbookImbalance) {
            flags.push(RiskFlag::ThinOrderbook);
        }
        if vector.is_defaulted(FeatureKind::LiquidityDepth) {
            flags.push(RiskFlag::EstimatedLiquidity);
        }
        if vector.venue_count < self.config.min_venues {
            flags.push(RiskFlag::LowVenueConfirmation);
        }
        if vector.liquidity_score < self.config.low_liquidity_threshold {
            flags.push(RiskFlag::LowLiquidityScore);
        }
        if let Some(technicals) = &vector.technicals {
            if technicals.volatility > self.config.high_volatility_cv {
                flags.push(RiskFlag::HighVolatility);
            }
        }
        flags
    }
}

fn note(kind: FeatureKind, raw: f64, input: f64, defaulted: bool) -> String {
    let text = match kind {
        FeatureKind::Momentum1h => format!("1h price change {:+.2}%", raw),
        FeatureKind::PriceMomentum => format!("24h price change {:+.2}%", raw),
        FeatureKind::Momentum7d => format!("7d price change {:+.2}%", raw),
        FeatureKind::VolumeSpike => format!("volume {:.2}x trailing median", raw),
        FeatureKind::OrderbookImbalance => format!("orderbook imbalance {:+.2}", raw),
        FeatureKind::LiquidityDepth => format!(
            "${:.0} depth within 2% ({:.4}% of market cap)",
            raw,
            input * 100.0
        ),
        FeatureKind::OnchainInflow => format!("${:.0} whale accumulation", raw),
        FeatureKind::CrossVenue => format!("listed on {} venues", raw),
        FeatureKind::PredictiveTrend => format!("{:.0}% predicted uptrend probability", raw * 100.0),
    };
    if defaulted {
        format!("{} (neutral default)", text)
    } else {
        text
    }
}
