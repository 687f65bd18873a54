//! Predictive trend probability

use super::{AdapterError, AdapterHttp, FusionAdapter, TREND_NEUTRAL};
use crate::config::{AdapterConfig, AdapterMode};
use crate::source::seeded_rng;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Output of the trend prediction model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDetails {
    /// Probability that the price trends up over the horizon, in [0, 1]
    pub probability: f64,
    /// Prediction horizon in hours
    pub horizon_hours: u32,
}

#[derive(Debug, Deserialize)]
struct PredictionDto {
    probability: f64,
    #[serde(default = "default_horizon")]
    horizon_hours: u32,
}

fn default_horizon() -> u32 {
    24
}

/// Adapter for an external trend prediction endpoint
pub struct TrendAdapter {
    http: AdapterHttp,
}

impl TrendAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        Ok(Self {
            http: AdapterHttp::new(config)?,
        })
    }

    fn mock(symbol: &str) -> TrendDetails {
        let mut rng = seeded_rng(symbol, "trend");
        TrendDetails {
            probability: rng.gen_range(0.2..0.85),
            horizon_hours: default_horizon(),
        }
    }

    async fn fetch(&self, symbol: &str) -> Result<TrendDetails, AdapterError> {
        let base = self
            .http
            .config()
            .base_url
            .as_deref()
            .ok_or(AdapterError::NotConfigured)?;
        let url = format!("{}/predict", base.trim_end_matches('/'));

        let dto: PredictionDto = self
            .http
            .get_json("trend", &url, &[("symbol", symbol.to_uppercase())])
            .await?;
        if !dto.probability.is_finite() {
            return Err(AdapterError::Decode("non-finite probability".to_string()));
        }

        Ok(TrendDetails {
            probability: dto.probability.clamp(0.0, 1.0),
            horizon_hours: dto.horizon_hours,
        })
    }
}

#[async_trait]
impl FusionAdapter for TrendAdapter {
    type Details = TrendDetails;

    fn name(&self) -> &'static str {
        "trend"
    }

    fn neutral(&self) -> f64 {
        TREND_NEUTRAL
    }

    fn value(&self, details: &TrendDetails) -> f64 {
        details.probability
    }

    async fn details(&self, symbol: &str) -> Option<TrendDetails> {
        match self.http.config().mode {
            AdapterMode::Mock => Some(Self::mock(symbol)),
            AdapterMode::Live => match self.fetch(symbol).await {
                Ok(details) => Some(details),
                Err(e) => {
                    tracing::warn!(adapter = self.name(), symbol, error = %e, "Fusion fetch failed");
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_dto_default_horizon() {
        let dto: PredictionDto = serde_json::from_str(r#"{"probability": 0.7}"#).unwrap();
        assert_eq!(dto.horizon_hours, 24);
    }

    #[tokio::test]
    async fn test_mock_probability_in_range() {
        let adapter = TrendAdapter::new(AdapterConfig::default()).unwrap();
        for symbol in ["BTC", "ETH", "PEPE", "A99"] {
            let p = adapter.get(symbol).await;
            assert!((0.0..=1.0).contains(&p));
            assert_eq!(p, adapter.get(symbol).await);
        }
    }

    #[tokio::test]
    async fn test_live_without_endpoint_is_neutral() {
        let adapter = TrendAdapter::new(AdapterConfig {
            mode: AdapterMode::Live,
            base_url: None,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(adapter.get("ETH").await, TREND_NEUTRAL);
    }
}
