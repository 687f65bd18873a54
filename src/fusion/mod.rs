//! Auxiliary signal fusion
//!
//! Each adapter turns one external signal (whale transfers, a predictive
//! trend model, exchange orderbook depth) into a value in [0, 1]. Adapters
//! are advisory: any failure degrades to a neutral value and never
//! propagates.

mod liquidity;
mod trend;
mod whale;

pub use liquidity::{LiquidityAdapter, LiquidityDetails};
pub use trend::{TrendAdapter, TrendDetails};
pub use whale::{WhaleAdapter, WhaleDetails};

use crate::config::{AdapterConfig, FusionConfig};
use crate::retry::{retry, Retryable};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whale confidence when no data is available
pub const WHALE_NEUTRAL: f64 = 0.0;
/// Trend probability when no data is available
pub const TREND_NEUTRAL: f64 = 0.5;
/// Liquidity score when no data is available
pub const LIQUIDITY_NEUTRAL: f64 = 0.5;

/// One auxiliary signal source
#[async_trait]
pub trait FusionAdapter: Send + Sync {
    /// Detail record produced by the adapter
    type Details: Send;

    /// Adapter name for logs
    fn name(&self) -> &'static str;

    /// Value returned when details are unavailable
    fn neutral(&self) -> f64;

    /// Collapse a detail record into a value in [0, 1]
    fn value(&self, details: &Self::Details) -> f64;

    /// Fetch or estimate details; `None` when the signal is unavailable
    async fn details(&self, symbol: &str) -> Option<Self::Details>;

    /// Signal value in [0, 1], neutral on failure
    async fn get(&self, symbol: &str) -> f64 {
        match self.details(symbol).await {
            Some(details) => self.value(&details).clamp(0.0, 1.0),
            None => self.neutral(),
        }
    }
}

/// Errors raised while talking to an adapter endpoint
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Adapter endpoint not configured")]
    NotConfigured,

    #[error("Unexpected status {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl Retryable for AdapterError {
    fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Transport(_) => true,
            AdapterError::Status(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            AdapterError::NotConfigured | AdapterError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AdapterError::Decode(e.to_string())
        } else {
            AdapterError::Transport(e.to_string())
        }
    }
}

/// HTTP plumbing shared by the live adapters
#[derive(Debug, Clone)]
pub(crate) struct AdapterHttp {
    client: Client,
    config: AdapterConfig,
}

impl AdapterHttp {
    pub(crate) fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    pub(crate) fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// GET a JSON document with the adapter's retry policy
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        label: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, AdapterError> {
        let policy = self.config.retry_policy();
        retry(&policy, label, || async {
            let response = self.client.get(url).query(query).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AdapterError::Status(status.as_u16()));
            }
            response
                .json::<T>()
                .await
                .map_err(|e| AdapterError::Decode(e.to_string()))
        })
        .await
        .map_err(|e| e.into_inner())
    }
}

/// Everything the fusion adapters learned about one asset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FusionReading {
    pub whale: Option<WhaleDetails>,
    pub trend: Option<TrendDetails>,
    pub liquidity: Option<LiquidityDetails>,
}

impl FusionReading {
    /// Fused whale confidence, neutral when unavailable
    pub fn whale_confidence(&self) -> f64 {
        self.whale
            .as_ref()
            .map(|w| w.confidence)
            .unwrap_or(WHALE_NEUTRAL)
    }

    /// Predictive trend probability, neutral when unavailable
    pub fn trend_probability(&self) -> f64 {
        self.trend
            .as_ref()
            .map(|t| t.probability)
            .unwrap_or(TREND_NEUTRAL)
    }

    /// Fused liquidity score, neutral when unavailable
    pub fn liquidity_score(&self) -> f64 {
        self.liquidity
            .as_ref()
            .map(|l| l.score)
            .unwrap_or(LIQUIDITY_NEUTRAL)
    }
}

/// The three adapters, queried concurrently
pub struct Fusion {
    whale: WhaleAdapter,
    trend: TrendAdapter,
    liquidity: LiquidityAdapter,
}

impl Fusion {
    /// Build all adapters from configuration
    pub fn new(config: &FusionConfig) -> Result<Self, AdapterError> {
        Ok(Self {
            whale: WhaleAdapter::new(config.whale.clone())?,
            trend: TrendAdapter::new(config.trend.clone())?,
            liquidity: LiquidityAdapter::new(config.liquidity.clone())?,
        })
    }

    /// All adapters in mock mode
    pub fn mock() -> Result<Self, AdapterError> {
        Self::new(&FusionConfig::default())
    }

    pub fn whale(&self) -> &WhaleAdapter {
        &self.whale
    }

    pub fn trend(&self) -> &TrendAdapter {
        &self.trend
    }

    pub fn liquidity(&self) -> &LiquidityAdapter {
        &self.liquidity
    }

    /// Query every adapter for `symbol`
    pub async fn fetch(&self, symbol: &str) -> FusionReading {
        let (whale, trend, liquidity) = tokio::join!(
            self.whale.details(symbol),
            self.trend.details(symbol),
            self.liquidity.details(symbol),
        );

        FusionReading {
            whale,
            trend,
            liquidity,
        }
    }
}
