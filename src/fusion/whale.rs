//! Whale transfer activity

use super::{AdapterError, AdapterHttp, FusionAdapter, WHALE_NEUTRAL};
use crate::config::{AdapterConfig, AdapterMode};
use crate::features::normalize;
use crate::source::seeded_rng;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

const DEFAULT_URL: &str = "https://api.whale-alert.io/v1";
/// Smallest transfer the feed reports
const MIN_TRANSFER_USD: u64 = 500_000;

/// Large-transfer activity for an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleDetails {
    /// Fused confidence that whales are active, in [0, 1]
    pub confidence: f64,
    /// Number of large transfers observed
    pub transfer_count: u32,
    /// Largest single transfer in USD
    pub largest_transfer_usd: f64,
    /// USD moved from exchanges into private wallets
    pub inflow_usd: f64,
}

impl WhaleDetails {
    /// Build details from raw activity, deriving the confidence
    pub fn from_activity(transfer_count: u32, largest_transfer_usd: f64, inflow_usd: f64) -> Self {
        let activity = (transfer_count as f64 / 10.0).min(1.0);
        let size = normalize((1.0 + largest_transfer_usd.max(0.0)).log10(), 5.5, 9.0);
        let confidence = if transfer_count == 0 {
            0.0
        } else {
            0.5 * activity + 0.5 * size
        };

        Self {
            confidence,
            transfer_count,
            largest_transfer_usd,
            inflow_usd: inflow_usd.max(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TransactionsDto {
    #[serde(default)]
    transactions: Vec<TransactionDto>,
}

#[derive(Debug, Deserialize)]
struct TransactionDto {
    amount_usd: f64,
    from: OwnerDto,
    to: OwnerDto,
}

#[derive(Debug, Deserialize)]
struct OwnerDto {
    #[serde(default)]
    owner_type: String,
}

impl TransactionsDto {
    fn into_details(self) -> WhaleDetails {
        let largest = self
            .transactions
            .iter()
            .map(|t| t.amount_usd)
            .fold(0.0, f64::max);
        let inflow = self
            .transactions
            .iter()
            .filter(|t| t.from.owner_type == "exchange" && t.to.owner_type != "exchange")
            .map(|t| t.amount_usd)
            .sum();

        WhaleDetails::from_activity(self.transactions.len() as u32, largest, inflow)
    }
}

/// Whale-transfer feed adapter
pub struct WhaleAdapter {
    http: AdapterHttp,
}

impl WhaleAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        Ok(Self {
            http: AdapterHttp::new(config)?,
        })
    }

    fn mock(symbol: &str) -> WhaleDetails {
        let mut rng = seeded_rng(symbol, "whale");
        let count = rng.gen_range(0..12u32);
        if count == 0 {
            return WhaleDetails::from_activity(0, 0.0, 0.0);
        }
        let largest = 10f64.powf(rng.gen_range(5.7..8.5));
        let inflow = largest * count as f64 * rng.gen_range(0.0..0.6);
        WhaleDetails::from_activity(count, largest, inflow)
    }

    async fn fetch(&self, symbol: &str) -> Result<WhaleDetails, AdapterError> {
        let config = self.http.config();
        let api_key = config.api_key.clone().ok_or(AdapterError::NotConfigured)?;
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_URL);
        let url = format!("{}/transactions", base.trim_end_matches('/'));
        let start = chrono::Utc::now().timestamp() - 3_600;

        let query = [
            ("api_key", api_key),
            ("currency", symbol.to_lowercase()),
            ("min_value", MIN_TRANSFER_USD.to_string()),
            ("start", start.to_string()),
        ];
        let dto: TransactionsDto = self.http.get_json("whale", &url, &query).await?;
        Ok(dto.into_details())
    }
}

#[async_trait]
impl FusionAdapter for WhaleAdapter {
    type Details = WhaleDetails;

    fn name(&self) -> &'static str {
        "whale"
    }

    fn neutral(&self) -> f64 {
        WHALE_NEUTRAL
    }

    fn value(&self, details: &WhaleDetails) -> f64 {
        details.confidence
    }

    async fn details(&self, symbol: &str) -> Option<WhaleDetails> {
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
