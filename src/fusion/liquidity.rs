//! Exchange orderbook liquidity

use super::{AdapterError, AdapterHttp, FusionAdapter, LIQUIDITY_NEUTRAL};
use crate::config::{AdapterConfig, AdapterMode};
use crate::features::normalize;
use crate::orderbook::{OrderBook, PriceLevel};
use crate::source::{seeded_rng, to_f64};
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const DEFAULT_URL: &str = "https://api.binance.com/api/v3";
/// Band around mid used for depth and imbalance
const DEPTH_BAND: Decimal = dec!(0.02);

/// Orderbook-derived liquidity measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityDetails {
    /// Notional within ±2% of mid, in USD
    pub depth_usd: f64,
    /// `(bid - ask) / (bid + ask)` within the same band
    pub imbalance: f64,
    /// Liquidity score in [0, 1] from log10 depth
    pub score: f64,
    /// Quoted spread in basis points of mid
    pub spread_bps: Option<f64>,
}

impl LiquidityDetails {
    /// Derive liquidity measures from a book; `None` for a one-sided book
    pub fn from_book(book: &OrderBook) -> Option<Self> {
        let mid = book.mid_price()?;
        let depth = book.total_depth(DEPTH_BAND)?;
        let imbalance = book.imbalance(DEPTH_BAND).unwrap_or(Decimal::ZERO);
        let spread_bps = book
            .spread()
            .filter(|_| !mid.is_zero())
            .map(|s| to_f64(s / mid) * 10_000.0);

        Some(Self::new(to_f64(depth), to_f64(imbalance), spread_bps))
    }

    fn new(depth_usd: f64, imbalance: f64, spread_bps: Option<f64>) -> Self {
        Self {
            depth_usd,
            imbalance: imbalance.clamp(-1.0, 1.0),
            score: depth_score(depth_usd),
            spread_bps,
        }
    }
}

/// Map depth to [0, 1]: $1k scores 0, $10M scores 1
fn depth_score(depth_usd: f64) -> f64 {
    normalize((1.0 + depth_usd.max(0.0)).log10(), 3.0, 7.0)
}

#[derive(Debug, Deserialize)]
struct DepthDto {
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

impl DepthDto {
    fn into_book(self, symbol: &str) -> Result<OrderBook, AdapterError> {
        Ok(OrderBook::from_levels(
            symbol,
            parse_levels(&self.bids)?,
            parse_levels(&self.asks)?,
        ))
    }
}

fn parse_levels(raw: &[[String; 2]]) -> Result<Vec<PriceLevel>, AdapterError> {
    raw.iter()
        .map(|[price, size]| {
            let price = Decimal::from_str(price)
                .map_err(|e| AdapterError::Decode(format!("price {}: {}", price, e)))?;
            let size = Decimal::from_str(size)
                .map_err(|e| AdapterError::Decode(format!("size {}: {}", size, e)))?;
            Ok(PriceLevel::new(price, size))
        })
        .collect()
}

/// Adapter reading REST depth snapshots from an exchange
pub struct LiquidityAdapter {
    http: AdapterHttp,
}

impl LiquidityAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        Ok(Self {
            http: AdapterHttp::new(config)?,
        })
    }

    fn mock(symbol: &str) -> LiquidityDetails {
        let mut rng = seeded_rng(symbol, "liquidity");
        let depth = 10f64.powf(rng.gen_range(3.2..7.5));
        let imbalance = rng.gen_range(-0.6..0.6);
        let spread_bps = rng.gen_range(0.5..40.0);
        LiquidityDetails::new(depth, imbalance, Some(spread_bps))
    }

    /// Fetch the exchange book for `symbol` quoted in USDT
    pub async fn fetch_book(&self, symbol: &str) -> Result<OrderBook, AdapterError> {
        let base = self
            .http
            .config()
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_URL);
        let url = format!("{}/depth", base.trim_end_matches('/'));
        let pair = format!("{}USDT", symbol.to_uppercase());

        let dto: DepthDto = self
            .http
            .get_json(
                "liquidity",
                &url,
                &[("symbol", pair.clone()), ("limit", "100".to_string())],
            )
            .await?;
        dto.into_book(&pair)
    }
}

#[async_trait]
impl FusionAdapter for LiquidityAdapter {
    type Details = LiquidityDetails;

    fn name(&self) -> &'static str {
        "liquidity"
    }

    fn neutral(&self) -> f64 {
        LIQUIDITY_NEUTRAL
    }

    fn value(&self, details: &LiquidityDetails) -> f64 {
        details.score
    }

    async fn details(&self, symbol: &str) -> Option<LiquidityDetails> {
        match self.http.config().mode {
            AdapterMode::Mock => Some(Self::mock(symbol)),
            AdapterMode::Live => match self.fetch_book(symbol).await {
                Ok(book) => {
                    let details = LiquidityDetails::from_book(&book);
                    if details.is_none() {
                        tracing::debug!(symbol, "Orderbook is one-sided");
                    }
                    details
                }
                Err(e) => {
                    tracing::warn!(adapter = self.name(), symbol, error = %e, "Fusion fetch failed");
                    None
                }
            },
        }
    }
}
