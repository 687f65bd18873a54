//! Market data source module
//!
//! Rate-limited, retrying fetcher of per-asset market snapshots and price
//! history, with a deterministic synthetic mode for offline use and tests.

mod client;
mod rate_limit;
mod synthetic;
mod types;

pub use client::MarketDataClient;
pub use rate_limit::RateLimiter;
pub use synthetic::{seeded_rng, symbol_seed, SyntheticMarket};
pub use types::{to_f64, AssetSnapshot, PricePoint, SourceError};

use async_trait::async_trait;

/// Capability to list the asset universe and fetch per-asset history
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch one page (1-based) of the universe ordered by market cap
    async fn fetch_universe(
        &self,
        page: u32,
        page_size: u32,
        with_history: bool,
    ) -> Result<Vec<AssetSnapshot>, SourceError>;

    /// Fetch the price series for an asset covering the last `days` days
    async fn fetch_history(&self, asset_id: &str, days: u32)
        -> Result<Vec<PricePoint>, SourceError>;

    /// Count distinct venues listing the asset
    async fn fetch_venue_count(&self, asset_id: &str) -> Result<u32, SourceError>;
}
