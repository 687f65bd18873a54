//! Deterministic synthetic market data
//!
//! Every value is derived from an FNV-1a hash of the asset symbol, so the same
//! symbol always produces the same snapshot, sparkline and history.

use super::{AssetSnapshot, PricePoint};
use chrono::{DateTime, Duration, DurationRound, Utc};
use fnv::FnvHasher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::hash::Hasher;

/// Well-known assets at the head of the synthetic universe: (id, symbol, name)
const KNOWN_ASSETS: &[(&str, &str, &str)] = &[
    ("bitcoin", "BTC", "Bitcoin"),
    ("ethereum", "ETH", "Ethereum"),
    ("solana", "SOL", "Solana"),
    ("binancecoin", "BNB", "BNB"),
    ("ripple", "XRP", "XRP"),
    ("cardano", "ADA", "Cardano"),
    ("dogecoin", "DOGE", "Dogecoin"),
    ("avalanche-2", "AVAX", "Avalanche"),
    ("tron", "TRX", "TRON"),
    ("polkadot", "DOT", "Polkadot"),
    ("chainlink", "LINK", "Chainlink"),
    ("matic-network", "MATIC", "Polygon"),
    ("litecoin", "LTC", "Litecoin"),
    ("uniswap", "UNI", "Uniswap"),
    ("cosmos", "ATOM", "Cosmos Hub"),
    ("near", "NEAR", "NEAR Protocol"),
    ("aptos", "APT", "Aptos"),
    ("arbitrum", "ARB", "Arbitrum"),
    ("optimism", "OP", "Optimism"),
    ("filecoin", "FIL", "Filecoin"),
    ("stellar", "XLM", "Stellar"),
    ("injective-protocol", "INJ", "Injective"),
    ("render-token", "RNDR", "Render"),
    ("the-graph", "GRT", "The Graph"),
    ("aave", "AAVE", "Aave"),
    ("maker", "MKR", "Maker"),
    ("sui", "SUI", "Sui"),
    ("sei-network", "SEI", "Sei"),
    ("pepe", "PEPE", "Pepe"),
    ("kaspa", "KAS", "Kaspa"),
];

/// Hash a symbol into a stable seed
pub fn symbol_seed(symbol: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(symbol.trim().to_uppercase().as_bytes());
    hasher.finish()
}

/// RNG seeded from a symbol and a purpose-specific salt
pub fn seeded_rng(symbol: &str, salt: &str) -> StdRng {
    let mut hasher = FnvHasher::with_key(symbol_seed(symbol));
    hasher.write(salt.as_bytes());
    StdRng::seed_from_u64(hasher.finish())
}

fn decimal(value: f64) -> Decimal {
    Decimal::try_from(value)
        .map(|d| d.round_dp(8))
        .unwrap_or(Decimal::ZERO)
}

/// Synthetic market producing reproducible fixtures
#[derive(Debug, Clone)]
pub struct SyntheticMarket {
    universe_size: usize,
}

impl SyntheticMarket {
    /// Create a synthetic market exposing `universe_size` assets
    pub fn new(universe_size: usize) -> Self {
        Self { universe_size }
    }

    /// Number of assets in the universe
    pub fn universe_size(&self) -> usize {
        self.universe_size
    }

    /// Identity of the asset at the given market-cap rank (0-based)
    fn identity(index: usize) -> (String, String, String) {
        match KNOWN_ASSETS.get(index) {
            Some((id, symbol, name)) => (id.to_string(), symbol.to_string(), name.to_string()),
            None => (
                format!("asset-{}", index + 1),
                format!("A{}", index + 1),
                format!("Asset {}", index + 1),
            ),
        }
    }

    /// Resolve the symbol for an asset id, falling back to the id itself
    pub fn symbol_for(&self, asset_id: &str) -> String {
        if let Some((_, symbol, _)) = KNOWN_ASSETS.iter().find(|(id, _, _)| *id == asset_id) {
            return symbol.to_string();
        }
        asset_id
            .strip_prefix("asset-")
            .map(|n| format!("A{}", n))
            .unwrap_or_else(|| asset_id.to_uppercase())
    }

    /// One page (1-based) of the universe
    pub fn universe(&self, page: u32, page_size: u32, with_history: bool) -> Vec<AssetSnapshot> {
        let page = page.max(1) as usize;
        let start = (page - 1) * page_size as usize;
        let end = (start + page_size as usize).min(self.universe_size);
        (start..end)
            .map(|index| self.snapshot(index, with_history))
            .collect()
    }

    /// Snapshot of the asset at the given market-cap rank (0-based)
    pub fn snapshot(&self, index: usize, with_history: bool) -> AssetSnapshot {
        let (id, symbol, name) = Self::identity(index);
        let mut rng = seeded_rng(&symbol, "snapshot");

        let price = 10f64.powf(rng.gen_range(-3.0..4.5));
        let rank_decay = ((index + 1) as f64).powf(1.3);
        let market_cap = 1.2e12 / rank_decay * rng.gen_range(0.8..1.2);
        let volume = market_cap * rng.gen_range(0.01..0.25);
        let change_1h = rng.gen_range(-3.0..3.0);
        let change_24h = rng.gen_range(-12.0..12.0);
        let change_7d = rng.gen_range(-25.0..25.0);

        let sparkline = if with_history {
            Self::sparkline(&symbol, price, change_7d)
        } else {
            Vec::new()
        };

        AssetSnapshot {
            id,
            symbol,
            name,
            price: decimal(price),
            market_cap: decimal(market_cap.round()),
            volume_24h: decimal(volume.round()),
            change_1h: Some(change_1h),
            change_24h: Some(change_24h),
            change_7d: Some(change_7d),
            sparkline,
            fetched_at: Utc::now(),
        }
    }

    /// 168 hourly prices ending at `price`, consistent with the 7d change
    fn sparkline(symbol: &str, price: f64, change_7d: f64) -> Vec<Decimal> {
        const POINTS: usize = 168;
        let mut rng = seeded_rng(symbol, "sparkline");
        let start = price / (1.0 + change_7d / 100.0);
        let step = (price / start).ln() / (POINTS - 1) as f64;

        (0..POINTS)
            .map(|i| {
                if i == POINTS - 1 {
                    return decimal(price);
                }
                let trend = start * (step * i as f64).exp();
                decimal(trend * (1.0 + rng.gen_range(-0.01..0.01)))
            })
            .collect()
    }

    /// Price history for an asset: hourly up to 90 days, daily beyond
    pub fn history(&self, asset_id: &str, days: u32, now: DateTime<Utc>) -> Vec<PricePoint> {
        let days = days.max(1);
        let symbol = self.symbol_for(asset_id);
        let mut rng = seeded_rng(&symbol, "history");

        let (count, step) = if days <= 90 {
            (days as usize * 24, Duration::hours(1))
        } else {
            (days as usize, Duration::days(1))
        };
        let end = now.duration_trunc(step).unwrap_or(now);
        let drift = rng.gen_range(-0.002..0.003);
        let vol = rng.gen_range(0.005..0.03);
        let mut price = 10f64.powf(rng.gen_range(-3.0..4.5));

        (0..count)
            .map(|i| {
                let shock: f64 = rng.gen_range(-1.0..1.0) * vol;
                price *= (drift + shock).exp();
                let ts = end - step * (count - 1 - i) as i32;
                PricePoint::new(ts, decimal(price))
            })
            .collect()
    }

    /// Number of venues listing the asset
    pub fn venue_count(&self, asset_id: &str) -> u32 {
        let symbol = self.symbol_for(asset_id);
        seeded_rng(&symbol, "venues").gen_range(1..=24)
    }
}

impl Default for SyntheticMarket {
    fn default() -> Self {
        Self::new(120)
    }
}
