//! Shared fixtures

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use momentum_radar::config::Config;
use momentum_radar::source::{AssetSnapshot, MarketDataSource, PricePoint, SourceError};
use parking_lot::Mutex;
use rust_decimal::Decimal;

/// Start of every fixture price series
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn snapshot(id: &str, change_24h: f64, volume: i64) -> AssetSnapshot {
    AssetSnapshot {
        id: id.to_string(),
        symbol: id.to_uppercase(),
        name: id.to_string(),
        price: Decimal::from(100),
        market_cap: Decimal::from(1_000_000_000i64),
        volume_24h: Decimal::from(volume),
        change_1h: Some(0.0),
        change_24h: Some(change_24h),
        change_7d: Some(0.0),
        sparkline: Vec::new(),
        fetched_at: Utc::now(),
    }
}

/// Hourly series starting at [`epoch`], rising then falling
pub fn wave_series(hours: usize) -> Vec<PricePoint> {
    (0..hours)
        .map(|h| {
            let phase = (h as f64 / 12.0).sin();
            let price = 100.0 + 20.0 * phase + h as f64 * 0.1;
            PricePoint::new(
                epoch() + Duration::hours(h as i64),
                Decimal::try_from(price).unwrap().round_dp(4),
            )
        })
        .collect()
}

/// Source with a swappable universe and fixed histories
pub struct FixtureSource {
    universe: Mutex<Vec<AssetSnapshot>>,
}

impl FixtureSource {
    pub fn new(universe: Vec<AssetSnapshot>) -> Self {
        Self {
            universe: Mutex::new(universe),
        }
    }

    pub fn set_universe(&self, universe: Vec<AssetSnapshot>) {
        *self.universe.lock() = universe;
    }
}

#[async_trait]
impl MarketDataSource for FixtureSource {
    async fn fetch_universe(
        &self,
        page: u32,
        page_size: u32,
        _with_history: bool,
    ) -> Result<Vec<AssetSnapshot>, SourceError> {
        let start = ((page.max(1) - 1) * page_size) as usize;
        Ok(self
            .universe
            .lock()
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn fetch_history(&self, _asset_id: &str, days: u32) -> Result<Vec<PricePoint>, SourceError> {
        Ok(wave_series(days as usize * 24))
    }

    async fn fetch_venue_count(&self, _asset_id: &str) -> Result<u32, SourceError> {
        Ok(8)
    }
}

/// Defaults tuned for fast tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.source.synthetic_universe_size = 40;
    config.worker.page_pause_ms = 0;
    config.worker.page_size = 10;
    config.worker.fast_top_n = 10;
    config.broadcast.bind_addr = "127.0.0.1:0".to_string();
    config.telemetry.metrics_port = 0;
    config
}
