//! Market data client
//!
//! Talks to a CoinGecko-shaped REST API in live mode and to the synthetic
//! generator otherwise. Every live request passes through the rate limiter
//! and the shared retry wrapper.

use super::{
    AssetSnapshot, MarketDataSource, PricePoint, RateLimiter, SourceError, SyntheticMarket,
};
use crate::config::{SourceConfig, SourceMode};
use crate::retry::{retry, RetryError};
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Instant;

/// Rate-limited, retrying market data client
pub struct MarketDataClient {
    config: SourceConfig,
    client: Client,
    limiter: RateLimiter,
    synthetic: SyntheticMarket,
}

impl MarketDataClient {
    /// Create a client from configuration
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("momentum-radar/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let limiter = RateLimiter::per_minute(config.requests_per_minute);
        let synthetic = SyntheticMarket::new(config.synthetic_universe_size);

        Ok(Self {
            config,
            client,
            limiter,
            synthetic,
        })
    }

    /// Create a client that never touches the network
    pub fn synthetic(universe_size: usize) -> Result<Self, SourceError> {
        Self::new(SourceConfig {
            mode: SourceMode::Synthetic,
            synthetic_universe_size: universe_size,
            ..Default::default()
        })
    }

    /// Current mode
    pub fn mode(&self) -> SourceMode {
        self.config.mode
    }

    /// GET a JSON document, throttled and retried
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let policy = self.config.retry_policy();

        retry(&policy, path, || async {
            self.limiter.acquire().await;
            self.request_once(path, query).await
        })
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts, last } => SourceError::SourceUnavailable {
                attempts,
                reason: last.to_string(),
            },
            RetryError::Fatal(e) => e,
        })
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut request = self.client.get(&url).query(query);
        if let Some(ref key) = self.config.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let started = Instant::now();
        telemetry::increment(CounterMetric::SourceRequests);
        let response = request.send().await?;
        telemetry::record_latency(LatencyMetric::SourceRequest, started.elapsed());

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(url = %url, "Market data source rate limited the request");
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MarketDataSource for MarketDataClient {
    async fn fetch_universe(
        &self,
        page: u32,
        page_size: u32,
        with_history: bool,
    ) -> Result<Vec<AssetSnapshot>, SourceError> {
        if self.config.mode == SourceMode::Synthetic {
            return Ok(self.synthetic.universe(page, page_size, with_history));
        }

        let query = [
            ("vs_currency", self.config.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", page_size.to_string()),
            ("page", page.max(1).to_string()),
            ("sparkline", with_history.to_string()),
            ("price_change_percentage", "1h,24h,7d".to_string()),
        ];
        let markets: Vec<MarketDto> = self.get_json("/coins/markets", &query).await?;

        tracing::debug!(page, count = markets.len(), "Fetched universe page");
        Ok(markets.into_iter().filter_map(MarketDto::into_snapshot).collect())
    }

    async fn fetch_history(
        &self,
        asset_id: &str,
        days: u32,
    ) -> Result<Vec<PricePoint>, SourceError> {
        if self.config.mode == SourceMode::Synthetic {
            return Ok(self.synthetic.history(asset_id, days, Utc::now()));
        }

        let query = [
            ("vs_currency", self.config.vs_currency.clone()),
            ("days", days.max(1).to_string()),
        ];
        let chart: MarketChartDto = self
            .get_json(&format!("/coins/{}/market_chart", asset_id), &query)
            .await?;

        Ok(chart.into_points())
    }

    async fn fetch_venue_count(&self, asset_id: &str) -> Result<u32, SourceError> {
        if self.config.mode == SourceMode::Synthetic {
            return Ok(self.synthetic.venue_count(asset_id));
        }

        let tickers: TickersDto = self
            .get_json(&format!("/coins/{}/tickers", asset_id), &[])
            .await?;
        Ok(tickers.venue_count())
    }
}

/// Row of the `/coins/markets` response
#[derive(Debug, Deserialize)]
struct MarketDto {
    id: String,
    symbol: String,
    name: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    price_change_percentage_1h_in_currency: Option<f64>,
    price_change_percentage_24h_in_currency: Option<f64>,
    price_change_percentage_7d_in_currency: Option<f64>,
    sparkline_in_7d: Option<SparklineDto>,
}

#[derive(Debug, Deserialize)]
struct SparklineDto {
    #[serde(default)]
    price: Vec<f64>,
}

impl MarketDto {
    /// Convert to a snapshot, dropping rows without a usable price
    fn into_snapshot(self) -> Option<AssetSnapshot> {
        let price = Decimal::try_from(self.current_price?).ok()?;
        let snapshot = AssetSnapshot {
            id: self.id,
            symbol: self.symbol.to_uppercase(),
            name: self.name,
            price,
            market_cap: decimal_or_zero(self.market_cap),
            volume_24h: decimal_or_zero(self.total_volume),
            change_1h: self.price_change_percentage_1h_in_currency,
            change_24h: self.price_change_percentage_24h_in_currency,
            change_7d: self.price_change_percentage_7d_in_currency,
            sparkline: self
                .sparkline_in_7d
                .map(|s| {
                    s.price
                        .into_iter()
                        .filter_map(|p| Decimal::try_from(p).ok())
                        .collect()
                })
                .unwrap_or_default(),
            fetched_at: Utc::now(),
        };

        match snapshot.validate() {
            Ok(()) => Some(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping invalid snapshot");
                None
            }
        }
    }
}

fn decimal_or_zero(value: Option<f64>) -> Decimal {
    value
        .and_then(|v| Decimal::try_from(v).ok())
        .unwrap_or(Decimal::ZERO)
}

/// `/coins/{id}/market_chart` response
#[derive(Debug, Deserialize)]
struct MarketChartDto {
    #[serde(default)]
    prices: Vec<[f64; 2]>,
}

impl MarketChartDto {
    fn into_points(self) -> Vec<PricePoint> {
        self.prices
            .into_iter()
            .filter_map(|[ts_ms, price]| {
                let timestamp = Utc.timestamp_millis_opt(ts_ms as i64).single()?;
                let price = Decimal::try_from(price).ok()?;
                Some(PricePoint::new(timestamp, price))
            })
            .collect()
    }
}

/// `/coins/{id}/tickers` response
#[derive(Debug, Deserialize)]
struct TickersDto {
    #[serde(default)]
    tickers: Vec<TickerDto>,
}

#[derive(Debug, Deserialize)]
struct TickerDto {
    market: TickerMarketDto,
}

#[derive(Debug, Deserialize)]
struct TickerMarketDto {
    identifier: String,
}

impl TickersDto {
    fn venue_count(&self) -> u32 {
        self.tickers
            .iter()
            .map(|t| t.market.identifier.as_str())
            .collect::<HashSet<_>>()
            .len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP server answering 429 to the first `throttled` requests
    /// and an empty JSON array afterwards
    async fn throttling_server(throttled: u32) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let hit = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let response = if hit <= throttled {
                    "HTTP/1.1 429 Too Many Requests\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                } else {
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n[]"
                };
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn live_config(base_url: String, max_attempts: u32) -> SourceConfig {
        SourceConfig {
            mode: SourceMode::Live,
            base_url,
            max_attempts,
            initial_backoff_ms: 20,
            max_backoff_ms: 100,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_market_dto_conversion() {
        let json = r#"{
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "current_price": 65000.5,
            "market_cap": 1280000000000,
            "total_volume": 31000000000,
            "price_change_percentage_1h_in_currency": 0.25,
            "price_change_percentage_24h_in_currency": -1.5,
            "price_change_percentage_7d_in_currency": null,
            "sparkline_in_7d": { "price": [64000.0, 64500.0, 65000.5] }
        }"#;

        let dto: MarketDto = serde_json::from_str(json).unwrap();
        let snapshot = dto.into_snapshot().unwrap();
        assert_eq!(snapshot.symbol, "BTC");
        assert_eq!(snapshot.price, dec!(65000.5));
        assert_eq!(snapshot.change_24h, Some(-1.5));
        assert!(snapshot.change_7d.is_none());
        assert_eq!(snapshot.sparkline.len(), 3);
    }

    #[test]
    fn test_market_dto_without_price_is_dropped() {
        let json = r#"{"id": "ghost", "symbol": "gst", "name": "Ghost", "current_price": null,
            "market_cap": null, "total_volume": null,
            "price_change_percentage_1h_in_currency": null,
            "price_change_percentage_24h_in_currency": null,
            "price_change_percentage_7d_in_currency": null}"#;
        let dto: MarketDto = serde_json::from_str(json).unwrap();
        assert!(dto.into_snapshot().is_none());
    }

    #[test]
    fn test_market_chart_points() {
        let json = r#"{"prices": [[1704067200000, 42000.0], [1704070800000, 42100.5]]}"#;
        let chart: MarketChartDto = serde_json::from_str(json).unwrap();
        let points = chart.into_points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].price, dec!(42100.5));
        assert!(points[0].timestamp < points[1].timestamp);
    }

    #[test]
    fn test_ticker_venues_are_deduplicated() {
        let json = r#"{"tickers": [
            {"market": {"identifier": "binance"}},
            {"market": {"identifier": "binance"}},
            {"market": {"identifier": "kraken"}}
        ]}"#;
        let tickers: TickersDto = serde_json::from_str(json).unwrap();
        assert_eq!(tickers.venue_count(), 2);
    }

    #[tokio::test]
    async fn test_synthetic_mode_bypasses_network() {
        let client = MarketDataClient::synthetic(30).unwrap();
        assert_eq!(client.mode(), SourceMode::Synthetic);

        let page = client.fetch_universe(1, 10, true).await.unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].id, "bitcoin");

        let history = client.fetch_history("bitcoin", 2).await.unwrap();
        assert_eq!(history.len(), 48);

        let venues = client.fetch_venue_count("bitcoin").await.unwrap();
        assert!(venues >= 1);
    }

    #[tokio::test]
    async fn test_unreachable_live_source_reports_unavailable() {
        let client = MarketDataClient::new(SourceConfig {
            mode: SourceMode::Live,
            base_url: "http://127.0.0.1:9".to_string(),
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            timeout_secs: 1,
            ..Default::default()
        })
        .unwrap();

        let result = client.fetch_universe(1, 5, false).await;
        assert!(matches!(
            result,
            Err(SourceError::SourceUnavailable { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_requests_back_off_until_exhausted() {
        let (base_url, hits) = throttling_server(u32::MAX).await;
        let client = MarketDataClient::new(live_config(base_url, 3)).unwrap();

        let started = Instant::now();
        let result = client.fetch_universe(1, 5, false).await;

        match result {
            Err(SourceError::SourceUnavailable { attempts, reason }) => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("Rate limited"));
            }
            other => panic!("expected SourceUnavailable, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        // Backoff of 20ms then 40ms between the three attempts
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_rate_limited_request_recovers_on_retry() {
        let (base_url, hits) = throttling_server(2).await;
        let client = MarketDataClient::new(live_config(base_url, 5)).unwrap();

        let page = client.fetch_universe(1, 5, false).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
