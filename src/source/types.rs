//! Market data types

use crate::retry::Retryable;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One market data observation for an asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSnapshot {
    /// Provider identifier (e.g., "bitcoin")
    pub id: String,
    /// Ticker symbol, upper case
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Current price in quote currency
    pub price: Decimal,
    /// Market capitalization
    pub market_cap: Decimal,
    /// Traded volume over the last 24h
    pub volume_24h: Decimal,
    /// Percentage price change over 1h
    pub change_1h: Option<f64>,
    /// Percentage price change over 24h
    pub change_24h: Option<f64>,
    /// Percentage price change over 7d
    pub change_7d: Option<f64>,
    /// Short hourly price history, oldest first
    #[serde(default)]
    pub sparkline: Vec<Decimal>,
    /// When the snapshot was fetched
    pub fetched_at: DateTime<Utc>,
}

impl AssetSnapshot {
    /// Reject snapshots that cannot be scored
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.id.trim().is_empty() || self.symbol.trim().is_empty() {
            return Err(SourceError::Invalid("missing id or symbol".to_string()));
        }
        if self.price <= Decimal::ZERO {
            return Err(SourceError::Invalid(format!(
                "{}: non-positive price {}",
                self.id, self.price
            )));
        }
        if self.market_cap < Decimal::ZERO || self.volume_24h < Decimal::ZERO {
            return Err(SourceError::Invalid(format!(
                "{}: negative market cap or volume",
                self.id
            )));
        }
        Ok(())
    }

    pub fn price_f64(&self) -> f64 {
        to_f64(self.price)
    }

    pub fn market_cap_f64(&self) -> f64 {
        to_f64(self.market_cap)
    }

    pub fn volume_f64(&self) -> f64 {
        to_f64(self.volume_24h)
    }

    /// Sparkline as floats
    pub fn sparkline_f64(&self) -> Vec<f64> {
        self.sparkline.iter().map(|p| to_f64(*p)).collect()
    }
}

/// A historical price observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self { timestamp, price }
    }
}

/// Convert a decimal to f64, falling back to zero
pub fn to_f64(value: Decimal) -> f64 {
    f64::try_from(value).unwrap_or(0.0)
}

/// Market data source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Rate limited by market data source")]
    RateLimited,

    #[error("Market data source unavailable after {attempts} attempts: {reason}")]
    SourceUnavailable { attempts: u32, reason: String },

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid snapshot: {0}")]
    Invalid(String),
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        match self {
            SourceError::RateLimited | SourceError::Transport(_) => true,
            SourceError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> AssetSnapshot {
        AssetSnapshot {
            id: "bitcoin".to_string(),
            symbol: "BTC".to_string(),
            name: "Bitcoin".to_string(),
            price: dec!(65000),
            market_cap: dec!(1280000000000),
            volume_24h: dec!(30000000000),
            change_1h: Some(0.4),
            change_24h: Some(2.1),
            change_7d: None,
            sparkline: vec![dec!(64000), dec!(65000)],
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_snapshot() {
        assert!(snapshot().validate().is_ok());
    }

    #[test]
    fn test_zero_price_rejected() {
        let mut s = snapshot();
        s.price = Decimal::ZERO;
        assert!(matches!(s.validate(), Err(SourceError::Invalid(_))));
    }

    #[test]
    fn test_missing_symbol_rejected() {
        let mut s = snapshot();
        s.symbol = " ".to_string();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_float_accessors() {
        let s = snapshot();
        assert_eq!(s.price_f64(), 65000.0);
        assert_eq!(s.sparkline_f64(), vec![64000.0, 65000.0]);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SourceError::RateLimited.is_retryable());
        assert!(SourceError::Transport("reset".into()).is_retryable());
        assert!(SourceError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!SourceError::Status {
            status: 404,
            body: String::new()
        }
        .is_retryable());
        assert!(!SourceError::Decode("bad".into()).is_retryable());
    }

    #[test]
    fn test_unavailable_display() {
        let err = SourceError::SourceUnavailable {
            attempts: 5,
            reason: "Rate limited by market data source".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Market data source unavailable after 5 attempts: Rate limited by market data source"
        );
    }
}
