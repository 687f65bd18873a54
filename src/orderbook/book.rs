//! Order book state and depth measures

use super::PriceLevel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// L2 aggregated order book for an exchange symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    /// Exchange symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Bid levels, sorted best (highest) to worst
    pub bids: Vec<PriceLevel>,
    /// Ask levels, sorted best (lowest) to worst
    pub asks: Vec<PriceLevel>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: vec![],
            asks: vec![],
            updated_at: Utc::now(),
        }
    }

    /// Build a book from unsorted levels, dropping empty ones
    pub fn from_levels(
        symbol: impl Into<String>,
        mut bids: Vec<PriceLevel>,
        mut asks: Vec<PriceLevel>,
    ) -> Self {
        bids.retain(|l| l.size > Decimal::ZERO && l.price > Decimal::ZERO);
        asks.retain(|l| l.size > Decimal::ZERO && l.price > Decimal::ZERO);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Self {
            symbol: symbol.into(),
            bids,
            asks,
            updated_at: Utc::now(),
        }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Get spread
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Bid and ask notional resting within `pct` of mid (0.02 = ±2%)
    pub fn depth_within(&self, pct: Decimal) -> Option<(Decimal, Decimal)> {
        let mid = self.mid_price()?;
        let floor = mid * (Decimal::ONE - pct);
        let ceiling = mid * (Decimal::ONE + pct);

        let bid_depth = self
            .bids
            .iter()
            .take_while(|l| l.price >= floor)
            .map(PriceLevel::notional)
            .sum();
        let ask_depth = self
            .asks
            .iter()
            .take_while(|l| l.price <= ceiling)
            .map(PriceLevel::notional)
            .sum();

        Some((bid_depth, ask_depth))
    }

    /// Total notional within `pct` of mid
    pub fn total_depth(&self, pct: Decimal) -> Option<Decimal> {
        self.depth_within(pct).map(|(bid, ask)| bid + ask)
    }

    /// `(bid - ask) / (bid + ask)` within `pct` of mid, in [-1, 1]
    pub fn imbalance(&self, pct: Decimal) -> Option<Decimal> {
        let (bid, ask) = self.depth_within(pct)?;
        let total = bid + ask;
        if total.is_zero() {
            return None;
        }
        Some((bid - ask) / total)
    }
}
