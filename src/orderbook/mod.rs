//! Order book module
//!
//! L2 depth snapshots used by the liquidity fusion adapter

mod book;

pub use book::OrderBook;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price level in the order book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price at this level
    pub price: Decimal,
    /// Total size available
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Quote-currency value resting at this level
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}
