//! Cache and rank store
//!
//! A key-value store with hashes, sorted sets, TTLs and counters, plus a
//! typed facade for scored results. The store is the single source of
//! truth read by every consumer.

mod memory;
mod scores;

pub use memory::MemoryStore;
pub use scores::ScoreCache;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Key holds a value of another type
    #[error("Wrong type for key {0}")]
    WrongType(String),

    #[error("Failed to encode value: {0}")]
    Encode(String),

    #[error("Failed to decode value for {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// A write applied as part of an atomic batch
#[derive(Debug, Clone)]
pub enum CacheOp {
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    HSet {
        key: String,
        fields: HashMap<String, String>,
        ttl: Option<Duration>,
    },
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    ZRem {
        key: String,
        member: String,
    },
    Incr {
        key: String,
        by: i64,
    },
    Del {
        key: String,
    },
}

impl CacheOp {
    /// Key the op writes to
    pub fn key(&self) -> &str {
        match self {
            CacheOp::Set { key, .. }
            | CacheOp::HSet { key, .. }
            | CacheOp::ZAdd { key, .. }
            | CacheOp::ZRem { key, .. }
            | CacheOp::Incr { key, .. }
            | CacheOp::Del { key } => key,
        }
    }
}

/// Capability set of the shared cache service
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// All fields of a hash; empty when missing
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError>;

    /// Merge fields into a hash and reset its TTL
    async fn hset(
        &self,
        key: &str,
        fields: HashMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Add or update a sorted-set member
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError>;

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    /// Members by descending score, `start..=stop` inclusive
    async fn zrevrange(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, f64)>, CacheError>;

    async fn zcard(&self, key: &str) -> Result<usize, CacheError>;

    /// Atomically add `by` to a counter, returning the new value
    async fn incr(&self, key: &str, by: i64) -> Result<i64, CacheError>;

    async fn del(&self, key: &str) -> Result<bool, CacheError>;

    /// Apply every op or none; readers never observe a partial batch
    async fn exec(&self, ops: Vec<CacheOp>) -> Result<(), CacheError>;
}
