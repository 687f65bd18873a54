//! momentum-radar: explainable crypto momentum scoring
//!
//! This library provides the core components for:
//! - Rate-limited market data ingestion with a synthetic fallback
//! - Technical features and auxiliary signal fusion
//! - Weighted, explainable composite scoring
//! - Cached ranking, rank tracking and behavioral clustering
//! - Threshold alerts over Telegram, email and logs
//! - Scheduled scoring cycles and live WebSocket broadcasting
//! - Proxy-score backtesting
//! - Structured logging and Prometheus metrics

pub mod alert;
pub mod app;
pub mod backtest;
pub mod broadcast;
pub mod cache;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod features;
pub mod fusion;
pub mod orderbook;
pub mod rank;
pub mod retry;
pub mod scoring;
pub mod service;
pub mod source;
pub mod telemetry;
pub mod worker;
