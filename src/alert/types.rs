//! Alert types

use crate::retry::Retryable;
use crate::scoring::ScoredResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Condition a rule checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ScoreAbove,
    ScoreBelow,
    PriceAbove,
    PriceBelow,
    /// Whale confidence at or above the threshold
    WhaleSeen,
    PredictiveTrendAbove,
}

impl AlertKind {
    /// Value the rule compares against its threshold
    pub fn observed(&self, result: &ScoredResult) -> f64 {
        match self {
            AlertKind::ScoreAbove | AlertKind::ScoreBelow => result.score,
            AlertKind::PriceAbove | AlertKind::PriceBelow => result.price_f64(),
            AlertKind::WhaleSeen => result.signals.whale_confidence,
            AlertKind::PredictiveTrendAbove => result.signals.trend_probability,
        }
    }

    /// Whether `observed` satisfies the rule
    pub fn matches(&self, observed: f64, threshold: f64) -> bool {
        match self {
            AlertKind::ScoreAbove | AlertKind::PriceAbove | AlertKind::PredictiveTrendAbove => {
                observed > threshold
            }
            AlertKind::ScoreBelow | AlertKind::PriceBelow => observed < threshold,
            AlertKind::WhaleSeen => observed >= threshold,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            AlertKind::ScoreAbove => "score rose above",
            AlertKind::ScoreBelow => "score fell below",
            AlertKind::PriceAbove => "price rose above",
            AlertKind::PriceBelow => "price fell below",
            AlertKind::WhaleSeen => "whale confidence reached",
            AlertKind::PredictiveTrendAbove => "trend probability rose above",
        }
    }
}

/// Delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Telegram,
    Email,
    Log,
}

/// Request to create a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlertRule {
    /// Chat id, handle or email address
    pub contact: String,
    pub symbol: String,
    pub kind: AlertKind,
    pub threshold: f64,
    pub channels: Vec<Channel>,
}

/// A stored alert rule with its trigger bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub contact: String,
    /// Upper-case symbol
    pub symbol: String,
    pub kind: AlertKind,
    pub threshold: f64,
    pub channels: Vec<Channel>,
    pub last_triggered: Option<DateTime<Utc>>,
    pub trigger_count: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl AlertRule {
    /// Validate a request and build the rule
    pub fn from_request(request: NewAlertRule, now: DateTime<Utc>) -> Result<Self, AlertError> {
        if request.contact.trim().is_empty() {
            return Err(AlertError::EmptyContact);
        }
        if request.symbol.trim().is_empty() {
            return Err(AlertError::EmptySymbol);
        }
        if request.channels.is_empty() {
            return Err(AlertError::NoChannels);
        }
        if !request.threshold.is_finite() {
            return Err(AlertError::InvalidThreshold(request.threshold));
        }

        let mut seen = HashSet::new();
        let mut channels = request.channels;
        channels.retain(|c| seen.insert(*c));

        Ok(Self {
            id: Uuid::new_v4(),
            contact: request.contact.trim().to_string(),
            symbol: request.symbol.trim().to_uppercase(),
            kind: request.kind,
            threshold: request.threshold,
            channels,
            last_triggered: None,
            trigger_count: 0,
            active: true,
            created_at: now,
        })
    }

    /// True while inside the rate-limit window of the last trigger
    pub fn is_rate_limited(&self, now: DateTime<Utc>, rate_limit: chrono::Duration) -> bool {
        self.last_triggered
            .is_some_and(|last| now - last < rate_limit)
    }
}

/// A triggered alert ready for delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    pub rule_id: Uuid,
    pub contact: String,
    pub symbol: String,
    pub kind: AlertKind,
    pub threshold: f64,
    pub observed: f64,
    pub text: String,
    pub triggered_at: DateTime<Utc>,
}

impl AlertMessage {
    pub fn new(rule: &AlertRule, result: &ScoredResult, observed: f64, now: DateTime<Utc>) -> Self {
        let text = format!(
            "{} ({}) {} {}: now {:.4} | score {:.1}, confidence {:.0}",
            result.symbol,
            result.name,
            rule.kind.describe(),
            rule.threshold,
            observed,
            result.score,
            result.confidence,
        );

        Self {
            rule_id: rule.id,
            contact: rule.contact.clone(),
            symbol: rule.symbol.clone(),
            kind: rule.kind,
            threshold: rule.threshold,
            observed,
            text,
            triggered_at: now,
        }
    }
}

/// Rule management errors
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Contact must not be empty")]
    EmptyContact,

    #[error("Symbol must not be empty")]
    EmptySymbol,

    #[error("At least one channel is required")]
    NoChannels,

    #[error("Invalid threshold {0}")]
    InvalidThreshold(f64),

    #[error("Unknown alert rule {0}")]
    UnknownRule(Uuid),
}

/// Delivery failure on one channel
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Channel {0:?} is not configured")]
    NotConfigured(Channel),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected status {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Outbox full ({0} messages)")]
    QueueFull(usize),
}

impl Retryable for DispatchError {
    fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Transport(_) => true,
            DispatchError::Status(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        DispatchError::Transport(e.to_string())
    }
}
