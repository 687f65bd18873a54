//! Alert rule registry and dispatch

use super::channels::NotificationChannel;
use super::types::{AlertError, AlertMessage, AlertRule, Channel, DispatchError, NewAlertRule};
use crate::config::AlertConfig;
use crate::scoring::ScoredResult;
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Holds alert rules and fans triggered alerts out to their channels
pub struct AlertManager {
    rules: RwLock<IndexMap<Uuid, AlertRule>>,
    channels: HashMap<Channel, Arc<dyn NotificationChannel>>,
    rate_limit: chrono::Duration,
    dispatch_timeout: Duration,
}

impl AlertManager {
    pub fn new(config: &AlertConfig, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        let channels = channels.into_iter().map(|c| (c.channel(), c)).collect();
        Self {
            rules: RwLock::new(IndexMap::new()),
            channels,
            rate_limit: chrono::Duration::seconds(config.rate_limit_secs),
            dispatch_timeout: Duration::from_secs(config.dispatch_timeout_secs),
        }
    }

    /// Validate and store a rule
    pub fn create_rule(&self, request: NewAlertRule) -> Result<Uuid, AlertError> {
        let rule = AlertRule::from_request(request, Utc::now())?;
        let id = rule.id;

        tracing::info!(
            rule = %id,
            symbol = %rule.symbol,
            kind = ?rule.kind,
            threshold = rule.threshold,
            "Alert rule created"
        );

        self.rules.write().insert(id, rule);
        telemetry::set_gauge(GaugeMetric::ActiveAlertRules, self.active_count() as f64);
        Ok(id)
    }

    /// Every rule, in creation order
    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().values().cloned().collect()
    }

    /// Rules registered by one contact
    pub fn rules_for(&self, contact: &str) -> Vec<AlertRule> {
        let contact = contact.trim();
        self.rules
            .read()
            .values()
            .filter(|r| r.contact == contact)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<AlertRule> {
        self.rules.read().get(&id).cloned()
    }

    /// Stop a rule from firing; it stays listed
    pub fn deactivate(&self, id: Uuid) -> Result<(), AlertError> {
        {
            let mut rules = self.rules.write();
            let rule = rules.get_mut(&id).ok_or(AlertError::UnknownRule(id))?;
            rule.active = false;
        }
        telemetry::set_gauge(GaugeMetric::ActiveAlertRules, self.active_count() as f64);
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.rules.read().values().filter(|r| r.active).count()
    }

    /// Evaluate every active rule against the batch and dispatch matches
    ///
    /// Trigger bookkeeping is updated before delivery, so a rule counts as
    /// fired even when every channel fails. Returns the fired alerts.
    pub async fn check_alerts(
        &self,
        results: &[ScoredResult],
        now: DateTime<Utc>,
    ) -> Vec<AlertMessage> {
        let by_symbol: HashMap<String, &ScoredResult> = results
            .iter()
            .map(|r| (r.symbol.to_uppercase(), r))
            .collect();

        let fired: Vec<(AlertMessage, Vec<Channel>)> = {
            let mut rules = self.rules.write();
            rules
                .values_mut()
                .filter(|rule| rule.active && !rule.is_rate_limited(now, self.rate_limit))
                .filter_map(|rule| {
                    let result = by_symbol.get(&rule.symbol)?;
                    let observed = rule.kind.observed(result);
                    if !rule.kind.matches(observed, rule.threshold) {
                        return None;
                    }

                    rule.last_triggered = Some(now);
                    rule.trigger_count += 1;
                    let message = AlertMessage::new(rule, result, observed, now);
                    Some((message, rule.channels.clone()))
                })
                .collect()
        };

        if fired.is_empty() {
            return Vec::new();
        }

        let deliveries = fired.iter().flat_map(|(message, channels)| {
            channels
                .iter()
                .map(move |channel| self.deliver(*channel, message))
        });
        let failures = join_all(deliveries)
            .await
            .into_iter()
            .filter(|ok| !ok)
            .count();

        telemetry::increment_by(CounterMetric::AlertsTriggered, fired.len() as u64);
        tracing::info!(
            triggered = fired.len(),
            failed_deliveries = failures,
            "Alert check complete"
        );

        fired.into_iter().map(|(message, _)| message).collect()
    }

    /// Deliver on one channel under the dispatch timeout; false on failure
    async fn deliver(&self, channel: Channel, message: &AlertMessage) -> bool {
        let outcome = match self.channels.get(&channel) {
            Some(transport) => {
                match tokio::time::timeout(self.dispatch_timeout, transport.send(message)).await {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError::Timeout(self.dispatch_timeout)),
                }
            }
            None => Err(DispatchError::NotConfigured(channel)),
        };

        match outcome {
            Ok(()) => true,
            Err(e) => {
                telemetry::increment(CounterMetric::AlertDispatchFailures);
                tracing::warn!(
                    rule = %message.rule_id,
                    channel = ?channel,
                    error = %e,
                    "Alert dispatch failed"
                );
                false
            }
        }
    }
}
