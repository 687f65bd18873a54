//! Notification channels

use super::types::{AlertMessage, Channel, DispatchError};
use crate::config::{EmailConfig, TelegramConfig};
use crate::retry::{retry, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// A delivery transport for triggered alerts
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Which channel this transport serves
    fn channel(&self) -> Channel;

    /// Deliver one alert
    async fn send(&self, alert: &AlertMessage) -> Result<(), DispatchError>;
}

fn dispatch_retry() -> RetryPolicy {
    RetryPolicy::default()
        .max_attempts(3)
        .initial_delay(Duration::from_millis(250))
        .max_delay(Duration::from_secs(2))
}

/// Push delivery through the Telegram Bot API
pub struct TelegramChannel {
    client: Client,
    config: TelegramConfig,
    policy: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Result<Self, DispatchError> {
        Ok(Self {
            client: Client::builder().build()?,
            config,
            policy: dispatch_retry(),
        })
    }

    /// Chat to deliver to: the contact when it looks like a chat id or
    /// handle, otherwise the configured default chat
    fn chat_for<'a>(&'a self, contact: &'a str) -> Option<&'a str> {
        let is_chat = contact.parse::<i64>().is_ok() || contact.starts_with('@');
        if is_chat {
            Some(contact)
        } else {
            self.config.chat_id.as_deref()
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), DispatchError> {
        let chat_id = self
            .chat_for(&alert.contact)
            .ok_or(DispatchError::NotConfigured(Channel::Telegram))?;
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token
        );
        let body = SendMessage {
            chat_id,
            text: &alert.text,
        };

        retry(&self.policy, "telegram", || async {
            let response = self.client.post(&url).json(&body).send().await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(DispatchError::Status(status.as_u16()))
            }
        })
        .await
        .map_err(|e| e.into_inner())
    }
}

/// Queued email awaiting relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub queued_at: DateTime<Utc>,
}

/// Store-and-forward email delivery
///
/// Messages are queued first and flushed to the HTTP relay when one is
/// configured. Without a relay they stay queued until drained.
pub struct EmailOutbox {
    client: Client,
    config: EmailConfig,
    queue: Mutex<VecDeque<EmailMessage>>,
}

impl EmailOutbox {
    pub fn new(config: EmailConfig) -> Result<Self, DispatchError> {
        Ok(Self {
            client: Client::builder().build()?,
            config,
            queue: Mutex::new(VecDeque::new()),
        })
    }

    /// Messages waiting for the relay
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Take every queued message
    pub fn drain(&self) -> Vec<EmailMessage> {
        self.queue.lock().drain(..).collect()
    }

    fn enqueue(&self, message: EmailMessage) -> Result<(), DispatchError> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.config.max_queue {
            return Err(DispatchError::QueueFull(queue.len()));
        }
        queue.push_back(message);
        Ok(())
    }

    /// Forward queued messages to the relay, oldest first
    ///
    /// Stops at the first failure and keeps the rest queued. Returns how
    /// many messages were delivered.
    pub async fn flush(&self) -> Result<usize, DispatchError> {
        let Some(relay) = self.config.relay_url.as_deref() else {
            return Ok(0);
        };

        let mut delivered = 0;
        loop {
            let Some(message) = self.queue.lock().pop_front() else {
                return Ok(delivered);
            };

            let outcome = self.client.post(relay).json(&message).send().await;
            let failure = match outcome {
                Ok(response) if response.status().is_success() => None,
                Ok(response) => Some(DispatchError::Status(response.status().as_u16())),
                Err(e) => Some(DispatchError::from(e)),
            };

            if let Some(e) = failure {
                self.queue.lock().push_front(message);
                return Err(e);
            }
            delivered += 1;
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailOutbox {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), DispatchError> {
        self.enqueue(EmailMessage {
            from: self.config.from.clone(),
            to: alert.contact.clone(),
            subject: format!("Momentum alert: {}", alert.symbol),
            body: alert.text.clone(),
            queued_at: alert.triggered_at,
        })?;
        self.flush().await.map(|_| ())
    }
}

/// Writes alerts to the structured log
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn channel(&self) -> Channel {
        Channel::Log
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), DispatchError> {
        tracing::info!(
            rule = %alert.rule_id,
            contact = %alert.contact,
            symbol = %alert.symbol,
            observed = alert.observed,
            "{}",
            alert.text
        );
        Ok(())
    }
}
