//! Threshold alerting
//!
//! User-defined rules evaluated against each scored batch, with per-rule
//! rate limiting and independent delivery per channel.

mod channels;
mod manager;
mod types;

pub use channels::{EmailMessage, EmailOutbox, LogChannel, NotificationChannel, TelegramChannel};
pub use manager::AlertManager;
pub use types::{
    AlertError, AlertKind, AlertMessage, AlertRule, Channel, DispatchError, NewAlertRule,
};
