//! Broadcast wire types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Connection identifier
pub type ConnectionId = Uuid;

/// Channel every connection joins on registration
pub const TOP_N_CHANNEL: &str = "top-n";

const COIN_PREFIX: &str = "coin:";

/// Per-asset channel name, e.g. `coin:BTC`
pub fn coin_channel(symbol: &str) -> String {
    format!("{}{}", COIN_PREFIX, symbol.trim().to_uppercase())
}

/// Canonical form of a channel name, or `None` if it is not one we serve
pub fn parse_channel(name: &str) -> Option<String> {
    let name = name.trim();
    if name == TOP_N_CHANNEL {
        return Some(name.to_string());
    }
    let symbol = name.strip_prefix(COIN_PREFIX)?.trim();
    if symbol.is_empty() {
        return None;
    }
    Some(coin_channel(symbol))
}

/// One changed ranking entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub asset_id: String,
    pub symbol: String,
    /// 1-based position in the broadcast top-N
    pub rank: usize,
    pub score: f64,
    pub confidence: f64,
    /// Change since the last push; `None` on first appearance
    pub delta: Option<f64>,
}

/// Messages pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Update {
        channel: String,
        data: Vec<ScoreUpdate>,
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
    Subscribed {
        channel: String,
    },
    Unsubscribed {
        channel: String,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, BroadcastError> {
        serde_json::to_string(self).map_err(|e| BroadcastError::Encode(e.to_string()))
    }
}

/// Commands accepted from clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Ping,
}

/// Broadcast errors
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("Invalid channel {0:?}")]
    InvalidChannel(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    Closed,

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel() {
        assert_eq!(parse_channel("top-n").as_deref(), Some("top-n"));
        assert_eq!(parse_channel(" coin:btc ").as_deref(), Some("coin:BTC"));
        assert_eq!(parse_channel("coin:"), None);
        assert_eq!(parse_channel("news"), None);
    }

    #[test]
    fn test_client_command_json() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type": "subscribe", "channel": "coin:eth"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Subscribe {
                channel: "coin:eth".to_string()
            }
        );
        let ping: ClientCommand = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert_eq!(ping, ClientCommand::Ping);
    }

    #[test]
    fn test_server_message_is_tagged() {
        let json = ServerMessage::Subscribed {
            channel: "top-n".to_string(),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"subscribed","channel":"top-n"}"#);
    }
}
