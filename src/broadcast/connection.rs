//! Outbound connection transports

use super::types::BroadcastError;
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Something text frames can be pushed to
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), BroadcastError>;
}

/// In-process connection backed by an mpsc channel
pub struct ChannelConnection {
    tx: mpsc::Sender<String>,
}

impl ChannelConnection {
    /// Create a connection and the receiver that observes its traffic
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    async fn send(&self, text: &str) -> Result<(), BroadcastError> {
        self.tx
            .send(text.to_string())
            .await
            .map_err(|_| BroadcastError::Closed)
    }
}

/// Write half of an accepted WebSocket
pub struct WsConnection {
    sink: Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>,
}

impl WsConnection {
    pub fn new(sink: SplitSink<WebSocketStream<TcpStream>, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&self, text: &str) -> Result<(), BroadcastError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| BroadcastError::SendFailed(e.to_string()))
    }
}
