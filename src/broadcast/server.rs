//! WebSocket front end for the broadcast manager

use super::connection::WsConnection;
use super::manager::BroadcastManager;
use super::types::{ClientCommand, ConnectionId, ServerMessage};
use chrono::Utc;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Accept clients until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    manager: Arc<BroadcastManager>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "Broadcast server listening");
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(handle_client(stream, peer, Arc::clone(&manager)));
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("Broadcast server stopped");
                    return;
                }
            }
        }
    }
}

async fn handle_client(stream: TcpStream, peer: SocketAddr, manager: Arc<BroadcastManager>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let (sink, mut incoming) = ws_stream.split();
    let id = manager.register(Arc::new(WsConnection::new(sink)));

    while let Some(frame) = incoming.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let reply = handle_command(&manager, id, &text);
                if manager.send_to(id, &reply).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    manager.unregister(id);
}

/// Apply one client command and build the reply
pub fn handle_command(manager: &BroadcastManager, id: ConnectionId, text: &str) -> ServerMessage {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            return ServerMessage::Error {
                message: format!("invalid command: {}", e),
            }
        }
    };

    let outcome = match command {
        ClientCommand::Subscribe { channel } => manager
            .subscribe(id, &channel)
            .map(|channel| ServerMessage::Subscribed { channel }),
        ClientCommand::Unsubscribe { channel } => manager
            .unsubscribe(id, &channel)
            .map(|channel| ServerMessage::Unsubscribed { channel }),
        ClientCommand::Ping => Ok(ServerMessage::Pong {
            timestamp: Utc::now(),
        }),
    };

    outcome.unwrap_or_else(|e| ServerMessage::Error {
        message: e.to_string(),
    })
}
