//! Live score broadcasting
//!
//! Clients connect over WebSocket, join the `top-n` channel by default and
//! may subscribe to `coin:{SYMBOL}` channels. Each tick pushes only the
//! entries whose score moved since the previous push.

mod connection;
mod manager;
pub mod server;
mod types;

pub use connection::{ChannelConnection, Connection, WsConnection};
pub use manager::{BroadcastManager, TickReport};
pub use types::{
    coin_channel, parse_channel, BroadcastError, ClientCommand, ConnectionId, ScoreUpdate,
    ServerMessage, TOP_N_CHANNEL,
};
