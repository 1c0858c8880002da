//! SDL agent chat client
//!
//! Keeps one WebSocket connection to a chat server alive (reconnecting with
//! exponential backoff, pinging on a heartbeat) and routes the server's JSON
//! envelopes to listeners registered per message type.

pub mod client;
pub mod config;
pub mod console;
pub mod protocol;
pub mod transport;

pub use client::{
    ClientError, ClientResult, ConnStatus, ConnectionEvent, ConnectionEventKind,
    ConnectionManager, ListenerId,
};
pub use config::ClientConfig;
pub use protocol::{Envelope, MessageType};
