//! Transport module
//!
//! A transport drives one duplex socket and reports its lifecycle through a
//! [`LinkEndpoint`]. The connection manager keeps the matching [`Link`] to
//! send frames and observe the socket's live state.

#[cfg(test)]
pub(crate) mod mock;
mod websocket;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

pub use websocket::*;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Transport closed")]
    Closed,
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Close code reported when the socket drops without a close handshake
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Live state of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Details of a closed socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code, if the peer sent one
    pub code: Option<u16>,
    /// Close reason text (may be empty)
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Close without a handshake
    pub fn abnormal() -> Self {
        Self::new(Some(ABNORMAL_CLOSE_CODE), "")
    }
}

/// Lifecycle signal reported by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Socket is open and ready for frames
    Opened,
    /// A text frame arrived
    Frame(String),
    /// Socket closed; always the last event of a link
    Closed(CloseInfo),
    /// Socket reported an error; a `Closed` usually follows
    Errored(String),
}

/// Instruction from the manager to the socket task
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCommand {
    /// Transmit a text frame
    Send(String),
    /// Start the close handshake
    Close,
}

/// Manager-side handle to one socket
#[derive(Debug)]
pub struct Link {
    commands: mpsc::UnboundedSender<LinkCommand>,
    state: Arc<AtomicU8>,
}

impl Link {
    /// Current live state of the socket
    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Queue a text frame for transmission
    pub fn send_text(&self, text: String) -> TransportResult<()> {
        self.commands
            .send(LinkCommand::Send(text))
            .map_err(|_| TransportError::Closed)
    }

    /// Ask the socket to close.
    ///
    /// The link reports `Closing` from here on, so nothing more is queued
    /// behind the close command.
    pub fn close(&self) {
        let state = match self.commands.send(LinkCommand::Close) {
            Ok(()) => ReadyState::Closing,
            // Socket task already gone; nothing left to close
            Err(_) => ReadyState::Closed,
        };
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Socket-side half of a link, handed to a [`Connector`]
#[derive(Debug)]
pub struct LinkEndpoint {
    commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: Arc<AtomicU8>,
}

impl LinkEndpoint {
    /// Report a lifecycle event, updating the shared ready state.
    ///
    /// Returns `false` once the manager no longer listens to this link.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match &event {
            TransportEvent::Opened => self.set_state(ReadyState::Open),
            TransportEvent::Closed(_) => self.set_state(ReadyState::Closed),
            _ => {}
        }
        self.events.send(event).is_ok()
    }

    /// Update the shared ready state
    pub fn set_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Current ready state
    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Wait for the next command; `None` once every [`Link`] is dropped
    pub async fn next_command(&mut self) -> Option<LinkCommand> {
        self.commands.recv().await
    }

    /// Take a queued command without waiting
    pub fn try_next_command(&mut self) -> Option<LinkCommand> {
        self.commands.try_recv().ok()
    }
}

/// Create a connected [`Link`] / [`LinkEndpoint`] pair in the `Connecting` state
pub fn link_pair(events: mpsc::UnboundedSender<TransportEvent>) -> (Link, LinkEndpoint) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));

    let link = Link {
        commands: commands_tx,
        state: Arc::clone(&state),
    };
    let endpoint = LinkEndpoint {
        commands: commands_rx,
        events,
        state,
    };
    (link, endpoint)
}

/// Opens duplex sockets
pub trait Connector: Send + Sync + 'static {
    /// Start opening a socket to `url`.
    ///
    /// Must return immediately; all outcomes, including a failed connect, are
    /// reported through `endpoint`.
    fn open(&self, url: &str, endpoint: LinkEndpoint);
}
