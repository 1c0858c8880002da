//! Connection manager
//!
//! Owns the current socket, reconnects with exponential backoff after a close,
//! keeps the link alive with heartbeat pings and routes inbound envelopes to
//! registered listeners.
//!
//! Every `connect()` starts a new generation. Events are only honoured for the
//! latest generation, so a superseded socket can never reach listeners.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::heartbeat::{spawn_heartbeat, HeartbeatTick};
use super::reconnect::ReconnectState;
use super::registry::{
    CallbackRegistry, ConnectionCallback, ConnectionEvent, ConnectionEventKind, ListenerId,
    MessageCallback,
};
use crate::config::ClientConfig;
use crate::protocol::{
    Envelope, HumanInputResponse, MessageType, Payload, Ping, ProtocolError, UserMessage,
};
use crate::transport::{
    link_pair, CloseInfo, Connector, Link, ReadyState, TransportError, TransportEvent,
    WebSocketConnector,
};

/// Errors that can occur while sending
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket is not connected")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Coarse connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    /// No socket, or the last one closed
    Disconnected,
    /// A socket is being opened
    Connecting,
    /// Connected and ready to send
    Open,
}

/// Mutable connection bookkeeping, guarded by one lock
struct ConnectionState {
    generation: u64,
    connected: bool,
    link: Option<Link>,
    reconnect: ReconnectState,
    reconnect_timer: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    disconnect_requested: bool,
}

impl ConnectionState {
    fn stop_heartbeat(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
    }
}

struct Shared {
    config: ClientConfig,
    connector: Box<dyn Connector>,
    state: Mutex<ConnectionState>,
    registry: RwLock<CallbackRegistry>,
}

/// Real-time chat connection with typed event routing.
///
/// Cheap to clone; all clones share one connection. Requires a Tokio runtime
/// for `connect()` and everything it schedules.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager that connects over WebSocket
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, WebSocketConnector::new())
    }

    /// Create a manager with a custom transport
    pub fn with_connector(config: ClientConfig, connector: impl Connector) -> Self {
        let reconnect = ReconnectState::new(config.reconnect.clone());
        Self {
            shared: Arc::new(Shared {
                config,
                connector: Box::new(connector),
                state: Mutex::new(ConnectionState {
                    generation: 0,
                    connected: false,
                    link: None,
                    reconnect,
                    reconnect_timer: None,
                    heartbeat: None,
                    disconnect_requested: false,
                }),
                registry: RwLock::new(CallbackRegistry::new()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Open a new connection, discarding the current one.
    ///
    /// Returns immediately; the outcome is reported to connection listeners.
    pub fn connect(&self) {
        self.shared.connect();
    }

    /// Close the current connection if it is open and stop the heartbeat.
    ///
    /// Whether the resulting close still triggers a reconnect depends on
    /// `reconnect.reconnect_after_disconnect`.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_open()
    }

    pub fn status(&self) -> ConnStatus {
        let state = self.shared.state();
        if state.connected {
            return ConnStatus::Open;
        }
        match state.link.as_ref().map(Link::ready_state) {
            Some(ReadyState::Connecting) => ConnStatus::Connecting,
            _ => ConnStatus::Disconnected,
        }
    }

    /// Reconnect attempts made since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.state().reconnect.attempts()
    }

    /// Sequence number of the latest `connect()` call
    pub fn generation(&self) -> u64 {
        self.shared.state().generation
    }

    /// Send an envelope built from `message_type` and `payload`.
    ///
    /// Returns `false` (and logs) if the connection is not open or the frame
    /// could not be handed to the transport.
    pub fn send(
        &self,
        message_type: impl Into<MessageType>,
        payload: Option<Map<String, Value>>,
    ) -> bool {
        self.shared.send(&Envelope::new(message_type, payload))
    }

    /// Like [`send`](Self::send), but reports why a send failed
    pub fn try_send(
        &self,
        message_type: impl Into<MessageType>,
        payload: Option<Map<String, Value>>,
    ) -> ClientResult<()> {
        self.shared.try_send(&Envelope::new(message_type, payload))
    }

    /// Send a typed payload
    pub fn send_payload<P: Payload>(&self, payload: &P) -> bool {
        match payload.to_envelope() {
            Ok(envelope) => self.shared.send(&envelope),
            Err(e) => {
                error!("Error building {} message: {}", P::message_type(), e);
                false
            }
        }
    }

    /// Send a chat message typed by the user
    pub fn send_user_message(&self, content: impl Into<String>) -> bool {
        self.send_payload(&UserMessage::new(content))
    }

    /// Answer a human input request
    pub fn send_human_input_response(&self, response: impl Into<String>) -> bool {
        self.send_payload(&HumanInputResponse::new(response))
    }

    /// Register a listener for one message type
    pub fn on_message<F>(&self, message_type: impl Into<MessageType>, callback: F) -> ListenerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let callback: MessageCallback = Arc::new(callback);
        self.shared
            .registry_mut()
            .add_message(message_type.into(), callback)
    }

    /// Register a listener that receives the decoded payload.
    ///
    /// Envelopes that do not decode as `P` are logged and skipped.
    pub fn on_payload<P, F>(&self, callback: F) -> ListenerId
    where
        P: Payload + 'static,
        F: Fn(P) + Send + Sync + 'static,
    {
        self.on_message(P::message_type(), move |envelope| {
            match envelope.decode::<P>() {
                Ok(payload) => callback(payload),
                Err(e) => warn!(
                    "Dropping {} message that does not match its schema: {}",
                    envelope.message_type(),
                    e
                ),
            }
        })
    }

    /// Register a listener for a connection lifecycle event
    pub fn on_connection<F>(&self, kind: ConnectionEventKind, callback: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let callback: ConnectionCallback = Arc::new(callback);
        self.shared.registry_mut().add_connection(kind, callback)
    }

    /// Remove a previously registered listener
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.shared.registry_mut().remove(id);
        if removed {
            debug!("Removed listener {}", id);
        }
        removed
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.config.url)
            .field("status", &self.status())
            .finish()
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> std::sync::RwLockReadGuard<'_, CallbackRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> std::sync::RwLockWriteGuard<'_, CallbackRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_open(&self) -> bool {
        let state = self.state();
        state.connected
            && state
                .link
                .as_ref()
                .is_some_and(|link| link.ready_state() == ReadyState::Open)
    }

    fn connect(self: &Arc<Self>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (link, endpoint) = link_pair(events_tx);

        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.disconnect_requested = false;
            if state.link.replace(link).is_some() {
                debug!("Discarding previous connection");
                state.connected = false;
                state.stop_heartbeat();
            }
            state.generation
        };

        info!(
            "Connecting to {} (generation {})",
            self.config.url, generation
        );
        tokio::spawn(dispatch_events(Arc::downgrade(self), generation, events_rx));
        self.connector.open(&self.config.url, endpoint);
    }

    fn disconnect(&self) {
        let mut state = self.state();

        if state.connected {
            if let Some(link) = &state.link {
                info!("Disconnecting from {}", self.config.url);
                link.close();
                // Only the close we asked for counts as intentional
                state.disconnect_requested = true;
            }
        }
        state.stop_heartbeat();

        if !self.config.reconnect.reconnect_after_disconnect {
            if let Some(timer) = state.reconnect_timer.take() {
                debug!("Cancelled pending reconnect");
                timer.abort();
            }
        }
    }

    fn handle_event(self: &Arc<Self>, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.handle_open(generation),
            TransportEvent::Frame(text) => self.handle_frame(generation, &text),
            TransportEvent::Closed(info) => self.handle_close(generation, info),
            TransportEvent::Errored(message) => self.handle_error(generation, message),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state().generation == generation
    }

    fn handle_open(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.connected = true;
            state.reconnect.reset();
            self.start_heartbeat(&mut state);
        }

        info!("Connected to WebSocket server at {}", self.config.url);
        self.emit_connection(&ConnectionEvent::Open);
    }

    fn handle_frame(&self, generation: u64, text: &str) {
        if !self.is_current(generation) {
            return;
        }

        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Error parsing WebSocket message: {}", e);
                return;
            }
        };
        debug!("Received message of type: {}", envelope.message_type());

        let listeners = self.registry().message_listeners(envelope.message_type());
        for callback in listeners {
            callback(&envelope);
        }
    }

    fn handle_close(self: &Arc<Self>, generation: u64, info: CloseInfo) {
        let reconnect = {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.connected = false;
            state.stop_heartbeat();
            !(state.disconnect_requested && !self.config.reconnect.reconnect_after_disconnect)
        };

        info!(
            "Disconnected from WebSocket server (code {:?}, reason {:?})",
            info.code, info.reason
        );
        self.emit_connection(&ConnectionEvent::Close(info));

        if reconnect {
            self.schedule_reconnect(generation);
        } else {
            info!("Connection closed by disconnect(), not reconnecting");
        }
    }

    fn handle_error(&self, generation: u64, message: String) {
        if !self.is_current(generation) {
            return;
        }
        error!("WebSocket error: {}", message);
        self.emit_connection(&ConnectionEvent::Error(message));
    }

    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        let mut state = self.state();
        if state.generation != generation {
            // A close listener already reconnected
            return;
        }

        let Some(delay) = state.reconnect.next_delay() else {
            warn!("Maximum reconnection attempts reached. Giving up.");
            return;
        };

        info!(
            attempt = state.reconnect.attempts(),
            max_attempts = state.reconnect.max_attempts(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Attempting to reconnect"
        );

        let shared = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                info!("Reconnecting...");
                shared.connect();
            }
        });
        if let Some(previous) = state.reconnect_timer.replace(timer) {
            previous.abort();
        }
    }

    fn start_heartbeat(self: &Arc<Self>, state: &mut ConnectionState) {
        state.stop_heartbeat();

        let interval = self.config.heartbeat_interval();
        if interval.is_zero() {
            warn!("Heartbeat interval is zero, not sending pings");
            return;
        }
        let shared = Arc::downgrade(self);
        state.heartbeat = Some(spawn_heartbeat(interval, move || {
            match shared.upgrade() {
                Some(shared) => {
                    shared.heartbeat_tick();
                    HeartbeatTick::Continue
                }
                None => HeartbeatTick::Stop,
            }
        }));
    }

    fn heartbeat_tick(&self) {
        if !self.is_open() {
            return;
        }
        match Ping::default().to_envelope() {
            Ok(ping) => {
                if let Err(e) = self.try_send(&ping) {
                    debug!("Heartbeat ping skipped: {}", e);
                }
            }
            Err(e) => error!("Error building ping: {}", e),
        }
    }

    fn try_send(&self, envelope: &Envelope) -> ClientResult<()> {
        let state = self.state();
        if !state.connected {
            return Err(ClientError::NotConnected);
        }
        let link = state
            .link
            .as_ref()
            .filter(|link| link.ready_state() == ReadyState::Open)
            .ok_or(ClientError::NotConnected)?;

        let text = envelope.to_json()?;
        link.send_text(text)?;
        debug!("Sent message of type: {}", envelope.message_type());
        Ok(())
    }

    fn send(&self, envelope: &Envelope) -> bool {
        match self.try_send(envelope) {
            Ok(()) => true,
            Err(ClientError::NotConnected) => {
                error!("Cannot send message, WebSocket is not connected");
                false
            }
            Err(e) => {
                error!("Error sending WebSocket message: {}", e);
                false
            }
        }
    }

    fn emit_connection(&self, event: &ConnectionEvent) {
        let listeners = self.registry().connection_listeners(event.kind());
        for callback in listeners {
            callback(event);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.stop_heartbeat();
        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }
    }
}

/// Forward one link's events to the manager until the link is superseded
async fn dispatch_events(
    manager: Weak<Shared>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = manager.upgrade() else {
            break;
        };
        if !shared.is_current(generation) {
            debug!(
                "Dropping {:?} from superseded connection (generation {})",
                event, generation
            );
            break;
        }
        shared.handle_event(generation, event);
    }
}
