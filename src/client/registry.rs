//! Callback registry
//!
//! Maps message types and connection events to ordered listener lists.
//! Dispatch works on a snapshot so listeners can register, remove or send
//! while being invoked.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::protocol::{Envelope, MessageType};
use crate::transport::CloseInfo;

/// Callback invoked with an inbound envelope
pub type MessageCallback = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Callback invoked with a connection lifecycle event
pub type ConnectionCallback = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Handle returned by every registration, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Connection lifecycle event kinds listeners can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEventKind {
    Open,
    Close,
    Error,
}

/// Connection lifecycle event delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The socket opened
    Open,
    /// The socket closed
    Close(CloseInfo),
    /// The socket reported an error
    Error(String),
}

impl ConnectionEvent {
    pub fn kind(&self) -> ConnectionEventKind {
        match self {
            ConnectionEvent::Open => ConnectionEventKind::Open,
            ConnectionEvent::Close(_) => ConnectionEventKind::Close,
            ConnectionEvent::Error(_) => ConnectionEventKind::Error,
        }
    }
}

/// Ordered listener lists for messages and connection events
#[derive(Default)]
pub struct CallbackRegistry {
    messages: HashMap<MessageType, Vec<(ListenerId, MessageCallback)>>,
    connection: HashMap<ConnectionEventKind, Vec<(ListenerId, ConnectionCallback)>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for one message type
    pub fn add_message(
        &mut self,
        message_type: MessageType,
        callback: MessageCallback,
    ) -> ListenerId {
        let id = ListenerId::new();
        self.messages
            .entry(message_type)
            .or_default()
            .push((id, callback));
        id
    }

    /// Append a listener for one connection event kind
    pub fn add_connection(
        &mut self,
        kind: ConnectionEventKind,
        callback: ConnectionCallback,
    ) -> ListenerId {
        let id = ListenerId::new();
        self.connection.entry(kind).or_default().push((id, callback));
        id
    }

    /// Remove a listener; returns `false` if it was not registered
    pub fn remove(&mut self, id: ListenerId) -> bool {
        for listeners in self.messages.values_mut() {
            if let Some(pos) = listeners.iter().position(|(lid, _)| *lid == id) {
                listeners.remove(pos);
                return true;
            }
        }
        for listeners in self.connection.values_mut() {
            if let Some(pos) = listeners.iter().position(|(lid, _)| *lid == id) {
                listeners.remove(pos);
                return true;
            }
        }
        false
    }

    /// Listeners for a message type, in registration order
    pub fn message_listeners(&self, message_type: &MessageType) -> Vec<MessageCallback> {
        self.messages
            .get(message_type)
            .map(|listeners| listeners.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    /// Listeners for a connection event kind, in registration order
    pub fn connection_listeners(&self, kind: ConnectionEventKind) -> Vec<ConnectionCallback> {
        self.connection
            .get(&kind)
            .map(|listeners| listeners.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    /// Total number of registered listeners
    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum::<usize>()
            + self.connection.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("message_types", &self.messages.len())
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> MessageCallback {
        let log = Arc::clone(log);
        Arc::new(move |_: &Envelope| log.lock().unwrap().push(name))
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        registry.add_message(MessageType::Status, recorder(&log, "first"));
        registry.add_message(MessageType::Status, recorder(&log, "second"));
        registry.add_message(MessageType::Status, recorder(&log, "third"));

        let envelope = Envelope::new(MessageType::Status, None);
        for callback in registry.message_listeners(&MessageType::Status) {
            callback(&envelope);
        }

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unregistered_type_has_no_listeners() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        registry.add_message(MessageType::Status, recorder(&log, "status"));

        assert!(registry.message_listeners(&MessageType::Pong).is_empty());
        assert!(registry
            .message_listeners(&MessageType::Other("status_v2".to_string()))
            .is_empty());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let callback = recorder(&log, "dup");
        let mut registry = CallbackRegistry::new();
        registry.add_message(MessageType::Init, Arc::clone(&callback));
        registry.add_message(MessageType::Init, callback);

        assert_eq!(registry.message_listeners(&MessageType::Init).len(), 2);
    }

    #[test]
    fn test_remove_listener() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let first = registry.add_message(MessageType::Status, recorder(&log, "first"));
        registry.add_message(MessageType::Status, recorder(&log, "second"));
        let open =
            registry.add_connection(ConnectionEventKind::Open, Arc::new(|_: &ConnectionEvent| {}));
        assert_eq!(registry.len(), 3);

        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        assert!(registry.remove(open));
        assert!(registry.connection_listeners(ConnectionEventKind::Open).is_empty());

        let envelope = Envelope::new(MessageType::Status, None);
        for callback in registry.message_listeners(&MessageType::Status) {
            callback(&envelope);
        }
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_empty_after_last_removal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        assert!(registry.is_empty());

        let id = registry.add_message(MessageType::Init, recorder(&log, "init"));
        assert!(!registry.is_empty());
        assert!(registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_listener_ids_are_unique_and_printable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let first = registry.add_message(MessageType::Init, recorder(&log, "a"));
        let second = registry.add_message(MessageType::Init, recorder(&log, "b"));

        assert_ne!(first, second);
        assert_ne!(first.to_string(), second.to_string());
        assert_eq!(first.to_string().len(), 36);
    }

    #[test]
    fn test_connection_listeners_are_per_kind() {
        let mut registry = CallbackRegistry::new();
        registry.add_connection(ConnectionEventKind::Close, Arc::new(|_: &ConnectionEvent| {}));

        assert_eq!(registry.connection_listeners(ConnectionEventKind::Close).len(), 1);
        assert!(registry.connection_listeners(ConnectionEventKind::Open).is_empty());
        assert!(registry.connection_listeners(ConnectionEventKind::Error).is_empty());
    }

    #[test]
    fn test_connection_event_kind() {
        assert_eq!(ConnectionEvent::Open.kind(), ConnectionEventKind::Open);
        assert_eq!(
            ConnectionEvent::Close(CloseInfo::abnormal()).kind(),
            ConnectionEventKind::Close
        );
        assert_eq!(
            ConnectionEvent::Error("boom".to_string()).kind(),
            ConnectionEventKind::Error
        );
    }
}
