//! Typed payloads for the message types the client understands
//!
//! Each payload knows its own discriminator so it can be subscribed to or
//! sent without spelling the type by hand.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Envelope, MessageType, ProtocolError, ProtocolResult};

/// A payload bound to a single message type
pub trait Payload: Serialize + DeserializeOwned {
    /// Discriminator carried by envelopes of this payload
    fn message_type() -> MessageType;

    /// Wrap this payload in an outbound envelope
    fn to_envelope(&self) -> ProtocolResult<Envelope> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(Envelope::new(Self::message_type(), Some(fields))),
            Value::Null => Ok(Envelope::new(Self::message_type(), Some(Map::new()))),
            other => Err(ProtocolError::InvalidMessage(format!(
                "{} payload must serialize to an object, got {}",
                Self::message_type(),
                other
            ))),
        }
    }
}

// ============================================================================
// Server Messages
// ============================================================================

/// Full chat transcript as (user, agent) pairs
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatUpdate {
    #[serde(default)]
    pub history: Vec<(Option<String>, Option<String>)>,
}

impl Payload for ChatUpdate {
    fn message_type() -> MessageType {
        MessageType::ChatUpdate
    }
}

/// The agent is waiting on a human reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HumanInputRequest {
    #[serde(default)]
    pub prompt: String,
}

impl Payload for HumanInputRequest {
    fn message_type() -> MessageType {
        MessageType::HumanInputRequest
    }
}

// ============================================================================
// Client Messages
// ============================================================================

/// Connection keepalive
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Ping {}

impl Payload for Ping {
    fn message_type() -> MessageType {
        MessageType::Ping
    }
}

/// Chat input typed by the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserMessage {
    pub content: String,
}

impl UserMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl Payload for UserMessage {
    fn message_type() -> MessageType {
        MessageType::UserMessage
    }
}

/// Answer to a [`HumanInputRequest`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HumanInputResponse {
    pub response: String,
}

impl HumanInputResponse {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl Payload for HumanInputResponse {
    fn message_type() -> MessageType {
        MessageType::HumanInputResponse
    }
}
