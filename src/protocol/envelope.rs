//! Message envelope and type discriminator
//!
//! Every frame on the wire is a JSON value carrying a `type` field. The rest of
//! the fields belong to the server contract and are kept as an opaque value.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Name of the discriminator field
pub const TYPE_FIELD: &str = "type";

/// Sentinel used when an inbound frame carries no usable `type`
pub const UNKNOWN_TYPE: &str = "unknown";

// ============================================================================
// Error Types
// ============================================================================

/// Protocol-related errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ============================================================================
// Message Type
// ============================================================================

/// Value of the `type` discriminator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    // Server -> client
    Init,
    AgentMessage,
    HumanInputRequest,
    HumanInputReceived,
    ChatUpdate,
    Status,
    FileUploaded,
    Pong,

    // Client -> server
    Ping,
    UserMessage,
    HumanInputResponse,

    /// Frame without a usable `type` field
    Unknown,
    /// Any other discriminator the server may define
    Other(String),
}

impl MessageType {
    /// Wire name of this type
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Init => "init",
            MessageType::AgentMessage => "agent_message",
            MessageType::HumanInputRequest => "human_input_request",
            MessageType::HumanInputReceived => "human_input_received",
            MessageType::ChatUpdate => "chat_update",
            MessageType::Status => "status",
            MessageType::FileUploaded => "file_uploaded",
            MessageType::Pong => "pong",
            MessageType::Ping => "ping",
            MessageType::UserMessage => "user_message",
            MessageType::HumanInputResponse => "human_input_response",
            MessageType::Unknown => UNKNOWN_TYPE,
            MessageType::Other(name) => name,
        }
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        match name {
            "init" => MessageType::Init,
            "agent_message" => MessageType::AgentMessage,
            "human_input_request" => MessageType::HumanInputRequest,
            "human_input_received" => MessageType::HumanInputReceived,
            "chat_update" => MessageType::ChatUpdate,
            "status" => MessageType::Status,
            "file_uploaded" => MessageType::FileUploaded,
            "pong" => MessageType::Pong,
            "ping" => MessageType::Ping,
            "user_message" => MessageType::UserMessage,
            "human_input_response" => MessageType::HumanInputResponse,
            UNKNOWN_TYPE | "" => MessageType::Unknown,
            other => MessageType::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageType {
    fn from(name: String) -> Self {
        MessageType::from(name.as_str())
    }
}

impl From<MessageType> for String {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// One unit of wire traffic: a `type` discriminator plus the full JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    message_type: MessageType,
    body: Value,
}

impl Envelope {
    /// Build an outbound envelope from a type and optional payload fields.
    ///
    /// The `type` argument always wins over a `type` key in the payload.
    pub fn new(message_type: impl Into<MessageType>, payload: Option<Map<String, Value>>) -> Self {
        let message_type = message_type.into();
        let mut fields = payload.unwrap_or_default();
        fields.insert(
            TYPE_FIELD.to_string(),
            Value::String(message_type.as_str().to_string()),
        );

        Self {
            message_type,
            body: Value::Object(fields),
        }
    }

    /// Parse an inbound frame.
    ///
    /// Any valid JSON is accepted. A missing, empty or non-string `type`
    /// resolves to [`MessageType::Unknown`].
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let body: Value = serde_json::from_str(text)?;
        let message_type = body
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .map(MessageType::from)
            .unwrap_or(MessageType::Unknown);

        Ok(Self { message_type, body })
    }

    /// Discriminator of this envelope
    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    /// Full JSON body, including the `type` field
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Look up a single payload field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Decode the body into a typed payload
    pub fn decode<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        Ok(T::deserialize(&self.body)?)
    }

    /// Serialize the envelope to JSON
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(&self.body)?)
    }
}
