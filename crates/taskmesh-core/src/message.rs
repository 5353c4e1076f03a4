use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Recipient value meaning "every registered agent except the sender".
pub const BROADCAST: &str = "*";

/// The type tag of a [`Message`].
///
/// Known kinds get their own variant; anything else is kept verbatim in
/// [`MessageKind::Other`] so handlers can still be registered for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Ask the recipient to do something.
    Request,
    /// Reply to a request.
    Response,
    /// Notification with no reply expected.
    Event,
    /// Failure report, usually a reply.
    Error,
    /// Liveness probe.
    Ping,
    /// Runtime state query.
    Status,
    /// Announce an agent and its capabilities to the coordinator.
    AgentRegister,
    /// Withdraw an agent from the coordinator.
    AgentUnregister,
    /// Ask the coordinator to create a task.
    TaskRequest,
    /// Report a finished execution to the coordinator.
    TaskResult,
    /// Any other type tag.
    Other(String),
}

impl MessageKind {
    /// The wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Event => "event",
            MessageKind::Error => "error",
            MessageKind::Ping => "ping",
            MessageKind::Status => "status",
            MessageKind::AgentRegister => "agent-register",
            MessageKind::AgentUnregister => "agent-unregister",
            MessageKind::TaskRequest => "task-request",
            MessageKind::TaskResult => "task-result",
            MessageKind::Other(other) => other,
        }
    }
}

impl From<&str> for MessageKind {
    fn from(value: &str) -> Self {
        match value {
            "request" => MessageKind::Request,
            "response" => MessageKind::Response,
            "event" => MessageKind::Event,
            "error" => MessageKind::Error,
            "ping" => MessageKind::Ping,
            "status" => MessageKind::Status,
            "agent-register" => MessageKind::AgentRegister,
            "agent-unregister" => MessageKind::AgentUnregister,
            "task-request" => MessageKind::TaskRequest,
            "task-result" => MessageKind::TaskResult,
            other => MessageKind::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(value: String) -> Self {
        MessageKind::from(value.as_str())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An envelope routed by the broker between agents.
///
/// Messages are immutable once built: fields are only readable through
/// accessors, and the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: Uuid,
    from: String,
    to: String,
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    payload: serde_json::Value,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<Uuid>,
}

impl Message {
    /// Creates a directed message with a fresh id and the current time.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            to: to.into(),
            kind,
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Creates a message addressed to [`BROADCAST`].
    pub fn broadcast(from: impl Into<String>, kind: MessageKind, payload: serde_json::Value) -> Self {
        Self::new(from, BROADCAST, kind, payload)
    }

    /// Marks this message as a reply to `request_id`.
    pub fn with_correlation_id(mut self, request_id: Uuid) -> Self {
        self.correlation_id = Some(request_id);
        self
    }

    /// Unique identifier for this message.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Sender agent id.
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Recipient agent id, or [`BROADCAST`].
    pub fn to(&self) -> &str {
        &self.to
    }

    /// Type tag used for handler dispatch.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Opaque payload.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// UTC creation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Id of the message this one replies to.
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id
    }

    /// True if addressed to every agent but the sender.
    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST
    }

    /// Deserialize the payload into a typed protocol struct.
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> crate::TaskmeshResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            crate::TaskmeshError::InvalidPayload(format!("{} message: {e}", self.kind))
        })
    }
}
