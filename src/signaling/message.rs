//! Inbound message classification.
//!
//! Every text frame is classified exactly once when it arrives. Valid JSON
//! becomes [`InboundMessage::Parsed`] with the routing envelope fields
//! extracted; anything else becomes [`InboundMessage::Unparsed`]. The raw
//! text is kept in both cases so routing can forward it byte-for-byte.

use serde_json::Value;

/// Envelope `type` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Register,
    Offer,
    Answer,
    IceCandidate,
    Test,
    /// A `type` the relay does not route
    Other(String),
    /// No `type` field, or one that is not a string
    Missing,
}

impl MessageKind {
    fn from_type(value: Option<&str>) -> Self {
        match value {
            Some("register") => MessageKind::Register,
            Some("offer") => MessageKind::Offer,
            Some("answer") => MessageKind::Answer,
            Some("ice-candidate") => MessageKind::IceCandidate,
            Some("test") => MessageKind::Test,
            Some(other) => MessageKind::Other(other.to_string()),
            None => MessageKind::Missing,
        }
    }

    /// Negotiation messages forwarded to other peers
    pub fn is_routable(&self) -> bool {
        matches!(
            self,
            MessageKind::Offer | MessageKind::Answer | MessageKind::IceCandidate | MessageKind::Test
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Register => "register",
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::IceCandidate => "ice-candidate",
            MessageKind::Test => "test",
            MessageKind::Other(other) => other,
            MessageKind::Missing => "unknown",
        }
    }
}

/// Envelope `target` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Missing, `null` or an empty string
    Absent,
    Client(String),
    /// Present but not a string, so it names no client
    Invalid,
}

impl Target {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Target::Absent,
            Some(Value::String(s)) if s.is_empty() => Target::Absent,
            Some(Value::String(s)) => Target::Client(s.clone()),
            Some(_) => Target::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Parsed {
        kind: MessageKind,
        id: Option<String>,
        target: Target,
        raw: String,
    },
    Unparsed {
        raw: String,
    },
}

impl InboundMessage {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let value = match serde_json::from_str::<Value>(&raw) {
            Ok(value) => value,
            Err(_) => return InboundMessage::Unparsed { raw },
        };

        let field = |name: &str| value.get(name).and_then(Value::as_str);

        InboundMessage::Parsed {
            kind: MessageKind::from_type(field("type")),
            id: field("id").map(str::to_string),
            target: Target::from_value(value.get("target")),
            raw,
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            InboundMessage::Parsed { raw, .. } | InboundMessage::Unparsed { raw } => raw,
        }
    }

    pub fn into_raw(self) -> String {
        match self {
            InboundMessage::Parsed { raw, .. } | InboundMessage::Unparsed { raw } => raw,
        }
    }

    /// Identifier carried by a well-formed registration message
    pub fn registration_id(&self) -> Option<&str> {
        match self {
            InboundMessage::Parsed {
                kind: MessageKind::Register,
                id: Some(id),
                ..
            } if !id.is_empty() => Some(id),
            _ => None,
        }
    }
}

/// Error notification sent before closing a connection
#[derive(Debug)]
pub struct ErrorNotice<'a> {
    pub error: &'a str,
}

pub const ERR_INVALID_REGISTRATION_JSON: &str = "Invalid JSON in registration.";
pub const ERR_REGISTRATION_REQUIRED: &str = "First message must be registration with a client id.";

impl<'a> ErrorNotice<'a> {
    pub fn new(error: &'a str) -> Self {
        Self { error }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "error": self.error }).to_string()
    }
}
