//! WebSocket message types: server envelope, handshake, and control frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Credential, SessionId};

/// Server → client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Server-generated message id.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

/// Discriminator for server messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Handshake accepted.
    Ready,
    /// Broadcast event.
    Event,
    /// Acknowledgement of a control frame.
    Response,
    /// Protocol or handshake error.
    Error,
    /// Answer to an application-level `ping`.
    Pong,
}

impl WsMessage {
    /// Builds a message with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error message.
    #[must_use]
    pub fn error(code: u16, message: &str) -> Self {
        Self::new(
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }

    /// Serializes to JSON text. Serialization of these shapes cannot fail;
    /// an empty object is returned if it somehow does.
    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// First frame a client must send: `{id, bot, token}`.
///
/// Unknown fields are ignored. In particular a client cannot pick its own
/// rate-limit channel; that is derived from the verified identity.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeFrame {
    /// Claimed identity.
    pub id: SessionId,
    /// `true` for bots.
    pub bot: bool,
    /// API token.
    pub token: Credential,
}

/// Frames accepted after verification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Application-level keepalive, answered with a `pong` message.
    Ping,
    /// Updates broadcast eligibility. Absent fields are left unchanged.
    Flags {
        /// Receive every broadcast.
        #[serde(default)]
        send_all: Option<bool>,
        /// Opt out of untargeted broadcasts.
        #[serde(default)]
        send_none: Option<bool>,
    },
}
