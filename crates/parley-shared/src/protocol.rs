use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ProtocolError;
use crate::types::{MessageId, UserId};

/// A stored chat message, as sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub from: UserId,
    pub to: UserId,
    /// Message body. Carried as `message` on the wire.
    #[serde(rename = "message")]
    pub text: String,
    /// Set once by a read receipt, never cleared.
    pub read: bool,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatPayload {
    pub from: UserId,
    pub to: UserId,
    pub message: String,
}

/// Read receipt: every message `from -> to` has been seen by `to`.
/// Echoed back unchanged to `from`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadPayload {
    pub from: UserId,
    pub to: UserId,
}

/// Shared by `typing` and `stopTyping`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingPayload {
    pub from: UserId,
    pub to: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetChatsPayload {
    pub user1: UserId,
    pub user2: UserId,
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingNotice {
    pub from: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceNotice {
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Raw `{event, data}` envelope before the payload is interpreted.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// An event received from a client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Chat(ChatPayload),
    Read(ReadPayload),
    Typing(TypingPayload),
    StopTyping(TypingPayload),
    GetChats(GetChatsPayload),
    /// Unread messages for the requesting session's own user.
    GetNotif,
    OnlineUsers,
    /// Client-side presence announcements. Presence is tracked from the
    /// connection lifecycle, so these carry no authority.
    Online(PresenceNotice),
    Offline(PresenceNotice),
}

impl InboundEvent {
    /// Decode a text frame. Fails on malformed JSON, unknown event names and
    /// payloads that do not match the event's shape.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: RawEnvelope = serde_json::from_str(raw).map_err(ProtocolError::Malformed)?;
        let RawEnvelope { event, data } = envelope;

        let decoded = match event.as_str() {
            EVENT_CHAT => Self::Chat(payload(EVENT_CHAT, data)?),
            EVENT_READ => Self::Read(payload(EVENT_READ, data)?),
            EVENT_TYPING => Self::Typing(payload(EVENT_TYPING, data)?),
            EVENT_STOP_TYPING => Self::StopTyping(payload(EVENT_STOP_TYPING, data)?),
            EVENT_GET_CHATS => Self::GetChats(payload(EVENT_GET_CHATS, data)?),
            EVENT_GET_NOTIF => Self::GetNotif,
            EVENT_ONLINE_USERS => Self::OnlineUsers,
            EVENT_ONLINE => Self::Online(payload(EVENT_ONLINE, data)?),
            EVENT_OFFLINE => Self::Offline(payload(EVENT_OFFLINE, data)?),
            _ => return Err(ProtocolError::UnknownEvent(event)),
        };

        Ok(decoded)
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chat(_) => EVENT_CHAT,
            Self::Read(_) => EVENT_READ,
            Self::Typing(_) => EVENT_TYPING,
            Self::StopTyping(_) => EVENT_STOP_TYPING,
            Self::GetChats(_) => EVENT_GET_CHATS,
            Self::GetNotif => EVENT_GET_NOTIF,
            Self::OnlineUsers => EVENT_ONLINE_USERS,
            Self::Online(_) => EVENT_ONLINE,
            Self::Offline(_) => EVENT_OFFLINE,
        }
    }
}

fn payload<T: DeserializeOwned>(event: &'static str, data: serde_json::Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload { event, source })
}

/// An event written to a client connection, encoded as `{"event": .., "data": ..}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum OutboundEvent {
    Chat(Message),
    Read(ReadPayload),
    Typing(TypingNotice),
    StopTyping(TypingNotice),
    GetChats(Vec<Message>),
    GetNotif(Vec<Message>),
    Online(PresenceNotice),
    Offline(PresenceNotice),
    OnlineUsers(Vec<UserId>),
}

impl OutboundEvent {
    pub fn online(user_id: UserId) -> Self {
        Self::Online(PresenceNotice { user_id })
    }

    pub fn offline(user_id: UserId) -> Self {
        Self::Offline(PresenceNotice { user_id })
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parse a JSON text frame produced by [`OutboundEvent::encode`].
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::Malformed)
    }
}
