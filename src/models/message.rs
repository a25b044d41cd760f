//! Chat message models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{first_id, id_string, parse_timestamp, PayloadError};

/// One chat line, as persisted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned id; the de-duplication key.
    pub id: String,
    /// Owning room, when the payload names one.
    pub room_id: Option<String>,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    /// Body text, from `content` or the legacy `message` field.
    pub content: String,
    /// `None` when missing or unparseable.
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    chat_room_id: Option<Value>,
    #[serde(default)]
    chatroom_id: Option<Value>,
    #[serde(default)]
    room_id: Option<Value>,
    #[serde(default)]
    sender_id: Option<Value>,
    #[serde(default)]
    receiver_id: Option<Value>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    created_at: Option<Value>,
}

impl Message {
    /// Parse a live frame body.
    pub fn parse(body: &str) -> Result<Self, PayloadError> {
        Self::from_value(serde_json::from_str(body)?)
    }

    /// Normalize one message object (history entry or frame body).
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let raw: RawMessage = serde_json::from_value(value)?;
        let id = raw
            .id
            .as_ref()
            .and_then(id_string)
            .ok_or(PayloadError::MissingId("message id"))?;

        Ok(Self {
            id,
            room_id: first_id([&raw.chat_room_id, &raw.chatroom_id, &raw.room_id]),
            sender_id: raw.sender_id.as_ref().and_then(id_string).unwrap_or_default(),
            receiver_id: raw.receiver_id.as_ref().and_then(id_string),
            content: raw.content.or(raw.message).unwrap_or_default(),
            created_at: raw.created_at.as_ref().and_then(parse_timestamp),
        })
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }
}

/// Normalize a history list, dropping (and logging) entries without an id.
pub fn normalize_messages(values: Vec<Value>) -> Vec<Message> {
    values
        .into_iter()
        .filter_map(|v| match Message::from_value(v) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!("Skipping history entry: {}", e);
                None
            }
        })
        .collect()
}

/// Body published to `/app/chat.send`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub chat_room_id: String,
}
