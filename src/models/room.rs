//! Chat room models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{first_id, id_string, parse_timestamp, PayloadError};

/// The other side of a 1:1 room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
}

/// A 1:1 exchange channel between the current user and `other_user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Canonical room id, used for both the history fetch and the topic name.
    pub id: String,
    pub other_user: Participant,
    pub offered_skill: String,
    pub requested_skill: String,
    /// Display only. Ordering is driven by live activity.
    pub last_activity_at: Option<DateTime<Utc>>,
    pub exchange_request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParticipant {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoom {
    #[serde(default)]
    chat_room_id: Option<Value>,
    #[serde(default)]
    chatroom_id: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    other_user: Option<RawParticipant>,
    #[serde(default)]
    offered_skill: Option<String>,
    #[serde(default)]
    requested_skill: Option<String>,
    #[serde(default)]
    last_activity_at: Option<Value>,
    #[serde(default)]
    exchange_request_id: Option<Value>,
}

impl Room {
    /// Normalize one room object from the REST API.
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let raw: RawRoom = serde_json::from_value(value)?;
        let id = first_id([&raw.chat_room_id, &raw.chatroom_id, &raw.id])
            .ok_or(PayloadError::MissingId("room id"))?;

        let other_user = raw
            .other_user
            .map(|p| Participant {
                id: p.id.as_ref().and_then(id_string).unwrap_or_default(),
                full_name: p.full_name.unwrap_or_default(),
                email: p.email,
            })
            .unwrap_or_default();

        Ok(Self {
            id,
            other_user,
            offered_skill: raw.offered_skill.unwrap_or_default(),
            requested_skill: raw.requested_skill.unwrap_or_default(),
            last_activity_at: raw.last_activity_at.as_ref().and_then(parse_timestamp),
            exchange_request_id: raw.exchange_request_id.as_ref().and_then(id_string),
        })
    }

    /// Display name of the other participant.
    pub fn title(&self) -> &str {
        if self.other_user.full_name.is_empty() {
            "Unknown user"
        } else {
            &self.other_user.full_name
        }
    }

    /// Sidebar preview line.
    pub fn preview(&self) -> String {
        if self.requested_skill.is_empty() {
            "Start a conversation".to_string()
        } else {
            format!("Interested in {}", self.requested_skill)
        }
    }

    /// Case-insensitive substring match on name and skills. An empty query
    /// matches everything.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        [
            &self.other_user.full_name,
            &self.offered_skill,
            &self.requested_skill,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&query))
    }
}

/// Normalize a room list, dropping (and logging) entries without an id.
pub fn normalize_rooms(values: Vec<Value>) -> Vec<Room> {
    values
        .into_iter()
        .filter_map(|v| match Room::from_value(v) {
            Ok(room) => Some(room),
            Err(e) => {
                tracing::warn!("Skipping room: {}", e);
                None
            }
        })
        .collect()
}

/// Body of `POST /chat/rooms`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub user1_id: String,
    pub user2_id: String,
    pub exchange_request_id: String,
}

/// Payload on the user activity topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySignal {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActivity {
    #[serde(default)]
    chat_room_id: Option<Value>,
    #[serde(default)]
    chatroom_id: Option<Value>,
}

impl ActivitySignal {
    /// Parse an activity frame body. Only the room id is read; the bare `id`
    /// of a message-shaped payload is a message id and is not considered.
    pub fn parse(body: &str) -> Result<Self, PayloadError> {
        let raw: RawActivity = serde_json::from_str(body)?;
        let room_id = first_id([&raw.chat_room_id, &raw.chatroom_id])
            .ok_or(PayloadError::MissingId("chatRoomId"))?;
        Ok(Self { room_id })
    }
}
