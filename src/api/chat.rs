//! Chat REST endpoints: room list, room history, room creation

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::client::ApiClient;
use crate::auth::Session;
use crate::chat::time::{format_date, time_label};
use crate::chat::ChatBackend;
use crate::models::{normalize_messages, normalize_rooms, CreateRoomRequest, Message, Room};

/// Envelope `data` as a list. A missing or non-array `data` is an empty list.
fn data_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            tracing::warn!("Expected a list, got {}", other);
            Vec::new()
        }
    }
}

impl ApiClient {
    /// `GET /chat/rooms/{userId}`, in server order.
    pub async fn fetch_rooms(&self, user_id: &str) -> Result<Vec<Room>> {
        let data: Value = self
            .get_data(&format!("/chat/rooms/{}", user_id))
            .await
            .context("Unable to fetch chat rooms")?;
        Ok(normalize_rooms(data_list(data)))
    }

    /// `GET /chat/rooms/{roomId}/messages`, oldest first.
    pub async fn fetch_history(&self, room_id: &str) -> Result<Vec<Message>> {
        let data: Value = self
            .get_data(&format!("/chat/rooms/{}/messages", room_id))
            .await
            .with_context(|| format!("Unable to fetch messages for room {}", room_id))?;
        Ok(normalize_messages(data_list(data)))
    }

    /// `POST /chat/rooms`.
    pub async fn create_room(&self, request: &CreateRoomRequest) -> Result<Room> {
        let data: Value = self
            .post_data("/chat/rooms", request)
            .await
            .context("Unable to create chat room")?;
        Ok(Room::from_value(data)?)
    }
}

impl ChatBackend for ApiClient {
    fn list_rooms(&self, user_id: &str) -> BoxFuture<'static, Result<Vec<Room>>> {
        let client = self.clone();
        let user_id = user_id.to_string();
        async move { client.fetch_rooms(&user_id).await }.boxed()
    }

    fn room_history(&self, room_id: &str) -> BoxFuture<'static, Result<Vec<Message>>> {
        let client = self.clone();
        let room_id = room_id.to_string();
        async move { client.fetch_history(&room_id).await }.boxed()
    }
}

/// List the user's rooms (CLI output)
pub async fn list_rooms(client: &ApiClient, session: &Session) -> Result<()> {
    let rooms = client.fetch_rooms(&session.user_id).await?;

    println!("\nChats:");
    println!("{:-<60}", "");

    if rooms.is_empty() {
        println!("  (no conversations yet)");
        return Ok(());
    }

    for room in &rooms {
        match room.last_activity_at {
            Some(at) => println!("{}  [Active, {}]", room.title(), format_date(at)),
            None => println!("{}", room.title()),
        }
        println!("  ID: {}", room.id);
        println!("  {}", room.preview());
        if !room.offered_skill.is_empty() || !room.requested_skill.is_empty() {
            println!(
                "  Teaches: {}  Learns: {}",
                room.offered_skill, room.requested_skill
            );
        }
        println!();
    }
    Ok(())
}

/// Print a room's history (CLI output)
pub async fn show_history(client: &ApiClient, session: &Session, room_id: &str) -> Result<()> {
    let messages = client.fetch_history(room_id).await?;
    if messages.is_empty() {
        println!("(no messages)");
        return Ok(());
    }
    for msg in &messages {
        println!("{}", history_line(msg, &session.user_id));
    }
    Ok(())
}

fn history_line(msg: &Message, me: &str) -> String {
    let sender = if msg.is_from(me) {
        "You"
    } else {
        msg.sender_id.as_str()
    };
    format!("[{}] {}: {}", time_label(msg.created_at), sender, msg.content)
}

/// Create a room with another user (CLI output)
pub async fn create_room(
    client: &ApiClient,
    session: &Session,
    other_user_id: &str,
    exchange_request_id: &str,
) -> Result<()> {
    let request = CreateRoomRequest {
        user1_id: session.user_id.clone(),
        user2_id: other_user_id.to_string(),
        exchange_request_id: exchange_request_id.to_string(),
    };
    let room = client.create_room(&request).await?;
    println!("Room created: {}", room.id);
    if !room.other_user.full_name.is_empty() {
        println!("  With: {}", room.title());
    }
    Ok(())
}
