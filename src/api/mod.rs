//! REST client for the SkillSwap backend

pub mod auth;
mod chat;
pub mod client;

use anyhow::Result;

use crate::auth::Session;
use crate::config::Config;
use client::ApiClient;

/// List the signed-in user's rooms
pub async fn list_rooms(config: &Config, session: &Session) -> Result<()> {
    let client = ApiClient::new(config, Some(session));
    chat::list_rooms(&client, session).await
}

/// Print the message history of a room
pub async fn show_history(config: &Config, session: &Session, room_id: &str) -> Result<()> {
    let client = ApiClient::new(config, Some(session));
    chat::show_history(&client, session, room_id).await
}

/// Create a room with another user for an accepted exchange request
pub async fn create_room(
    config: &Config,
    session: &Session,
    other_user_id: &str,
    exchange_request_id: &str,
) -> Result<()> {
    let client = ApiClient::new(config, Some(session));
    chat::create_room(&client, session, other_user_id, exchange_request_id).await
}
