//! Realtime chat core: per-room sessions and the conversation list
//!
//! REST history and publishing sit behind the [`ChatBackend`] and [`Outbox`]
//! traits, so the state machines here run against in-memory fakes in tests.

pub mod conversations;
pub mod room;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use tokio::time as tokio_time;

use crate::api::client::ApiClient;
use crate::auth::Session;
use crate::config::Config;
use crate::models::{Message, Room};
use crate::notifications::{NotificationChannel, Toasts};
use crate::realtime::{ConnectionState, Transport, TransportError};

/// Destination for outgoing chat messages.
pub const SEND_DESTINATION: &str = "/app/chat.send";

/// Topic carrying a room's messages.
pub fn room_topic(room_id: &str) -> String {
    format!("/topic/room/{}", room_id)
}

/// Topic carrying activity signals for a user.
pub fn user_topic(user_id: &str) -> String {
    format!("/topic/user/{}", user_id)
}

/// Where rooms and history come from.
pub trait ChatBackend: Send + Sync {
    fn list_rooms(&self, user_id: &str) -> BoxFuture<'static, Result<Vec<Room>>>;
    fn room_history(&self, room_id: &str) -> BoxFuture<'static, Result<Vec<Message>>>;
}

/// Where outgoing messages go.
pub trait Outbox {
    fn is_connected(&self) -> bool;
    fn publish_json(
        &self,
        destination: &str,
        body: &serde_json::Value,
    ) -> Result<(), TransportError>;
}

impl Outbox for Transport {
    fn is_connected(&self) -> bool {
        Transport::is_connected(self)
    }

    fn publish_json(
        &self,
        destination: &str,
        body: &serde_json::Value,
    ) -> Result<(), TransportError> {
        self.publish(destination, body)
    }
}

/// Wait until `transport` reports connected, up to `limit`.
pub async fn wait_connected(transport: &Transport, limit: Duration) -> Result<()> {
    let mut state = transport.state();
    let connected = matches!(
        tokio_time::timeout(limit, state.wait_for(ConnectionState::is_connected)).await,
        Ok(Ok(_))
    );
    if !connected {
        bail!(
            "Could not connect to {} within {:?} ({})",
            transport.url(),
            limit,
            state.borrow().describe()
        );
    }
    Ok(())
}

/// Publish one message to a room and exit.
pub async fn send_message(config: &Config, session: &Session, room_id: &str, text: &str) -> Result<()> {
    let api = ApiClient::new(config, Some(session));
    let rooms = api.fetch_rooms(&session.user_id).await?;
    let room = rooms
        .into_iter()
        .find(|r| r.id == room_id)
        .with_context(|| format!("No room {} for the current user", room_id))?;

    let transport = Transport::new(config.chat_transport(Some(session)));
    transport.connect();
    let limit = Duration::from_secs(config.realtime.connect_timeout_secs.max(1) + 1);
    if let Err(e) = wait_connected(&transport, limit).await {
        transport.disconnect().await;
        return Err(e);
    }

    let outcome = room::send(&transport, session, Some(&room), text);
    transport.disconnect().await;

    match outcome? {
        room::SendOutcome::Sent => println!("Message sent."),
        room::SendOutcome::Ignored => bail!("Nothing to send (empty message)"),
    }
    Ok(())
}

/// Headless mode: print activity signals and notifications until Ctrl+C.
pub async fn watch(config: &Config, session: &Session) -> Result<()> {
    let chat = Transport::new(config.chat_transport(Some(session)));
    let alerts = Transport::new(config.notifications_transport(Some(session)));
    let (toasts, mut toast_rx) = Toasts::channel();

    let mut activity = conversations::ActivityFeed::open(&chat, &session.user_id);
    let notifications = NotificationChannel::start(&alerts, Some(session), toasts);
    chat.connect();
    alerts.connect();

    println!(
        "Watching activity for {} (Ctrl+C to stop)...",
        session.display_name()
    );

    let mut chat_state = chat.state();
    loop {
        tokio::select! {
            signal = activity.next() => match signal {
                Some(signal) => println!("[activity] room {}", signal.room_id),
                None => break,
            },
            Some(toast) = toast_rx.recv() => {
                println!("[{}] {}", toast.kind.label(), toast.text);
            }
            changed = chat_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = chat_state.borrow_and_update().describe();
                println!("[status] {}", state);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    activity.close();
    drop(notifications);
    chat.disconnect().await;
    alerts.disconnect().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(room_topic("r1"), "/topic/room/r1");
        assert_eq!(user_topic("u1"), "/topic/user/u1");
    }
}
