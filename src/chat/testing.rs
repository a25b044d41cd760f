//! In-memory backend and outbox for chat tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;

use super::{ChatBackend, Outbox};
use crate::auth::Session;
use crate::models::{Message, Participant, Room};
use crate::realtime::TransportError;

pub(crate) fn message(id: &str, room_id: &str) -> Message {
    Message {
        id: id.to_string(),
        room_id: Some(room_id.to_string()),
        sender_id: "u2".to_string(),
        receiver_id: Some("u1".to_string()),
        content: format!("text of {}", id),
        created_at: None,
    }
}

pub(crate) fn room(id: &str, name: &str) -> Room {
    Room {
        id: id.to_string(),
        other_user: Participant {
            id: format!("user-{}", name.to_lowercase()),
            full_name: name.to_string(),
            email: None,
        },
        offered_skill: "Guitar".to_string(),
        requested_skill: "Rust".to_string(),
        last_activity_at: None,
        exchange_request_id: None,
    }
}

pub(crate) fn session(user_id: &str) -> Session {
    Session {
        user_id: user_id.to_string(),
        token: "token".to_string(),
        full_name: "Me".to_string(),
    }
}

enum History {
    Held(oneshot::Receiver<Result<Vec<Message>>>),
    Fail(String),
}

#[derive(Default)]
struct BackendState {
    rooms: Option<Result<Vec<Room>, String>>,
    history: HashMap<String, History>,
}

/// Rooms are returned as configured; history is empty unless held or failed.
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_rooms(rooms: Vec<Room>) -> Self {
        let backend = Self::new();
        backend.state.lock().unwrap().rooms = Some(Ok(rooms));
        backend
    }

    pub(crate) fn failing_rooms(reason: &str) -> Self {
        let backend = Self::new();
        backend.state.lock().unwrap().rooms = Some(Err(reason.to_string()));
        backend
    }

    /// Hold the next history fetch for `room_id` until the sender fires.
    pub(crate) fn hold_history(&self, room_id: &str) -> oneshot::Sender<Result<Vec<Message>>> {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .unwrap()
            .history
            .insert(room_id.to_string(), History::Held(rx));
        tx
    }

    pub(crate) fn fail_history(&self, room_id: &str, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .history
            .insert(room_id.to_string(), History::Fail(reason.to_string()));
    }
}

impl ChatBackend for FakeBackend {
    fn list_rooms(&self, _user_id: &str) -> BoxFuture<'static, Result<Vec<Room>>> {
        let result = match self.state.lock().unwrap().rooms.clone() {
            Some(Ok(rooms)) => Ok(rooms),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Ok(Vec::new()),
        };
        async move { result }.boxed()
    }

    fn room_history(&self, room_id: &str) -> BoxFuture<'static, Result<Vec<Message>>> {
        let entry = self.state.lock().unwrap().history.remove(room_id);
        async move {
            match entry {
                Some(History::Held(rx)) => rx.await.map_err(|_| anyhow!("history sender dropped"))?,
                Some(History::Fail(reason)) => Err(anyhow!(reason)),
                None => Ok(Vec::new()),
            }
        }
        .boxed()
    }
}

/// Records publishes instead of sending them.
pub(crate) struct FakeOutbox {
    connected: bool,
    refuse: Mutex<bool>,
    sent: Mutex<Vec<(String, serde_json::Value)>>,
}

impl FakeOutbox {
    pub(crate) fn connected() -> Self {
        Self {
            connected: true,
            refuse: Mutex::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::connected()
        }
    }

    /// Report connected but fail the publish, as when the link drops
    /// between the check and the send.
    pub(crate) fn fail_with_not_connected(&self) {
        *self.refuse.lock().unwrap() = true;
    }

    pub(crate) fn sent(&self) -> Vec<(String, serde_json::Value)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Outbox for FakeOutbox {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish_json(
        &self,
        destination: &str,
        body: &serde_json::Value,
    ) -> Result<(), TransportError> {
        if *self.refuse.lock().unwrap() {
            return Err(TransportError::NotConnected);
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), body.clone()));
        Ok(())
    }
}
