//! Chat room session: history and live messages merged into one list
//!
//! [`RoomTimeline`] is the synchronous merge state machine. [`RoomSession`]
//! wires it to a room topic subscription and a background history fetch.
//! A session is bound to exactly one room for its whole life; switching
//! rooms means dropping it and opening a new one, which releases the
//! subscription and abandons any fetch still in flight.

use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{room_topic, ChatBackend, Outbox, SEND_DESTINATION};
use crate::auth::Session;
use crate::models::{Message, Room, SendRequest};
use crate::realtime::{Subscription, Transport, TransportError};

/// Lifecycle of a room view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Idle,
    LoadingHistory,
    Live,
}

/// What happened to one live message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Appended,
    /// Held until history resolves.
    Queued,
    /// Already in the list, or already queued.
    Duplicate,
    /// Tagged for a different room; ignored.
    ForeignRoom,
}

impl Ingest {
    /// Whether the conversation list should treat this as room activity.
    pub fn signals_activity(self) -> bool {
        !matches!(self, Ingest::ForeignRoom)
    }
}

/// Ordered, de-duplicated message list for one room.
#[derive(Debug)]
pub struct RoomTimeline {
    room_id: String,
    phase: RoomPhase,
    messages: Vec<Message>,
    seen: HashSet<String>,
    /// Live messages that arrived before history.
    pending: Vec<Message>,
}

impl RoomTimeline {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            phase: RoomPhase::Idle,
            messages: Vec::new(),
            seen: HashSet::new(),
            pending: Vec::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == RoomPhase::LoadingHistory
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn begin_loading(&mut self) {
        self.phase = RoomPhase::LoadingHistory;
    }

    /// Install history, then append whatever was queued behind it.
    ///
    /// Ignored unless history is still pending, so a late duplicate response
    /// cannot reorder a live list.
    pub fn history_loaded(&mut self, history: Vec<Message>) {
        if self.phase == RoomPhase::Live {
            tracing::debug!("Ignoring late history for room {}", self.room_id);
            return;
        }
        for msg in history {
            self.push_unique(msg);
        }
        self.go_live();
    }

    /// History failed: continue with an empty backlog.
    pub fn history_failed(&mut self) {
        if self.phase == RoomPhase::Live {
            return;
        }
        self.go_live();
    }

    /// Take in one live message.
    pub fn ingest(&mut self, msg: Message) -> Ingest {
        if let Some(ref room) = msg.room_id {
            if *room != self.room_id {
                return Ingest::ForeignRoom;
            }
        }

        match self.phase {
            RoomPhase::Live => {
                if self.push_unique(msg) {
                    Ingest::Appended
                } else {
                    Ingest::Duplicate
                }
            }
            RoomPhase::Idle | RoomPhase::LoadingHistory => {
                if self.pending.iter().any(|m| m.id == msg.id) {
                    Ingest::Duplicate
                } else {
                    self.pending.push(msg);
                    Ingest::Queued
                }
            }
        }
    }

    fn go_live(&mut self) {
        for msg in std::mem::take(&mut self.pending) {
            self.push_unique(msg);
        }
        self.phase = RoomPhase::Live;
    }

    fn push_unique(&mut self, msg: Message) -> bool {
        if !self.seen.insert(msg.id.clone()) {
            return false;
        }
        self.messages.push(msg);
        true
    }
}

/// Something the room view should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    HistoryLoaded { count: usize },
    /// History could not be fetched; the room stays usable.
    HistoryFailed(String),
    Live(Ingest),
    /// A frame on the room topic did not parse.
    Malformed(String),
}

/// A send that was not attempted.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Connecting to server...")]
    NotConnected,

    #[error("Failed to send message: {0}")]
    Publish(#[source] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Blank text or no room: nothing to do.
    Ignored,
}

/// Publish a chat message to `room`.
///
/// Nothing is appended locally; the message shows up when the server echoes
/// it on the room topic.
pub fn send(
    outbox: &dyn Outbox,
    session: &Session,
    room: Option<&Room>,
    text: &str,
) -> Result<SendOutcome, SendError> {
    let content = text.trim();
    let Some(room) = room else {
        return Ok(SendOutcome::Ignored);
    };
    if content.is_empty() {
        return Ok(SendOutcome::Ignored);
    }
    if !outbox.is_connected() {
        return Err(SendError::NotConnected);
    }

    let request = SendRequest {
        sender_id: session.user_id.clone(),
        receiver_id: room.other_user.id.clone(),
        content: content.to_string(),
        chat_room_id: room.id.clone(),
    };
    let body =
        serde_json::to_value(&request).map_err(|e| SendError::Publish(TransportError::from(e)))?;

    match outbox.publish_json(SEND_DESTINATION, &body) {
        Ok(()) => {
            tracing::debug!("Sent message to room {}", room.id);
            Ok(SendOutcome::Sent)
        }
        Err(TransportError::NotConnected) => Err(SendError::NotConnected),
        Err(e) => Err(SendError::Publish(e)),
    }
}

type HistoryResult = anyhow::Result<Vec<Message>>;

/// The open view of one room.
pub struct RoomSession {
    room: Room,
    timeline: RoomTimeline,
    subscription: Subscription,
    history: Option<oneshot::Receiver<HistoryResult>>,
    fetch: Option<JoinHandle<()>>,
}

impl RoomSession {
    /// Start loading `room`: the history fetch and the topic subscription
    /// begin together.
    pub fn open(room: &Room, backend: &dyn ChatBackend, transport: &Transport) -> Self {
        let mut timeline = RoomTimeline::new(room.id.clone());
        timeline.begin_loading();

        let subscription = transport.subscribe(&room_topic(&room.id));

        let (tx, rx) = oneshot::channel();
        let fut = backend.room_history(&room.id);
        let fetch = tokio::spawn(async move {
            let _ = tx.send(fut.await);
        });

        tracing::info!("Opened room {} ({})", room.id, room.title());

        Self {
            room: room.clone(),
            timeline,
            subscription,
            history: Some(rx),
            fetch: Some(fetch),
        }
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn timeline(&self) -> &RoomTimeline {
        &self.timeline
    }

    /// Wait for the next history result or live frame and apply it.
    ///
    /// Cancel-safe. Returns `None` once the subscription has been released.
    pub async fn next_event(&mut self) -> Option<RoomEvent> {
        let Self {
            timeline,
            subscription,
            history,
            room,
            ..
        } = self;

        let history_ready = async {
            match history.as_mut() {
                Some(rx) => rx.await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = history_ready => {
                *history = None;
                match result {
                    Ok(Ok(messages)) => {
                        let count = messages.len();
                        timeline.history_loaded(messages);
                        Some(RoomEvent::HistoryLoaded { count })
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("History fetch for room {} failed: {:#}", room.id, e);
                        timeline.history_failed();
                        Some(RoomEvent::HistoryFailed(format!("{:#}", e)))
                    }
                    Err(_) => {
                        timeline.history_failed();
                        Some(RoomEvent::HistoryFailed("history fetch was cancelled".to_string()))
                    }
                }
            }
            delivery = subscription.recv() => {
                let delivery = delivery?;
                match Message::parse(&delivery.body) {
                    Ok(msg) => {
                        let outcome = timeline.ingest(msg);
                        tracing::debug!("Room {} frame: {:?}", room.id, outcome);
                        Some(RoomEvent::Live(outcome))
                    }
                    Err(e) => {
                        tracing::warn!("Dropping malformed frame on {}: {}", delivery.topic, e);
                        Some(RoomEvent::Malformed(e.to_string()))
                    }
                }
            }
        }
    }

    /// Send `text` to this room.
    pub fn send(
        &self,
        outbox: &dyn Outbox,
        session: &Session,
        text: &str,
    ) -> Result<SendOutcome, SendError> {
        send(outbox, session, Some(&self.room), text)
    }

    /// Release the subscription and abandon the history fetch. Frames that
    /// were already delivered are discarded.
    pub fn close(&mut self) {
        self.subscription.unsubscribe();
        self.history = None;
        if let Some(fetch) = self.fetch.take() {
            fetch.abort();
        }
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::{message, room, session, FakeBackend, FakeOutbox};
    use crate::realtime::stomp::Command;
    use crate::realtime::testing::{wait_for_state, FakeBroker};
    use crate::realtime::ConnectionState;
    use std::time::Duration;
    use tokio::time;

    fn ids(timeline: &RoomTimeline) -> Vec<&str> {
        timeline.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_live_after_history_appends() {
        let mut t = RoomTimeline::new("r1");
        t.begin_loading();
        t.history_loaded(vec![message("m1", "r1"), message("m2", "r1")]);
        assert_eq!(t.ingest(message("m3", "r1")), Ingest::Appended);
        assert_eq!(ids(&t), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_live_before_history_queues_behind() {
        let mut t = RoomTimeline::new("r1");
        t.begin_loading();
        assert_eq!(t.ingest(message("m3", "r1")), Ingest::Queued);
        assert!(t.messages().is_empty());
        t.history_loaded(vec![message("m1", "r1"), message("m2", "r1")]);
        assert_eq!(ids(&t), vec!["m1", "m2", "m3"]);
        assert_eq!(t.phase(), RoomPhase::Live);
    }

    #[test]
    fn test_replays_are_deduplicated() {
        let mut t = RoomTimeline::new("r1");
        t.begin_loading();
        assert_eq!(t.ingest(message("m2", "r1")), Ingest::Queued);
        assert_eq!(t.ingest(message("m2", "r1")), Ingest::Duplicate);
        t.history_loaded(vec![message("m1", "r1"), message("m2", "r1"), message("m1", "r1")]);
        assert_eq!(t.ingest(message("m1", "r1")), Ingest::Duplicate);
        assert_eq!(t.ingest(message("m3", "r1")), Ingest::Appended);
        assert_eq!(t.ingest(message("m3", "r1")), Ingest::Duplicate);
        assert_eq!(ids(&t), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_foreign_room_frames_are_ignored() {
        let mut t = RoomTimeline::new("r1");
        t.history_failed();
        assert_eq!(t.ingest(message("m1", "r2")), Ingest::ForeignRoom);
        assert!(!Ingest::ForeignRoom.signals_activity());

        let mut untagged = message("m2", "r1");
        untagged.room_id = None;
        assert_eq!(t.ingest(untagged), Ingest::Appended);
        assert_eq!(ids(&t), vec!["m2"]);
    }

    #[test]
    fn test_history_failure_keeps_queued_live_messages() {
        let mut t = RoomTimeline::new("r1");
        t.begin_loading();
        t.ingest(message("m9", "r1"));
        t.history_failed();
        assert_eq!(ids(&t), vec!["m9"]);
        assert!(!t.is_loading());
    }

    #[test]
    fn test_late_history_does_not_reorder() {
        let mut t = RoomTimeline::new("r1");
        t.begin_loading();
        t.history_loaded(vec![message("m1", "r1")]);
        t.ingest(message("m2", "r1"));
        t.history_loaded(vec![message("m0", "r1")]);
        assert_eq!(ids(&t), vec!["m1", "m2"]);
    }

    #[test]
    fn test_send_ignores_blank_text_and_missing_room() {
        let outbox = FakeOutbox::connected();
        let r = room("r1", "Ann");
        let me = session("u1");
        assert_eq!(send(&outbox, &me, Some(&r), "   ").unwrap(), SendOutcome::Ignored);
        assert_eq!(send(&outbox, &me, None, "hello").unwrap(), SendOutcome::Ignored);
        assert!(outbox.sent().is_empty());
    }

    #[test]
    fn test_send_while_disconnected_fails_visibly() {
        let outbox = FakeOutbox::disconnected();
        let err = send(&outbox, &session("u1"), Some(&room("r1", "Ann")), "hello").unwrap_err();
        assert!(matches!(err, SendError::NotConnected));
        assert_eq!(err.to_string(), "Connecting to server...");
        assert!(outbox.sent().is_empty());
    }

    #[test]
    fn test_send_publishes_one_request() {
        let outbox = FakeOutbox::connected();
        let r = room("r1", "Ann");
        let outcome = send(&outbox, &session("u1"), Some(&r), "  hello ").unwrap();
        assert_eq!(outcome, SendOutcome::Sent);

        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "/app/chat.send");
        assert_eq!(
            sent[0].1,
            serde_json::json!({
                "senderId": "u1",
                "receiverId": r.other_user.id,
                "content": "hello",
                "chatRoomId": "r1"
            })
        );
    }

    #[test]
    fn test_send_race_with_disconnect_maps_to_not_connected() {
        let outbox = FakeOutbox::connected();
        outbox.fail_with_not_connected();
        let err = send(&outbox, &session("u1"), Some(&room("r1", "Ann")), "hi").unwrap_err();
        assert!(matches!(err, SendError::NotConnected));
    }

    async fn next(session: &mut RoomSession) -> RoomEvent {
        time::timeout(Duration::from_secs(5), session.next_event())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_merges_frame_that_beats_history() {
        let mut broker = FakeBroker::start().await;
        let transport = Transport::new(broker.config());
        transport.connect();

        let backend = FakeBackend::new();
        let release = backend.hold_history("r1");
        let r = room("r1", "Ann");
        let mut session = RoomSession::open(&r, &backend, &transport);
        assert!(session.timeline().is_loading());

        // Subscription is opened while history is still pending.
        broker.next_frame(Command::Subscribe).await;
        broker.publish("/topic/room/r1", r#"{"id":"m3","chatRoomId":"r1","content":"live"}"#);
        assert_eq!(next(&mut session).await, RoomEvent::Live(Ingest::Queued));

        release
            .send(Ok(vec![message("m1", "r1"), message("m2", "r1")]))
            .unwrap();
        assert_eq!(next(&mut session).await, RoomEvent::HistoryLoaded { count: 2 });
        assert_eq!(ids(session.timeline()), vec!["m1", "m2", "m3"]);

        broker.publish("/topic/room/r1", r#"{"id":"m2","chatRoomId":"r1"}"#);
        assert_eq!(next(&mut session).await, RoomEvent::Live(Ingest::Duplicate));
        broker.publish("/topic/room/r1", "not json");
        assert!(matches!(next(&mut session).await, RoomEvent::Malformed(_)));
        assert_eq!(ids(session.timeline()), vec!["m1", "m2", "m3"]);

        drop(session);
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_history_failure_leaves_room_usable() {
        let broker = FakeBroker::start().await;
        let transport = Transport::new(broker.config());
        let backend = FakeBackend::new();
        backend.fail_history("r1", "boom");

        let mut session = RoomSession::open(&room("r1", "Ann"), &backend, &transport);
        match next(&mut session).await {
            RoomEvent::HistoryFailed(reason) => assert!(reason.contains("boom")),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(session.timeline().phase(), RoomPhase::Live);
        assert!(session.timeline().messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_through_transport_does_not_echo_locally() {
        let mut broker = FakeBroker::start().await;
        let transport = Transport::new(broker.config());
        transport.connect();
        wait_for_state(&mut transport.state(), ConnectionState::is_connected).await;

        let backend = FakeBackend::new();
        let mut session = RoomSession::open(&room("r1", "Ann"), &backend, &transport);
        assert_eq!(next(&mut session).await, RoomEvent::HistoryLoaded { count: 0 });

        let outcome = session.send(&transport, &crate::chat::testing::session("u1"), "hello");
        assert_eq!(outcome.unwrap(), SendOutcome::Sent);

        let frame = broker.next_frame(Command::Send).await;
        assert_eq!(frame.get("destination"), Some("/app/chat.send"));
        let body: serde_json::Value = serde_json::from_str(&frame.body).unwrap();
        assert_eq!(body["content"], "hello");
        assert_eq!(body["chatRoomId"], "r1");
        assert!(session.timeline().messages().is_empty());

        drop(session);
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_switching_rooms_isolates_frames() {
        let mut broker = FakeBroker::start().await;
        let transport = Transport::new(broker.config());
        transport.connect();

        let backend = FakeBackend::new();
        let mut a = RoomSession::open(&room("a", "Ann"), &backend, &transport);
        assert_eq!(next(&mut a).await, RoomEvent::HistoryLoaded { count: 0 });
        broker.next_frame(Command::Subscribe).await;

        // Leave room A for room B.
        a.close();
        assert!(a.next_event().await.is_none());
        broker.next_frame(Command::Unsubscribe).await;
        let mut b = RoomSession::open(&room("b", "Bob"), &backend, &transport);
        assert_eq!(next(&mut b).await, RoomEvent::HistoryLoaded { count: 0 });
        broker.next_frame(Command::Subscribe).await;

        // A frame for room A while B is selected.
        broker.publish("/topic/room/a", r#"{"id":"x1","chatRoomId":"a"}"#);
        broker.publish("/topic/room/b", r#"{"id":"y1","chatRoomId":"b"}"#);
        assert_eq!(next(&mut b).await, RoomEvent::Live(Ingest::Appended));
        assert_eq!(ids(b.timeline()), vec!["y1"]);

        // Re-selecting A starts from its history only.
        drop(b);
        let mut a = RoomSession::open(&room("a", "Ann"), &backend, &transport);
        assert_eq!(next(&mut a).await, RoomEvent::HistoryLoaded { count: 0 });
        assert!(a.timeline().messages().is_empty());

        drop(a);
        transport.disconnect().await;
    }
}
