//! Conversation list: the user's rooms, most recently active first

use anyhow::Result;
use futures::future::BoxFuture;

use super::{user_topic, ChatBackend};
use crate::models::{ActivitySignal, Room};
use crate::realtime::{Subscription, Transport};

/// Ordered room list with the current selection.
///
/// Selection is tracked by room id, so reordering never changes which room
/// is selected.
#[derive(Debug, Default)]
pub struct ConversationList {
    rooms: Vec<Room>,
    selected: Option<String>,
    loading: bool,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == room_id)
    }

    /// Mark the list as loading and hand back the fetch. Feed its output to
    /// [`apply`](Self::apply).
    pub fn start_load(
        &mut self,
        backend: &dyn ChatBackend,
        user_id: &str,
    ) -> BoxFuture<'static, Result<Vec<Room>>> {
        self.loading = true;
        backend.list_rooms(user_id)
    }

    /// Take in the outcome of a fetch. Returns the auto-selected room id,
    /// if any.
    pub fn apply(&mut self, result: Result<Vec<Room>>) -> Result<Option<String>> {
        match result {
            Ok(rooms) => {
                tracing::info!("Loaded {} room(s)", rooms.len());
                Ok(self.load_finished(rooms))
            }
            Err(e) => {
                self.loading = false;
                Err(e)
            }
        }
    }

    /// Store rooms in server order. Selects the first room if nothing is
    /// selected yet and returns its id.
    pub fn load_finished(&mut self, rooms: Vec<Room>) -> Option<String> {
        self.loading = false;
        self.rooms = rooms;

        // A previous selection that vanished from the list is dropped.
        if let Some(ref id) = self.selected {
            if self.get(id).is_none() {
                self.selected = None;
            }
        }

        if self.selected.is_some() {
            return None;
        }
        let first = self.rooms.first()?.id.clone();
        self.selected = Some(first.clone());
        Some(first)
    }

    /// Fetch the user's rooms. Returns the auto-selected room id, if any.
    pub async fn load(&mut self, backend: &dyn ChatBackend, user_id: &str) -> Result<Option<String>> {
        let fetch = self.start_load(backend, user_id);
        self.apply(fetch.await)
    }

    /// Move `room_id` to the front, keeping the others in order. Returns
    /// whether anything moved.
    pub fn notify_activity(&mut self, room_id: &str) -> bool {
        match self.rooms.iter().position(|r| r.id == room_id) {
            Some(0) | None => false,
            Some(pos) => {
                let room = self.rooms.remove(pos);
                self.rooms.insert(0, room);
                true
            }
        }
    }

    /// Select a room by id. Unknown ids leave the selection unchanged.
    pub fn select(&mut self, room_id: &str) -> Option<&Room> {
        let idx = self.rooms.iter().position(|r| r.id == room_id)?;
        self.selected = Some(room_id.to_string());
        self.rooms.get(idx)
    }

    pub fn selected(&self) -> Option<&Room> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Rooms matching `query` (case-insensitive substring on name and skills).
    pub fn filtered(&self, query: &str) -> Vec<&Room> {
        self.rooms.iter().filter(|r| r.matches(query)).collect()
    }
}

/// Activity signals on the user topic.
pub struct ActivityFeed {
    subscription: Subscription,
}

impl ActivityFeed {
    pub fn open(transport: &Transport, user_id: &str) -> Self {
        Self {
            subscription: transport.subscribe(&user_topic(user_id)),
        }
    }

    /// Next well-formed signal. Malformed frames are logged and skipped.
    /// Cancel-safe.
    pub async fn next(&mut self) -> Option<ActivitySignal> {
        loop {
            let delivery = self.subscription.recv().await?;
            match ActivitySignal::parse(&delivery.body) {
                Ok(signal) => return Some(signal),
                Err(e) => tracing::warn!("Dropping activity frame: {}", e),
            }
        }
    }

    pub fn close(&mut self) {
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::{room, FakeBackend};
    use crate::realtime::stomp::Command;
    use crate::realtime::testing::FakeBroker;
    use std::time::Duration;
    use tokio::time;

    fn ids(list: &ConversationList) -> Vec<&str> {
        list.rooms().iter().map(|r| r.id.as_str()).collect()
    }

    fn loaded(names: &[&str]) -> ConversationList {
        let mut list = ConversationList::new();
        list.load_finished(names.iter().map(|id| room(id, id)).collect());
        list
    }

    #[test]
    fn test_load_keeps_server_order_and_selects_first() {
        let backend = FakeBackend::with_rooms(Vec::new());
        let mut list = ConversationList::new();
        let fetch = list.start_load(&backend, "u1");
        assert!(list.is_loading());
        drop(fetch);
        let picked = list
            .apply(Ok(vec![room("b", "Bob"), room("a", "Ann")]))
            .unwrap();
        assert_eq!(picked.as_deref(), Some("b"));
        assert_eq!(ids(&list), vec!["b", "a"]);
        assert!(!list.is_loading());
    }

    #[test]
    fn test_reload_keeps_existing_selection() {
        let mut list = loaded(&["a", "b"]);
        list.select("b");
        assert_eq!(list.load_finished(vec![room("a", "Ann"), room("b", "Bob")]), None);
        assert_eq!(list.selected_id(), Some("b"));

        // Selected room disappeared: fall back to the first.
        assert_eq!(
            list.load_finished(vec![room("c", "Cy")]).as_deref(),
            Some("c")
        );
    }

    #[test]
    fn test_notify_activity_moves_to_front() {
        let mut list = loaded(&["a", "b", "c", "d"]);
        assert!(list.notify_activity("c"));
        assert_eq!(ids(&list), vec!["c", "a", "b", "d"]);
        assert!(!list.notify_activity("c"));
        assert!(!list.notify_activity("zzz"));
        assert_eq!(ids(&list), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_notify_activity_is_idempotent() {
        let mut once = loaded(&["a", "b", "c"]);
        let mut twice = loaded(&["a", "b", "c"]);
        once.notify_activity("b");
        twice.notify_activity("b");
        twice.notify_activity("b");
        assert_eq!(ids(&once), ids(&twice));
    }

    #[test]
    fn test_selection_survives_reordering() {
        let mut list = loaded(&["a", "b", "c"]);
        assert_eq!(list.selected_id(), Some("a"));
        list.notify_activity("c");
        assert_eq!(list.selected().map(|r| r.id.as_str()), Some("a"));
        assert!(list.select("missing").is_none());
        assert_eq!(list.selected_id(), Some("a"));
    }

    #[test]
    fn test_filtered() {
        let mut list = ConversationList::new();
        let mut guitar = room("g", "Gina");
        guitar.offered_skill = "Guitar".to_string();
        let mut piano = room("p", "Paul");
        piano.offered_skill = "Piano".to_string();
        piano.requested_skill = "Cooking".to_string();
        list.load_finished(vec![guitar, piano]);

        let hits: Vec<_> = list.filtered("PIA").iter().map(|r| r.id.as_str()).collect();
        assert_eq!(hits, vec!["p"]);
        assert_eq!(list.filtered("").len(), 2);
        assert_eq!(list.filtered("gina").len(), 1);
    }

    #[tokio::test]
    async fn test_load_empty_list_selects_nothing() {
        let backend = FakeBackend::with_rooms(Vec::new());
        let mut list = ConversationList::new();
        assert_eq!(list.load(&backend, "u1").await.unwrap(), None);
        assert!(list.is_empty());
        assert!(list.selected().is_none());
    }

    #[tokio::test]
    async fn test_load_failure_clears_loading_flag() {
        let backend = FakeBackend::failing_rooms("offline");
        let mut list = ConversationList::new();
        tokio_test::assert_err!(list.load(&backend, "u1").await);
        assert!(!list.is_loading());
    }

    #[tokio::test]
    async fn test_activity_feed_opens_user_topic_even_without_rooms() {
        let mut broker = FakeBroker::start().await;
        let transport = Transport::new(broker.config());

        let backend = FakeBackend::with_rooms(Vec::new());
        let mut list = ConversationList::new();
        list.load(&backend, "u1").await.unwrap();

        let mut feed = ActivityFeed::open(&transport, "u1");
        transport.connect();
        let frame = broker.next_frame(Command::Subscribe).await;
        assert_eq!(frame.get("destination"), Some("/topic/user/u1"));

        broker.publish("/topic/user/u1", "{}");
        broker.publish("/topic/user/u1", r#"{"chatRoomId":"r7"}"#);
        let signal = time::timeout(Duration::from_secs(5), feed.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.room_id, "r7");
        // Unknown room: nothing to reorder.
        assert!(!list.notify_activity(&signal.room_id));

        // Only the user topic was opened.
        assert_eq!(broker.subscription_count("/topic/user/u1"), 1);
        feed.close();
        broker.next_frame(Command::Unsubscribe).await;
        transport.disconnect().await;
    }
}
