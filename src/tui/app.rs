//! TUI application state and main event loop

use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::future::BoxFuture;
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::sync::mpsc;

use super::compose::ComposeState;
use super::log_capture::LogBuffer;
use super::messages::MessagesState;
use super::sidebar::SidebarState;
use super::ui;
use crate::api::client::ApiClient;
use crate::auth::Session;
use crate::chat::conversations::{ActivityFeed, ConversationList};
use crate::chat::room::{RoomEvent, RoomSession, SendError, SendOutcome};
use crate::config::Config;
use crate::models::Room;
use crate::notifications::{NotificationChannel, Toast, Toasts, TOAST_DURATION};
use crate::realtime::{ConnectionState, Transport};

/// Housekeeping interval: toast expiry and redraws.
const TICK: Duration = Duration::from_millis(250);

/// Lines moved per PageUp/PageDown.
const PAGE_LINES: usize = 10;

const ROOMS_FAILED: &str = "Something went wrong. Unable to fetch all chats";

/// Pane that receives keystrokes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    #[default]
    Sidebar,
    Compose,
}

impl Pane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pane::Sidebar => "chats",
            Pane::Compose => "compose",
        }
    }

    fn toggle(self) -> Self {
        match self {
            Pane::Sidebar => Pane::Compose,
            Pane::Compose => Pane::Sidebar,
        }
    }
}

/// Full-screen popups drawn over the main layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    #[default]
    None,
    Logs,
    Notifications,
}

/// Application state
pub struct App {
    pub session: Session,
    pub list: ConversationList,
    pub sidebar: SidebarState,
    pub room: Option<RoomSession>,
    pub compose: ComposeState,
    pub messages: MessagesState,
    pub active_pane: Pane,
    pub overlay: Overlay,
    pub connection: ConnectionState,
    /// Whether the chat link has been up at least once this run.
    was_connected: bool,
    pub toast: Option<(Toast, Instant)>,
    pub notifications: Option<NotificationChannel>,
    pub logs: LogBuffer,
    pub should_exit: bool,
    api: ApiClient,
    chat: Transport,
    toasts: Toasts,
}

impl App {
    fn new(
        session: Session,
        api: ApiClient,
        chat: Transport,
        notifications: Option<NotificationChannel>,
        toasts: Toasts,
        logs: LogBuffer,
    ) -> Self {
        Self {
            session,
            list: ConversationList::new(),
            sidebar: SidebarState::default(),
            room: None,
            compose: ComposeState::default(),
            messages: MessagesState::default(),
            active_pane: Pane::default(),
            overlay: Overlay::default(),
            connection: ConnectionState::Idle,
            was_connected: false,
            toast: None,
            notifications,
            logs,
            should_exit: false,
            api,
            chat,
            toasts,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    fn show_toast(&mut self, toast: Toast) {
        self.toast = Some((toast, Instant::now()));
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        tracing::debug!("Chat connection: {}", state.describe());
        if state.is_connected() && !self.connection.is_connected() {
            if self.was_connected {
                self.toasts.info("Reconnected");
            }
            self.was_connected = true;
        }
        self.connection = state;
    }

    fn expire_toast(&mut self) {
        if let Some((_, shown)) = self.toast {
            if shown.elapsed() >= TOAST_DURATION {
                self.toast = None;
            }
        }
    }

    /// Switch the message pane to `room_id`. The previous room's session is
    /// dropped first, releasing its subscription.
    fn open_room(&mut self, room_id: &str) {
        if self.room.as_ref().map(|r| r.room().id.as_str()) == Some(room_id) {
            return;
        }
        let Some(room) = self.list.select(room_id).cloned() else {
            return;
        };
        self.room = None;
        self.messages.reset();
        self.sidebar.cursor = Some(room.id.clone());
        self.room = Some(RoomSession::open(&room, &self.api, &self.chat));
    }

    fn rooms_loaded(&mut self, result: Result<Vec<Room>>) {
        match self.list.apply(result) {
            Ok(Some(first)) => self.open_room(&first),
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Failed to fetch rooms: {:#}", e);
                self.toasts.error(ROOMS_FAILED);
            }
        }
    }

    fn room_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Live(ingest) if ingest.signals_activity() => {
                if let Some(id) = self.room.as_ref().map(|r| r.room().id.clone()) {
                    self.list.notify_activity(&id);
                }
            }
            RoomEvent::HistoryFailed(_) => {
                self.toasts.error("Failed to fetch messages");
            }
            RoomEvent::Live(_) | RoomEvent::HistoryLoaded { .. } | RoomEvent::Malformed(_) => {}
        }
    }

    fn send_compose(&mut self) {
        let Some(ref room) = self.room else {
            return;
        };
        match room.send(&self.chat, &self.session, &self.compose.input) {
            Ok(SendOutcome::Sent) => {
                self.compose.clear();
                self.messages.reset();
            }
            Ok(SendOutcome::Ignored) => {}
            Err(SendError::NotConnected) => {
                self.toasts.error(SendError::NotConnected.to_string());
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.toasts.error("Failed to send message");
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if ctrl {
            match key.code {
                KeyCode::Char('c') => {
                    self.should_exit = true;
                    return;
                }
                KeyCode::Char('l') => {
                    self.overlay = toggle_overlay(self.overlay, Overlay::Logs);
                    return;
                }
                KeyCode::Char('n') => {
                    self.overlay = toggle_overlay(self.overlay, Overlay::Notifications);
                    return;
                }
                _ => {}
            }
        }

        if self.overlay != Overlay::None {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
                self.overlay = Overlay::None;
            }
            return;
        }

        match key.code {
            KeyCode::Tab => {
                self.active_pane = self.active_pane.toggle();
                return;
            }
            KeyCode::PageUp => {
                self.messages.scroll_up(PAGE_LINES);
                return;
            }
            KeyCode::PageDown => {
                self.messages.scroll_down(PAGE_LINES);
                return;
            }
            _ => {}
        }

        match self.active_pane {
            Pane::Sidebar => self.handle_sidebar_key(key),
            Pane::Compose => self.handle_compose_key(key, ctrl),
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        if self.sidebar.filtering {
            match key.code {
                KeyCode::Esc => self.sidebar.clear_filter(),
                KeyCode::Enter => self.sidebar.filtering = false,
                KeyCode::Backspace => self.sidebar.pop_filter(),
                KeyCode::Char(c) => self.sidebar.push_filter(c),
                KeyCode::Up => self.sidebar.move_up(&self.list),
                KeyCode::Down => self.sidebar.move_down(&self.list),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_exit = true,
            KeyCode::Char('/') => self.sidebar.filtering = true,
            KeyCode::Esc => self.sidebar.clear_filter(),
            KeyCode::Up | KeyCode::Char('k') => self.sidebar.move_up(&self.list),
            KeyCode::Down | KeyCode::Char('j') => self.sidebar.move_down(&self.list),
            KeyCode::Enter => {
                if let Some(id) = self.sidebar.cursor_room(&self.list).map(|r| r.id.clone()) {
                    self.open_room(&id);
                    self.active_pane = Pane::Compose;
                }
            }
            _ => {}
        }
    }

    fn handle_compose_key(&mut self, key: KeyEvent, ctrl: bool) {
        match key.code {
            KeyCode::Char('u') if ctrl => self.compose.clear(),
            KeyCode::Enter => self.send_compose(),
            KeyCode::Esc => self.active_pane = Pane::Sidebar,
            KeyCode::Backspace => self.compose.backspace(),
            KeyCode::Delete => self.compose.delete(),
            KeyCode::Left => self.compose.move_left(),
            KeyCode::Right => self.compose.move_right(),
            KeyCode::Home => self.compose.move_home(),
            KeyCode::End => self.compose.move_end(),
            KeyCode::Char(c) if !ctrl => self.compose.insert_char(c),
            _ => {}
        }
    }
}

fn toggle_overlay(current: Overlay, wanted: Overlay) -> Overlay {
    if current == wanted {
        Overlay::None
    } else {
        wanted
    }
}

/// Next event from the open room; never resolves when no room is open.
async fn next_room_event(room: &mut Option<RoomSession>) -> Option<RoomEvent> {
    match room.as_mut() {
        Some(session) => session.next_event().await,
        None => std::future::pending().await,
    }
}

async fn pending_rooms(fetch: &mut Option<BoxFuture<'static, Result<Vec<Room>>>>) -> Result<Vec<Room>> {
    match fetch.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// Run the TUI until the user quits. The terminal is restored on every
/// exit path.
pub async fn run(config: &Config, session: Session, logs: LogBuffer) -> Result<()> {
    let api = ApiClient::new(config, Some(&session));
    let chat = Transport::new(config.chat_transport(Some(&session)));
    let alerts = Transport::new(config.notifications_transport(Some(&session)));
    let (toasts, toast_rx) = Toasts::channel();

    let notifications = NotificationChannel::start(&alerts, Some(&session), toasts.clone());
    let activity = ActivityFeed::open(&chat, &session.user_id);
    chat.connect();
    alerts.connect();

    let app = App::new(session, api, chat.clone(), notifications, toasts, logs);

    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, app, activity, toast_rx).await;
    ratatui::restore();

    chat.disconnect().await;
    alerts.disconnect().await;
    result
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    mut app: App,
    mut activity: ActivityFeed,
    mut toast_rx: mpsc::UnboundedReceiver<Toast>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut state_rx = app.chat.state();
    let mut tick = tokio::time::interval(TICK);

    let mut rooms_fetch = Some(app.list.start_load(&app.api, &app.session.user_id));

    while !app.should_exit {
        terminal.draw(|frame| ui::render(frame, &app))?;

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => app.handle_key(key),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            result = pending_rooms(&mut rooms_fetch) => {
                rooms_fetch = None;
                app.rooms_loaded(result);
            }
            event = next_room_event(&mut app.room) => match event {
                Some(event) => app.room_event(event),
                None => app.room = None,
            },
            Some(signal) = activity.next() => {
                app.list.notify_activity(&signal.room_id);
            }
            Some(toast) = toast_rx.recv() => app.show_toast(toast),
            changed = state_rx.changed() => {
                if changed.is_ok() {
                    let state = state_rx.borrow_and_update().clone();
                    app.connection_changed(state);
                }
            }
            _ = tick.tick() => app.expire_toast(),
        }
    }

    activity.close();
    drop(app);
    Ok(())
}
