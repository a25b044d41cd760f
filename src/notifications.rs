//! Per-user notification channel and transient toasts
//!
//! The channel lives as long as the signed-in session, independent of which
//! room (if any) is open. Every valid notification lands in a bounded
//! most-recent-first log and raises a toast.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::auth::Session;
use crate::models::Notification;
use crate::realtime::Transport;

/// Notifications kept in the recent list.
pub const RECENT_CAPACITY: usize = 50;

/// How long a toast stays on screen.
pub const TOAST_DURATION: Duration = Duration::from_secs(5);

/// Topic for a user's notifications.
pub fn notification_topic(user_id: &str) -> String {
    format!("/user/{}/queue/notifications", user_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

impl ToastKind {
    pub fn label(self) -> &'static str {
        match self {
            ToastKind::Success => "notice",
            ToastKind::Error => "error",
            ToastKind::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub text: String,
}

/// Sending half of the toast queue. Cloneable; sends never block and are
/// dropped silently once the display side is gone.
#[derive(Debug, Clone)]
pub struct Toasts {
    tx: mpsc::UnboundedSender<Toast>,
}

impl Toasts {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, kind: ToastKind, text: impl Into<String>) {
        let _ = self.tx.send(Toast {
            kind,
            text: text.into(),
        });
    }

    pub fn success(&self, text: impl Into<String>) {
        self.push(ToastKind::Success, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.push(ToastKind::Error, text);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.push(ToastKind::Info, text);
    }
}

/// Bounded, most-recent-first notification list.
#[derive(Debug)]
pub struct NotificationLog {
    items: VecDeque<Notification>,
    capacity: usize,
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::with_capacity(RECENT_CAPACITY)
    }
}

impl NotificationLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the front, evicting the oldest when full.
    pub fn push(&mut self, notification: Notification) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_back();
        }
        self.items.push_front(notification);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }
}

/// Live subscription to the user's notification topic.
pub struct NotificationChannel {
    log: Arc<Mutex<NotificationLog>>,
    pump: JoinHandle<()>,
}

impl NotificationChannel {
    /// Subscribe for the session's user. Returns `None` for an anonymous
    /// session; nothing is subscribed then.
    pub fn start(transport: &Transport, session: Option<&Session>, toasts: Toasts) -> Option<Self> {
        let Some(session) = session else {
            tracing::debug!("No session, notification channel not started");
            return None;
        };

        let topic = notification_topic(&session.user_id);
        let mut subscription = transport.subscribe(&topic);
        let log = Arc::new(Mutex::new(NotificationLog::default()));
        let pump_log = Arc::clone(&log);

        let pump = tokio::spawn(async move {
            while let Some(delivery) = subscription.recv().await {
                match Notification::parse(&delivery.body) {
                    Ok(notification) => {
                        tracing::info!("Notification: {}", notification.toast_text());
                        let text = notification.toast_text().to_string();
                        pump_log
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(notification);
                        toasts.success(text);
                    }
                    Err(e) => tracing::warn!("Dropping notification frame: {}", e),
                }
            }
        });

        tracing::info!("Notification channel started on {}", topic);
        Some(Self { log, pump })
    }

    /// Snapshot of the recent list, newest first.
    pub fn recent(&self) -> Vec<Notification> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Release the subscription.
    pub fn stop(&self) {
        self.pump.abort();
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        self.stop();
    }
}
