//! Realtime transport: one STOMP-over-WebSocket connection multiplexed into
//! topic subscriptions.
//!
//! A background task owns the socket. It reconnects after a fixed delay for
//! as long as the transport is active, re-subscribes every live topic after
//! each reconnect, and exchanges heart-beats to spot half-open connections.
//! Everything else talks to it through a cheap, cloneable [`Transport`]
//! handle.

pub mod stomp;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use stomp::{Command, Frame};
use websocket::{Incoming, StompSocket};

/// How long a graceful DISCONNECT waits for the server's RECEIPT.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No live connection. Publishes are never buffered.
    #[error("not connected")]
    NotConnected,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server sent an ERROR frame.
    #[error("server error: {0}")]
    Server(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] stomp::StompError),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("connection closed by server")]
    Closed,

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Observable connection state. Owned by the transport; everyone else only
/// reads it through [`Transport::state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or torn down by [`Transport::disconnect`].
    Idle,
    Connecting,
    Connected,
    /// Lost the connection; a retry is scheduled.
    Reconnecting { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Short human-readable description for status bars.
    pub fn describe(&self) -> String {
        match self {
            ConnectionState::Idle => "Offline".to_string(),
            ConnectionState::Connecting => "Connecting...".to_string(),
            ConnectionState::Connected => "Connected".to_string(),
            ConnectionState::Reconnecting { reason } => format!("Reconnecting ({})", reason),
        }
    }
}

/// Connection settings for one transport instance.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Value for the STOMP `host` header.
    pub host: String,
    /// Bearer token sent on the upgrade request and CONNECT frame.
    pub bearer: Option<String>,
    pub reconnect_delay: Duration,
    /// Heart-beat we offer in both directions. Zero disables heart-beats.
    pub heartbeat: Duration,
    /// Bound on WebSocket open + CONNECTED.
    pub connect_timeout: Duration,
}

/// One MESSAGE frame body delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub body: String,
}

struct TopicEntry {
    sub_id: String,
    handlers: HashMap<u64, mpsc::UnboundedSender<Delivery>>,
}

#[derive(Default)]
struct Registry {
    next_handler: u64,
    next_sub: u64,
    topics: HashMap<String, TopicEntry>,
    /// Writer into the live connection; `None` while disconnected.
    outbound: Option<mpsc::UnboundedSender<Frame>>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Inner {
    config: TransportConfig,
    state: watch::Sender<ConnectionState>,
    registry: Mutex<Registry>,
    running: Mutex<Option<Running>>,
}

/// Lock a std mutex, recovering from poisoning. A panicked subscriber must
/// not take the transport down with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn subscribe_frame(topic: &str, sub_id: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .header("id", sub_id)
        .header("destination", topic)
        .header("ack", "auto")
}

impl Inner {
    /// Hand the registry a writer for a fresh connection and (re)subscribe
    /// every known topic on it. Returns the number of topics.
    fn attach(&self, outbound: mpsc::UnboundedSender<Frame>) -> usize {
        let mut reg = lock(&self.registry);
        for (topic, entry) in &reg.topics {
            tracing::debug!("Subscribing {} ({})", topic, entry.sub_id);
            let _ = outbound.send(subscribe_frame(topic, &entry.sub_id));
        }
        reg.outbound = Some(outbound);
        reg.topics.len()
    }

    fn detach(&self) {
        lock(&self.registry).outbound = None;
    }

    fn remove_handler(&self, topic: &str, handler_id: u64) {
        let mut reg = lock(&self.registry);
        let now_empty = match reg.topics.get_mut(topic) {
            Some(entry) => {
                entry.handlers.remove(&handler_id);
                entry.handlers.is_empty()
            }
            None => return,
        };
        if !now_empty {
            return;
        }
        if let Some(entry) = reg.topics.remove(topic) {
            tracing::info!("Unsubscribing from {}", topic);
            if let Some(ref out) = reg.outbound {
                let _ = out.send(Frame::new(Command::Unsubscribe).header("id", entry.sub_id));
            }
        }
    }

    /// Route a MESSAGE frame to the handlers of its topic. Matches on the
    /// `subscription` header first, then on `destination`.
    fn dispatch(&self, frame: &Frame) {
        let mut reg = lock(&self.registry);
        let by_sub = frame.get("subscription").and_then(|sub| {
            reg.topics
                .iter()
                .find(|(_, e)| e.sub_id == sub)
                .map(|(t, _)| t.clone())
        });
        let topic = by_sub.or_else(|| {
            frame
                .get("destination")
                .filter(|d| reg.topics.contains_key(*d))
                .map(String::from)
        });

        let Some(topic) = topic else {
            tracing::debug!(
                "No subscriber for MESSAGE on {}",
                frame.get("destination").unwrap_or("?")
            );
            return;
        };

        if let Some(entry) = reg.topics.get_mut(&topic) {
            let delivery = Delivery {
                topic: topic.clone(),
                body: frame.body.clone(),
            };
            entry
                .handlers
                .retain(|_, tx| tx.send(delivery.clone()).is_ok());
        }
    }
}

/// Held only by [`Transport`] handles, never by the background task. When
/// the last handle goes the task is told to stop.
struct Owner {
    inner: Arc<Inner>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        if let Some(running) = lock(&self.inner.running).take() {
            tracing::debug!("Last handle to {} dropped, stopping", self.inner.config.url);
            let _ = running.shutdown.send(true);
        }
    }
}

/// Handle to a realtime connection. Clones share the same connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
    _owner: Arc<Owner>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let inner = Arc::new(Inner {
            config,
            state,
            registry: Mutex::new(Registry::default()),
            running: Mutex::new(None),
        });
        Self {
            _owner: Arc::new(Owner {
                inner: Arc::clone(&inner),
            }),
            inner,
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    /// Watch the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    /// Start connecting. A no-op while already connecting or connected.
    pub fn connect(&self) {
        let mut running = lock(&self.inner.running);
        if let Some(ref r) = *running {
            if !r.task.is_finished() {
                tracing::debug!("Transport to {} already active", self.inner.config.url);
                return;
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        self.inner.state.send_replace(ConnectionState::Connecting);
        let task = tokio::spawn(run(Arc::clone(&self.inner), shutdown_rx));
        *running = Some(Running { shutdown, task });
    }

    /// Stop the connection and cancel any pending reconnect.
    ///
    /// Frames already handed to [`publish`](Self::publish) are flushed before
    /// the DISCONNECT. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let running = lock(&self.inner.running).take();
        if let Some(Running { shutdown, task }) = running {
            let _ = shutdown.send(true);
            if let Err(e) = task.await {
                tracing::warn!("Transport task ended abnormally: {}", e);
            }
        }
        self.inner.detach();
        self.inner.state.send_replace(ConnectionState::Idle);
    }

    /// Register interest in `topic`.
    ///
    /// Works before the connection is up: the SUBSCRIBE goes out as soon as
    /// it is. Several handles may share a topic; the server-side subscription
    /// lives until the last one is released.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut reg = lock(&self.inner.registry);
        let Registry {
            next_handler,
            next_sub,
            topics,
            outbound,
        } = &mut *reg;

        let handler_id = *next_handler;
        *next_handler += 1;

        let entry = topics.entry(topic.to_string()).or_insert_with(|| {
            let sub_id = format!("sub-{}", next_sub);
            *next_sub += 1;
            match outbound {
                Some(out) => {
                    tracing::info!("Subscribing to {}", topic);
                    let _ = out.send(subscribe_frame(topic, &sub_id));
                }
                None => tracing::debug!("Queued subscription to {} until connected", topic),
            }
            TopicEntry {
                sub_id,
                handlers: HashMap::new(),
            }
        });
        entry.handlers.insert(handler_id, tx);

        Subscription {
            topic: topic.to_string(),
            handler_id,
            rx,
            inner: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Serialize `payload` as JSON and SEND it to `destination`.
    ///
    /// Fails with [`TransportError::NotConnected`] unless the connection is
    /// live. Nothing is queued for later.
    pub fn publish<T: Serialize + ?Sized>(
        &self,
        destination: &str,
        payload: &T,
    ) -> Result<(), TransportError> {
        let body = serde_json::to_string(payload)?;
        let reg = lock(&self.inner.registry);
        let out = reg.outbound.as_ref().ok_or(TransportError::NotConnected)?;
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body);
        tracing::debug!("Publishing to {}", destination);
        out.send(frame).map_err(|_| TransportError::NotConnected)
    }
}

/// A handle on one topic subscription.
///
/// Dropping it (or calling [`unsubscribe`](Self::unsubscribe)) deregisters
/// the handler.
pub struct Subscription {
    topic: String,
    handler_id: u64,
    rx: mpsc::UnboundedReceiver<Delivery>,
    inner: Weak<Inner>,
    active: bool,
}

impl Subscription {
    /// Next delivery on this topic. Survives reconnects; returns `None` only
    /// after [`unsubscribe`](Self::unsubscribe).
    pub async fn recv(&mut self) -> Option<Delivery> {
        if !self.active {
            return None;
        }
        self.rx.recv().await
    }

    /// Stop receiving. Frames still in flight are discarded. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        self.rx.close();
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_handler(&self.topic, self.handler_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Reconnect loop. Exits only on shutdown.
async fn run(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let delay = inner.config.reconnect_delay;

    loop {
        let reason = match run_session(&inner, &mut shutdown).await {
            Ok(()) => break,
            Err(e) => e.to_string(),
        };
        inner.detach();

        tracing::warn!(
            "Realtime connection to {} lost: {}. Reconnecting in {:?}...",
            inner.config.url,
            reason,
            delay
        );
        inner
            .state
            .send_replace(ConnectionState::Reconnecting { reason });

        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
        inner.state.send_replace(ConnectionState::Connecting);
    }

    inner.detach();
    tracing::info!("Realtime connection to {} stopped", inner.config.url);
}

/// Open the socket and complete the STOMP handshake.
async fn handshake(config: &TransportConfig) -> Result<(StompSocket, Frame), TransportError> {
    let mut socket = StompSocket::connect(&config.url, config.bearer.as_deref()).await?;

    let hb = config.heartbeat.as_millis();
    let mut connect = Frame::new(Command::Connect)
        .header("accept-version", "1.2")
        .header("host", config.host.as_str())
        .header("heart-beat", format!("{},{}", hb, hb));
    if let Some(ref token) = config.bearer {
        connect = connect.header("Authorization", format!("Bearer {}", token));
    }
    socket.send_frame(&connect).await?;

    loop {
        match socket.recv().await? {
            Some(Incoming::Frame(frame)) if frame.command == Command::Connected => {
                return Ok((socket, frame));
            }
            Some(Incoming::Frame(frame)) if frame.command == Command::Error => {
                return Err(TransportError::Server(error_message(&frame)));
            }
            Some(Incoming::Frame(frame)) => {
                return Err(TransportError::Handshake(format!(
                    "expected CONNECTED, got {}",
                    frame.command
                )));
            }
            Some(Incoming::Heartbeat | Incoming::Malformed) => continue,
            None => return Err(TransportError::Closed),
        }
    }
}

/// One connected session. `Ok(())` means shutdown was requested.
async fn run_session(
    inner: &Inner,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let config = &inner.config;

    let (mut socket, connected) = tokio::select! {
        result = time::timeout(config.connect_timeout, handshake(config)) => {
            result.map_err(|_| TransportError::Timeout("STOMP handshake"))??
        }
        _ = shutdown.changed() => return Ok(()),
    };

    let offered = config.heartbeat.as_millis() as u64;
    let (send_every, expect_every) =
        stomp::negotiate_heartbeat((offered, offered), connected.heart_beat());

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let topics = inner.attach(out_tx);
    inner.state.send_replace(ConnectionState::Connected);
    tracing::info!(
        "STOMP connected to {} (version={}, {} topic(s), heart-beat out={:?} in={:?})",
        config.url,
        connected.get("version").unwrap_or("?"),
        topics,
        send_every,
        expect_every
    );

    // Intervals must be non-zero even when the branch is disabled.
    let idle = Duration::from_secs(60);
    let mut heartbeat = time::interval(send_every.unwrap_or(idle));
    heartbeat.tick().await; // skip first immediate tick
    let mut liveness = time::interval(expect_every.unwrap_or(idle));
    liveness.tick().await;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming? {
                    Some(Incoming::Heartbeat | Incoming::Malformed) => last_seen = Instant::now(),
                    Some(Incoming::Frame(frame)) => {
                        last_seen = Instant::now();
                        match frame.command {
                            Command::Message => inner.dispatch(&frame),
                            Command::Error => {
                                return Err(TransportError::Server(error_message(&frame)));
                            }
                            other => tracing::debug!("Ignoring {} frame", other),
                        }
                    }
                    None => return Err(TransportError::Closed),
                }
            }
            Some(frame) = out_rx.recv() => {
                socket.send_frame(&frame).await?;
            }
            _ = heartbeat.tick(), if send_every.is_some() => {
                socket.send_heartbeat().await?;
            }
            _ = liveness.tick(), if expect_every.is_some() => {
                if let Some(expected) = expect_every {
                    if last_seen.elapsed() > expected * 2 {
                        return Err(TransportError::Timeout("server heart-beat"));
                    }
                }
            }
            _ = shutdown.changed() => {
                inner.detach();
                while let Ok(frame) = out_rx.try_recv() {
                    socket.send_frame(&frame).await?;
                }
                graceful_disconnect(&mut socket).await;
                return Ok(());
            }
        }
    }
}

/// Send DISCONNECT with a receipt and give the server a moment to confirm.
async fn graceful_disconnect(socket: &mut StompSocket) {
    let receipt = uuid::Uuid::new_v4().to_string();
    let frame = Frame::new(Command::Disconnect).header("receipt", receipt.as_str());
    if let Err(e) = socket.send_frame(&frame).await {
        tracing::debug!("DISCONNECT send failed: {}", e);
        return;
    }

    let wait = async {
        loop {
            match socket.recv().await {
                Ok(Some(Incoming::Frame(f)))
                    if f.command == Command::Receipt
                        && f.get("receipt-id") == Some(receipt.as_str()) =>
                {
                    return;
                }
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return,
            }
        }
    };
    if time::timeout(RECEIPT_TIMEOUT, wait).await.is_err() {
        tracing::debug!("No RECEIPT for DISCONNECT within {:?}", RECEIPT_TIMEOUT);
    }
    socket.close().await;
}

fn error_message(frame: &Frame) -> String {
    let summary = frame.get("message").unwrap_or("ERROR frame");
    if frame.body.trim().is_empty() {
        summary.to_string()
    } else {
        format!("{}: {}", summary, frame.body.trim())
    }
}
