//! In-process STOMP broker for tests.
//!
//! Accepts any number of WebSocket connections on a loopback port, answers
//! CONNECT with CONNECTED (heart-beats off unless configured), tracks
//! subscriptions and records every client frame so tests can assert on what
//! was sent. The broker itself never sends heart-beats.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use super::stomp::{Command, Frame};
use super::{ConnectionState, TransportConfig};

struct Connection {
    tx: mpsc::UnboundedSender<Option<String>>,
    /// subscription id -> destination
    subscriptions: HashMap<String, String>,
}

#[derive(Default)]
struct BrokerState {
    accepted: usize,
    connections: HashMap<usize, Connection>,
    next_message: u64,
    /// `heart-beat` header on CONNECTED; `0,0` when unset.
    heart_beat: Option<String>,
    /// Leave CONNECT unanswered.
    mute: bool,
    heartbeats_received: usize,
}

pub(crate) struct FakeBroker {
    addr: SocketAddr,
    state: Arc<Mutex<BrokerState>>,
    frames: mpsc::UnboundedReceiver<Frame>,
}

impl FakeBroker {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(BrokerState::default()));
        let (frames_tx, frames) = mpsc::unbounded_channel();

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = accept_async(tcp).await else {
                    continue;
                };
                let (tx, rx) = mpsc::unbounded_channel();
                let id = {
                    let mut st = accept_state.lock().unwrap();
                    st.accepted += 1;
                    let id = st.accepted;
                    st.connections.insert(
                        id,
                        Connection {
                            tx,
                            subscriptions: HashMap::new(),
                        },
                    );
                    id
                };
                tokio::spawn(serve(
                    ws,
                    id,
                    rx,
                    Arc::clone(&accept_state),
                    frames_tx.clone(),
                ));
            }
        });

        Self { addr, state, frames }
    }

    pub(crate) fn url(&self) -> String {
        format!("ws://{}/api/ws-chat/websocket", self.addr)
    }

    /// Transport settings pointing at this broker with short test delays.
    pub(crate) fn config(&self) -> TransportConfig {
        TransportConfig {
            url: self.url(),
            host: "localhost".to_string(),
            bearer: None,
            reconnect_delay: Duration::from_millis(200),
            heartbeat: Duration::from_millis(10_000),
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Advertise `value` as the server heart-beat on later connections.
    pub(crate) fn set_heart_beat(&self, value: &str) {
        self.state.lock().unwrap().heart_beat = Some(value.to_string());
    }

    /// Stop answering CONNECT.
    pub(crate) fn set_mute(&self, mute: bool) {
        self.state.lock().unwrap().mute = mute;
    }

    /// Send an ERROR frame to every open connection.
    pub(crate) fn send_error(&self, message: &str) {
        let frame = Frame::new(Command::Error).header("message", message);
        self.send_raw(&frame.encode());
    }

    /// Client heart-beats received so far.
    pub(crate) fn heartbeat_count(&self) -> usize {
        self.state.lock().unwrap().heartbeats_received
    }

    /// Deliver a MESSAGE to every open connection.
    pub(crate) fn publish(&self, destination: &str, body: &str) {
        let mut st = self.state.lock().unwrap();
        st.next_message += 1;
        let message_id = format!("msg-{}", st.next_message);
        for conn in st.connections.values() {
            let mut frame = Frame::new(Command::Message)
                .header("destination", destination)
                .header("message-id", message_id.as_str());
            if let Some((sub_id, _)) = conn
                .subscriptions
                .iter()
                .find(|(_, dest)| dest.as_str() == destination)
            {
                frame = frame.header("subscription", sub_id.as_str());
            }
            let _ = conn.tx.send(Some(frame.with_body(body).encode()));
        }
    }

    /// Send a raw text message to every open connection.
    pub(crate) fn send_raw(&self, text: &str) {
        let st = self.state.lock().unwrap();
        for conn in st.connections.values() {
            let _ = conn.tx.send(Some(text.to_string()));
        }
    }

    /// Abruptly drop every open connection.
    pub(crate) fn drop_connections(&self) {
        let st = self.state.lock().unwrap();
        for conn in st.connections.values() {
            let _ = conn.tx.send(None);
        }
    }

    /// Connections accepted so far, open or not.
    pub(crate) fn connection_count(&self) -> usize {
        self.state.lock().unwrap().accepted
    }

    /// Live subscriptions to `destination` across open connections.
    pub(crate) fn subscription_count(&self, destination: &str) -> usize {
        let st = self.state.lock().unwrap();
        st.connections
            .values()
            .flat_map(|c| c.subscriptions.values())
            .filter(|d| d.as_str() == destination)
            .count()
    }

    /// Wait for the next client frame with `command`, skipping others.
    pub(crate) async fn next_frame(&mut self, command: Command) -> Frame {
        let wait = async {
            loop {
                match self.frames.recv().await {
                    Some(frame) if frame.command == command => return frame,
                    Some(_) => continue,
                    None => panic!("broker stopped"),
                }
            }
        };
        time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap_or_else(|_| panic!("no {} frame within 5s", command))
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    id: usize,
    mut rx: mpsc::UnboundedReceiver<Option<String>>,
    state: Arc<Mutex<BrokerState>>,
    frames: mpsc::UnboundedSender<Frame>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                let frame = match Frame::decode(&text) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        state.lock().unwrap().heartbeats_received += 1;
                        continue;
                    }
                    Err(_) => continue,
                };
                let reply = match frame.command {
                    Command::Connect | Command::Stomp => {
                        let st = state.lock().unwrap();
                        (!st.mute).then(|| {
                            Frame::new(Command::Connected)
                                .header("version", "1.2")
                                .header("heart-beat", st.heart_beat.as_deref().unwrap_or("0,0"))
                        })
                    }
                    Command::Subscribe => {
                        if let (Some(sub), Some(dest)) = (frame.get("id"), frame.get("destination")) {
                            let mut st = state.lock().unwrap();
                            if let Some(conn) = st.connections.get_mut(&id) {
                                conn.subscriptions.insert(sub.to_string(), dest.to_string());
                            }
                        }
                        None
                    }
                    Command::Unsubscribe => {
                        if let Some(sub) = frame.get("id") {
                            let mut st = state.lock().unwrap();
                            if let Some(conn) = st.connections.get_mut(&id) {
                                conn.subscriptions.remove(sub);
                            }
                        }
                        None
                    }
                    Command::Disconnect => frame
                        .get("receipt")
                        .map(|r| Frame::new(Command::Receipt).header("receipt-id", r)),
                    _ => None,
                };
                let _ = frames.send(frame);
                if let Some(reply) = reply {
                    if sink.send(Message::Text(reply.encode())).await.is_err() {
                        break;
                    }
                }
            }
            out = rx.recv() => {
                match out {
                    Some(Some(text)) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    _ => break,
                }
            }
        }
    }

    state.lock().unwrap().connections.remove(&id);
}

/// Wait until the watched state satisfies `pred`.
pub(crate) async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    pred: impl Fn(&ConnectionState) -> bool,
) {
    let wait = async {
        loop {
            if pred(&rx.borrow_and_update()) {
                return;
            }
            if rx.changed().await.is_err() {
                panic!("transport dropped");
            }
        }
    };
    time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("state never reached; last {:?}", *rx.borrow()));
}
