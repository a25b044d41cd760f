//! WebSocket carrier for STOMP frames

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::stomp::{Frame, HEARTBEAT};
use super::TransportError;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// What arrived on the socket.
#[derive(Debug)]
pub enum Incoming {
    Frame(Frame),
    Heartbeat,
    /// Something arrived but could not be parsed. Still proof of life.
    Malformed,
}

pub struct StompSocket {
    stream: WsStream,
}

impl StompSocket {
    /// Open the WebSocket. The bearer token, when present, rides on the
    /// upgrade request as well as on the STOMP CONNECT frame.
    pub async fn connect(url: &str, bearer: Option<&str>) -> Result<Self, TransportError> {
        let mut request = url.into_client_request()?;
        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| TransportError::Handshake(format!("invalid bearer token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        tracing::info!("Connecting WebSocket to {}", url);

        let (stream, response) = connect_async(request).await?;

        tracing::info!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    /// Send one STOMP frame.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        tracing::debug!("STOMP send: {}", frame.command);
        self.stream.send(Message::Text(frame.encode())).await?;
        Ok(())
    }

    /// Send a heart-beat (a lone EOL).
    pub async fn send_heartbeat(&mut self) -> Result<(), TransportError> {
        self.stream.send(Message::Text(HEARTBEAT.to_string())).await?;
        Ok(())
    }

    /// Receive the next frame or heart-beat. Pings are answered by
    /// tungstenite itself.
    ///
    /// Returns `Ok(None)` once the server closes the socket. Frames that fail
    /// to parse are logged and reported as [`Incoming::Malformed`]; one bad
    /// frame never tears down the connection.
    pub async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        loop {
            let text = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Dropping non-UTF-8 binary frame: {}", e);
                        return Ok(Some(Incoming::Malformed));
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                    continue;
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            };

            match Frame::decode(&text) {
                Ok(Some(frame)) => {
                    tracing::debug!("STOMP recv: {}", frame.command);
                    return Ok(Some(Incoming::Frame(frame)));
                }
                Ok(None) => return Ok(Some(Incoming::Heartbeat)),
                Err(e) => {
                    tracing::warn!("Dropping malformed STOMP frame: {}", e);
                    return Ok(Some(Incoming::Malformed));
                }
            }
        }
    }

    /// Close the WebSocket, ignoring errors (the peer may already be gone).
    pub async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close: {}", e);
        }
    }
}
