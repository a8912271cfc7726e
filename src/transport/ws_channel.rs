use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::stomp::{Command, Frame};
use super::{ChannelEvent, Headers, PushChannel};
use crate::errors::AppError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// STOMP client over a plain WebSocket (the raw-socket transport of a
/// SockJS endpoint).
pub struct StompWsChannel {
    url: String,
    socket: Option<Socket>,
    next_subscription: u32,
}

impl StompWsChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), socket: None, next_subscription: 0 }
    }

    fn host(&self) -> String {
        reqwest::Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .unwrap_or_else(|| "localhost".to_string())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), AppError> {
        let socket = self.socket.as_mut().ok_or(AppError::NotConnected)?;
        socket.send(WsMessage::text(frame.encode())).await.map_err(|e| {
            warn!("WebSocket send failed: {e}");
            AppError::ChannelClosed
        })
    }
}

/// Next STOMP frame, skipping heart-beats and control messages.
/// `Ok(None)` means the socket is gone.
async fn read_frame(socket: &mut Socket) -> Result<Option<Frame>, AppError> {
    while let Some(msg) = socket.next().await {
        let text = match msg {
            Ok(WsMessage::Text(t)) => t.as_str().to_owned(),
            Ok(WsMessage::Binary(b)) => match String::from_utf8(b.to_vec()) {
                Ok(t) => t,
                Err(_) => continue,
            },
            Ok(WsMessage::Close(_)) => return Ok(None),
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket receive error: {e}");
                return Ok(None);
            }
        };
        if let Some(frame) = Frame::decode(&text)? {
            return Ok(Some(frame));
        }
    }
    Ok(None)
}

#[async_trait]
impl PushChannel for StompWsChannel {
    async fn connect(&mut self, headers: Headers) -> Result<(), AppError> {
        let (mut socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| AppError::connect(&self.url, e))?;

        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1")
            .header("host", self.host())
            .header("heart-beat", "0,0");
        for (name, value) in headers {
            frame = frame.header(name, value);
        }
        socket
            .send(WsMessage::text(frame.encode()))
            .await
            .map_err(|e| AppError::connect(&self.url, e))?;

        loop {
            match read_frame(&mut socket).await? {
                Some(frame) if frame.command == Command::Connected => {
                    info!(version = ?frame.get("version"), "STOMP session established");
                    break;
                }
                Some(frame) if frame.command == Command::Error => {
                    let message = frame.get("message").unwrap_or(frame.body.as_str()).to_string();
                    return Err(AppError::BrokerError { message });
                }
                Some(frame) => debug!("Ignoring {} before CONNECTED", frame.command),
                None => return Err(AppError::connect(&self.url, "closed during handshake")),
            }
        }

        self.socket = Some(socket);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), AppError> {
        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;
        self.send_frame(
            Frame::new(Command::Subscribe)
                .header("id", id)
                .header("destination", topic)
                .header("ack", "auto"),
        )
        .await
    }

    async fn publish(
        &mut self,
        destination: &str,
        headers: Headers,
        body: String,
    ) -> Result<(), AppError> {
        let mut frame = Frame::new(Command::Send).header("destination", destination);
        for (name, value) in headers {
            frame = frame.header(name, value);
        }
        self.send_frame(frame.body(body)).await
    }

    async fn next_event(&mut self) -> ChannelEvent {
        let Some(socket) = self.socket.as_mut() else {
            return ChannelEvent::Closed;
        };
        loop {
            match read_frame(socket).await {
                Ok(Some(frame)) => match frame.command {
                    Command::Message => {
                        return ChannelEvent::Message {
                            destination: frame.get("destination").unwrap_or_default().to_string(),
                            body: frame.body,
                        };
                    }
                    Command::Error => {
                        let message = frame.get("message").unwrap_or(frame.body.as_str()).to_string();
                        return ChannelEvent::Error(message);
                    }
                    other => debug!("Ignoring {other} frame"),
                },
                Ok(None) => return ChannelEvent::Closed,
                Err(e) => warn!("Skipping undecodable frame: {e}"),
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.socket.is_none() {
            return;
        }
        let _ = self.send_frame(Frame::new(Command::Disconnect)).await;
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
    }
}
