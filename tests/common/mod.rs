//! Fake job-portal backend: the history REST routes plus a STOMP broker on
//! a WebSocket, served by axum on an ephemeral port.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use chat_stream::config::ClientConfig;
use chat_stream::models::Credentials;
use chat_stream::transport::stomp::{Command, Frame};

pub const TOKEN: &str = "secret";
pub const TOTAL_MESSAGES: usize = 25;

pub fn credentials() -> Credentials {
    Credentials::new(TOKEN, "u1")
}

#[derive(Clone, Default)]
struct Backend {
    next_id: Arc<AtomicUsize>,
}

#[derive(Deserialize)]
struct PageParams {
    page: usize,
    size: usize,
}

pub struct Server {
    pub config: ClientConfig,
}

pub async fn spawn() -> Server {
    let app = Router::new()
        .route("/api/v1/conversation/my", get(my_conversations))
        .route("/api/v1/conversation/{id}/getMessages", get(get_messages))
        .route("/chat/websocket", get(ws_handler))
        .with_state(Backend::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server {
        config: ClientConfig {
            api_base_url: format!("http://{addr}/api/v1"),
            ws_url: format!("ws://{addr}/chat/websocket"),
            reconnect_delay: Duration::from_millis(50),
            ..ClientConfig::default()
        },
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer secret")
}

async fn my_conversations(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(json!([
        {"id": 9, "employerId": "e1", "employerName": "Acme", "applicantId": "u1",
         "applicantName": "Ana", "applicationId": 31, "lastMessage": "See you", "unreadCount": 2},
        {"id": 10, "employerId": "u1", "employerName": "Me Inc", "applicantId": "a2",
         "applicantName": "Bo"}
    ])))
}

/// Serves `TOTAL_MESSAGES` messages, newest first.
async fn get_messages(
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if id == "missing" {
        return Err(StatusCode::NOT_FOUND);
    }
    let start = (params.page * params.size).min(TOTAL_MESSAGES);
    let end = ((params.page + 1) * params.size).min(TOTAL_MESSAGES);
    let page: Vec<Value> = (start..end)
        .map(|i| {
            let minute = 59 - i;
            json!({
                "id": i,
                "senderId": if i % 2 == 0 { "u1" } else { "e1" },
                "content": format!("history {i}"),
                "timestamp": format!("2024-05-01T09:{minute:02}:00"),
            })
        })
        .collect();
    Ok(Json(Value::Array(page)))
}

async fn ws_handler(ws: WebSocketUpgrade, State(backend): State<Backend>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| broker_session(socket, backend))
}

async fn send_frame(socket: &mut WebSocket, frame: Frame) {
    let _ = socket.send(Message::Text(frame.encode().into())).await;
}

/// Minimal broker: checks the CONNECT credential, remembers one subscription
/// and echoes every SEND back to it with a server id and timestamp.
async fn broker_session(mut socket: WebSocket, backend: Backend) {
    let mut subscription: Option<(String, String)> = None;

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(Some(frame)) = Frame::decode(text.as_str()) else { continue };

        match frame.command {
            Command::Connect | Command::Stomp => {
                if frame.get("Authorization") != Some("Bearer secret") {
                    send_frame(&mut socket, Frame::new(Command::Error).header("message", "Unauthorized"))
                        .await;
                    break;
                }
                send_frame(&mut socket, Frame::new(Command::Connected).header("version", "1.2")).await;
            }
            Command::Subscribe => {
                subscription = frame
                    .get("destination")
                    .zip(frame.get("id"))
                    .map(|(dest, id)| (dest.to_string(), id.to_string()));
            }
            Command::Send => {
                let Some((topic, sub_id)) = &subscription else { continue };
                let incoming: Value = serde_json::from_str(&frame.body).unwrap_or_default();
                let n = backend.next_id.fetch_add(1, Ordering::SeqCst);
                let body = json!({
                    "id": format!("srv-{n}"),
                    "senderId": incoming["senderId"],
                    "content": incoming["content"],
                    "timestamp": "2024-05-01T10:00:00",
                });
                // Heart-beat first; clients must skip it.
                let _ = socket.send(Message::Text(String::from("\n").into())).await;
                let reply = Frame::new(Command::Message)
                    .header("destination", topic.as_str())
                    .header("subscription", sub_id.as_str())
                    .header("message-id", n.to_string())
                    .body(body.to_string());
                send_frame(&mut socket, reply).await;
            }
            Command::Disconnect => break,
            _ => {}
        }
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
