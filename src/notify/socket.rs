//! WebSocket endpoint.
//!
//! Client frames: `{"event": "register", "data": <user id>}`,
//! `{"event": "unregister"}` and `{"event": "ping"}`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ConnectionId, EventSender, KycWatcher, NotificationHub, ServerEvent};

/// What the socket handler needs from the application state.
#[derive(Clone)]
pub struct SocketContext {
    pub hub: NotificationHub,
    pub watcher: KycWatcher,
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<SocketContext>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: SocketContext) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    debug!("WebSocket connection {} opened", connection_id);

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(&ctx, connection_id, &tx, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket {} read error: {}", connection_id, e);
                break;
            }
        }
    }

    if let Some(user_id) = release(&ctx, connection_id) {
        debug!("User {} disconnected", user_id);
    }
    writer.abort();
}

async fn handle_frame(ctx: &SocketContext, connection_id: ConnectionId, tx: &EventSender, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            reply_error(tx, "Malformed frame");
            return;
        }
    };

    match frame.event.as_str() {
        "register" => {
            let Some(user_id) = parse_user_id(&frame.data) else {
                reply_error(tx, "register requires a user id");
                return;
            };
            ctx.hub.register(user_id, connection_id, tx.clone());
            let _ = tx.send(ServerEvent::Registered {
                user_id,
                connection_id,
            });
            // Seed the KYC snapshot, or notify if it changed since the last one.
            if let Err(e) = ctx.watcher.observe(user_id).await {
                warn!("Initial KYC check for user {} failed: {}", user_id, e);
            }
        }
        "unregister" => {
            release(ctx, connection_id);
        }
        "ping" => {
            let _ = tx.send(ServerEvent::Pong);
        }
        other => reply_error(tx, &format!("Unknown event: {other}")),
    }
}

/// End the registration made through `connection_id` and drop the user's
/// KYC snapshot unless another connection took over.
fn release(ctx: &SocketContext, connection_id: ConnectionId) -> Option<i64> {
    let user_id = ctx.hub.disconnect(connection_id)?;
    if !ctx.hub.is_connected(user_id) {
        ctx.watcher.forget(user_id);
    }
    Some(user_id)
}

/// Accepts `5`, `"5"` or `{"userId": 5}`.
fn parse_user_id(data: &Value) -> Option<i64> {
    let id = match data {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("userId").and_then(parse_user_id),
        _ => None,
    };
    id.filter(|id| *id > 0)
}

fn reply_error(tx: &EventSender, message: &str) {
    let _ = tx.send(ServerEvent::Error {
        message: message.to_string(),
    });
}
