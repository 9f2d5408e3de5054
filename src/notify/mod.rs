//! Real-time notifications.
//!
//! One WebSocket connection per user. The hub keeps two maps:
//! user -> connection (one active connection, replaced on reconnect) and
//! connection -> user. A mapping is only removed by the connection that owns it.

mod socket;
mod watcher;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::models::{KycSummary, Transaction};

pub use socket::{ws_handler, SocketContext};
pub use watcher::KycWatcher;

pub type ConnectionId = Uuid;
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Frames sent to clients as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Registered { user_id: i64, connection_id: ConnectionId },
    KycStatusUpdate { status: KycSummary, notification: Notification },
    KycStepComplete { step: String, kyc_status: KycSummary },
    TransactionCreated(Transaction),
    TransactionUpdate(Transaction),
    Pong,
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn kyc_approved() -> Self {
        Self {
            kind: "kyc_verification_success".to_string(),
            message: "Your identity verification has been approved! You can now make transactions."
                .to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
struct Connection {
    id: ConnectionId,
    tx: EventSender,
}

#[derive(Debug, Default)]
struct HubInner {
    users: DashMap<i64, Connection>,
    connections: DashMap<ConnectionId, i64>,
}

/// Subscriber registry and event fan-out.
#[derive(Debug, Clone, Default)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to a connection, replacing any previous connection.
    pub fn register(&self, user_id: i64, connection_id: ConnectionId, tx: EventSender) {
        // A connection re-registering as someone else releases the old user.
        if let Some(previous_user) = self.inner.connections.insert(connection_id, user_id)
            && previous_user != user_id
        {
            self.inner
                .users
                .remove_if(&previous_user, |_, c| c.id == connection_id);
        }

        if let Some(old) = self.inner.users.insert(user_id, Connection { id: connection_id, tx })
            && old.id != connection_id
        {
            self.inner.connections.remove_if(&old.id, |_, u| *u == user_id);
            debug!("User {} moved from connection {} to {}", user_id, old.id, connection_id);
        }

        info!("User {} registered on connection {}", user_id, connection_id);
    }

    /// Drop the user's registration made through `connection_id`.
    /// Returns the user that was unregistered.
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<i64> {
        let (_, user_id) = self.inner.connections.remove(&connection_id)?;
        self.inner
            .users
            .remove_if(&user_id, |_, c| c.id == connection_id);
        debug!("User {} unregistered from connection {}", user_id, connection_id);
        Some(user_id)
    }

    /// Connection closed.
    pub fn disconnect(&self, connection_id: ConnectionId) -> Option<i64> {
        self.unregister(connection_id)
    }

    /// Deliver an event to the user's connection.
    /// `false` if the user has no live connection.
    pub fn send(&self, user_id: i64, event: ServerEvent) -> bool {
        let Some(conn) = self.inner.users.get(&user_id).map(|c| c.clone()) else {
            return false;
        };

        if conn.tx.send(event).is_ok() {
            return true;
        }

        // Receiver gone: the socket task ended without cleaning up.
        self.unregister(conn.id);
        false
    }

    pub fn is_connected(&self, user_id: i64) -> bool {
        self.inner.users.contains_key(&user_id)
    }

    pub fn connected_users(&self) -> Vec<i64> {
        self.inner.users.iter().map(|e| *e.key()).collect()
    }

    pub fn user_for(&self, connection_id: ConnectionId) -> Option<i64> {
        self.inner.connections.get(&connection_id).map(|u| *u)
    }
}
