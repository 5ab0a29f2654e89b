//! Notification fan-out.

use axum::extract::ws::Utf8Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::engine::{Notification, Notifier};
use crate::players::PlayerId;

/// Per-connection outbound queues.
///
/// Each connection task drains its own unbounded queue, so a slow client
/// never blocks the engine. Frames are serialized once per notification.
#[derive(Debug, Default)]
pub struct BroadcastHub {
    connections: DashMap<PlayerId, mpsc::UnboundedSender<Utf8Bytes>>,
}

impl BroadcastHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection and returns the queue its task should drain.
    pub fn register(&self, player: PlayerId) -> mpsc::UnboundedReceiver<Utf8Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(player, tx);
        rx
    }

    /// Removes a connection.
    pub fn unregister(&self, player: PlayerId) {
        self.connections.remove(&player);
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// `true` when no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn encode(notification: &Notification) -> Option<Utf8Bytes> {
        match serde_json::to_string(notification) {
            Ok(text) => Some(Utf8Bytes::from(text)),
            Err(e) => {
                warn!(event = notification.event(), error = %e, "notification not serializable; dropped");
                None
            }
        }
    }
}

impl Notifier for BroadcastHub {
    fn broadcast(&self, notification: &Notification) {
        let Some(frame) = Self::encode(notification) else {
            return;
        };
        for entry in &self.connections {
            // A closed queue means the connection task is shutting down.
            let _ = entry.value().send(frame.clone());
        }
    }

    fn send_to(&self, player: PlayerId, notification: &Notification) {
        let Some(tx) = self.connections.get(&player).map(|entry| entry.value().clone()) else {
            return;
        };
        if let Some(frame) = Self::encode(notification) {
            let _ = tx.send(frame);
        }
    }
}
