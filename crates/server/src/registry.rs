//! Connection registry and per-connection outbound queue
//!
//! Every write to a connection goes through its bounded outbound queue; a
//! dedicated writer task drains the queue to the socket, so frames are
//! never interleaved. The registry maps `user_id -> connections` with
//! explicit add/remove on open/close and supports out-of-band
//! `send_to_user` delivery.

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::frames::ServerFrame;

/// Close reasons the writer task reports to the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Outbound queue exceeded its high-water mark (slow client)
    Backpressure,
}

impl CloseReason {
    pub fn close_code(&self) -> u16 {
        match self {
            // Policy violation
            Self::Backpressure => 1008,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backpressure => "send buffer overflow",
        }
    }
}

/// Failure enqueuing a frame for a connection
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Queue full: the connection is being closed with policy-violation
    #[error("outbound queue overflow")]
    Overflow,

    /// The connection is already gone
    #[error("connection closed")]
    Closed,
}

/// Handle for writing to one connection
///
/// Cheap to clone; all clones share the same bounded queue, which acts as
/// the per-connection send lock.
#[derive(Clone)]
pub struct ConnectionSender {
    conn_id: String,
    frames: mpsc::Sender<Message>,
    close: mpsc::Sender<CloseReason>,
}

impl ConnectionSender {
    pub fn new(
        conn_id: impl Into<String>,
        frames: mpsc::Sender<Message>,
        close: mpsc::Sender<CloseReason>,
    ) -> Self {
        Self {
            conn_id: conn_id.into(),
            frames,
            close,
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    /// Enqueue a reply frame
    ///
    /// A full queue means the client is not draining fast enough; the
    /// connection is closed with policy-violation rather than buffering
    /// without bound.
    pub fn send(&self, frame: &ServerFrame) -> Result<(), SendError> {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(conn_id = %self.conn_id, error = %e, "Failed to serialize frame");
                return Ok(());
            },
        };
        self.send_message(Message::Text(json))
    }

    /// Enqueue a raw WebSocket message (pong replies)
    pub fn send_message(&self, message: Message) -> Result<(), SendError> {
        match self.frames.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.conn_id, "Outbound queue full, closing connection");
                self.request_close(CloseReason::Backpressure);
                Err(SendError::Overflow)
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Ask the writer task to close the socket
    pub fn request_close(&self, reason: CloseReason) {
        let _ = self.close.try_send(reason);
    }
}

/// Registry of open connections keyed by user id
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Vec<ConnectionSender>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user
    pub fn add(&self, user_id: &str, sender: ConnectionSender) {
        self.connections
            .entry(user_id.to_string())
            .or_default()
            .push(sender);
    }

    /// Remove one connection; drops the user entry when it empties
    pub fn remove(&self, user_id: &str, conn_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(user_id) {
            entry.retain(|s| s.conn_id() != conn_id);
            let empty = entry.is_empty();
            drop(entry);
            if empty {
                self.connections.remove_if(user_id, |_, v| v.is_empty());
            }
        }
    }

    /// Deliver a frame to every open connection of a user
    ///
    /// Returns how many connections accepted the frame.
    pub fn send_to_user(&self, user_id: &str, frame: &ServerFrame) -> usize {
        match self.connections.get(user_id) {
            Some(senders) => senders
                .iter()
                .filter(|s| s.send(frame).is_ok())
                .count(),
            None => 0,
        }
    }

    /// Total open connections across all users
    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|e| e.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(conn_id: &str, depth: usize) -> (ConnectionSender, mpsc::Receiver<Message>) {
        let (frames_tx, frames_rx) = mpsc::channel(depth);
        let (close_tx, _close_rx) = mpsc::channel(1);
        (ConnectionSender::new(conn_id, frames_tx, close_tx), frames_rx)
    }

    #[tokio::test]
    async fn test_send_serializes_frame() {
        let (s, mut rx) = sender("c1", 4);
        s.send(&ServerFrame::error("nope")).unwrap();

        match rx.recv().await.unwrap() {
            Message::Text(json) => {
                let v: serde_json::Value = serde_json::from_str(&json).unwrap();
                assert_eq!(v["type"], "error");
                assert_eq!(v["error"], "nope");
            },
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overflow_requests_close() {
        let (frames_tx, _frames_rx) = mpsc::channel(1);
        let (close_tx, mut close_rx) = mpsc::channel(1);
        let s = ConnectionSender::new("c1", frames_tx, close_tx);

        s.send(&ServerFrame::error("one")).unwrap();
        let err = s.send(&ServerFrame::error("two")).unwrap_err();
        assert!(matches!(err, SendError::Overflow));
        assert_eq!(close_rx.recv().await.unwrap(), CloseReason::Backpressure);
    }

    #[tokio::test]
    async fn test_registry_add_remove_and_broadcast() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = sender("c1", 4);
        let (b, mut rx_b) = sender("c2", 4);
        registry.add("u1", a);
        registry.add("u1", b);
        assert_eq!(registry.connection_count(), 2);

        let delivered = registry.send_to_user("u1", &ServerFrame::error("ping"));
        assert_eq!(delivered, 2);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());

        registry.remove("u1", "c1");
        assert_eq!(registry.connection_count(), 1);
        registry.remove("u1", "c2");
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.send_to_user("u1", &ServerFrame::error("gone")), 0);
    }
}
