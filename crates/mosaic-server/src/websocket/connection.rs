//! A connected WebSocket client with fire-and-forget sends.
//!
//! Frames are queued on a bounded channel drained by the session's
//! writer task. A full or closed queue never surfaces as an error to the
//! caller: the frame is dropped, counted, and logged only while the
//! socket still claims to be open.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Lifecycle of a client socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Upgraded but the handshake frame has not been queued yet.
    Connecting = 0,
    /// Accepting frames.
    Open = 1,
    /// Closed; sends are ignored.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique key within this process.
    pub key: u64,
    /// Client-set size at accept time; used for log correlation only.
    pub log_id: usize,
    tx: mpsc::Sender<Arc<String>>,
    state: AtomicU8,
    /// When this connection was established.
    pub connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection in the [`ConnectionState::Connecting`] state.
    pub fn new(key: u64, log_id: usize, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            key,
            log_id,
            tx,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether frames are currently accepted.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Move to [`ConnectionState::Open`]. No effect once closed.
    pub fn mark_open(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Connecting as u8,
            ConnectionState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Move to [`ConnectionState::Closed`].
    pub fn mark_closed(&self) {
        self.state.store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Queue a text frame.
    ///
    /// Returns `false` if the frame was not queued.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.state() == ConnectionState::Closed {
            return false;
        }
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                if self.is_open() {
                    error!(client_id = self.log_id, "send queue full, dropping frame");
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                debug!(client_id = self.log_id, "writer gone, marking closed");
                self.mark_closed();
                false
            }
        }
    }

    /// Serialize a JSON value and queue it.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                error!(client_id = self.log_id, error = %e, "failed to serialize frame");
                false
            }
        }
    }

    /// Frames dropped on this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::logging::capture_logs;
    use tracing::Level;

    fn make_connection(cap: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(cap);
        let conn = ClientConnection::new(1, 0, tx);
        conn.mark_open();
        (conn, rx)
    }

    #[test]
    fn new_connection_is_connecting() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(7, 3, tx);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.key, 7);
        assert_eq!(conn.log_id, 3);
    }

    #[test]
    fn closed_cannot_reopen() {
        let (conn, _rx) = make_connection(1);
        conn.mark_closed();
        conn.mark_open();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection(4);
        assert!(conn.send(Arc::new("hello".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn full_queue_drops_and_logs_error() {
        let (logs, _guard) = capture_logs();
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(Arc::new("a".into())));
        assert!(!conn.send(Arc::new("b".into())));
        assert_eq!(conn.drop_count(), 1);
        assert!(logs.has_event(Level::ERROR, "send queue full"));
    }

    #[tokio::test]
    async fn closed_writer_marks_closed_quietly() {
        let (logs, _guard) = capture_logs();
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert!(!conn.send(Arc::new("x".into())));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(logs.count_at_level(Level::ERROR), 0);
        assert!(!conn.send(Arc::new("y".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_json_serializes() {
        let (conn, mut rx) = make_connection(4);
        assert!(conn.send_json(&serde_json::json!({"func": "connect"})));
        assert_eq!(&*rx.recv().await.unwrap(), r#"{"func":"connect"}"#);
    }
}
