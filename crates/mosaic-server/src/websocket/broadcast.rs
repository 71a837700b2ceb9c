//! Fan-out to connected WebSocket clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use super::connection::ClientConnection;

/// The set of locally connected clients.
pub struct BroadcastManager {
    connections: RwLock<HashMap<u64, Arc<ClientConnection>>>,
    next_key: AtomicU64,
}

impl BroadcastManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_key: AtomicU64::new(1),
        }
    }

    /// Register a new client around its outbound queue.
    ///
    /// The log id is the client count including the new one.
    pub async fn register(&self, tx: mpsc::Sender<Arc<String>>) -> Arc<ClientConnection> {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let mut conns = self.connections.write().await;
        let connection = Arc::new(ClientConnection::new(key, conns.len() + 1, tx));
        let _ = conns.insert(key, connection.clone());
        connection
    }

    /// Remove a client and mark it closed.
    pub async fn remove(&self, key: u64) {
        let removed = self.connections.write().await.remove(&key);
        if let Some(conn) = removed {
            conn.mark_closed();
        }
    }

    /// Queue `frame` on every open client except `sender`.
    ///
    /// Returns the number of clients the frame was queued for.
    pub async fn broadcast_except(&self, sender: u64, frame: &Arc<String>) -> usize {
        let conns = self.connections.read().await;
        let delivered = conns
            .values()
            .filter(|c| c.key != sender && c.is_open())
            .filter(|c| c.send(frame.clone()))
            .count();
        debug!(recipients = delivered, "fan-out");
        delivered
    }

    /// Queue a JSON frame on every open client.
    pub async fn broadcast_json(&self, value: &serde_json::Value) -> usize {
        let json = match serde_json::to_string(value) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast frame");
                return 0;
            }
        };
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|c| c.is_open())
            .filter(|c| c.send(json.clone()))
            .count()
    }

    /// Number of connected clients.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_client(
        bm: &BroadcastManager,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = bm.register(tx).await;
        conn.mark_open();
        (conn, rx)
    }

    #[tokio::test]
    async fn log_ids_follow_client_count() {
        let bm = BroadcastManager::new();
        let (a, _ra) = open_client(&bm).await;
        let (b, _rb) = open_client(&bm).await;
        assert_eq!((a.log_id, b.log_id), (1, 2));
        assert_ne!(a.key, b.key);
        bm.remove(a.key).await;
        let (c, _rc) = open_client(&bm).await;
        assert_eq!(c.log_id, 2);
        assert_eq!(bm.connection_count().await, 2);
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let bm = BroadcastManager::new();
        let (a, mut ra) = open_client(&bm).await;
        let (_b, mut rb) = open_client(&bm).await;
        let (_c, mut rc) = open_client(&bm).await;

        let frame = Arc::new(r#"{"appId":"maps"}"#.to_string());
        assert_eq!(bm.broadcast_except(a.key, &frame).await, 2);
        assert_eq!(&*rb.recv().await.unwrap(), r#"{"appId":"maps"}"#);
        assert_eq!(&*rc.recv().await.unwrap(), r#"{"appId":"maps"}"#);
        assert!(ra.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_skips_unopened_clients() {
        let bm = BroadcastManager::new();
        let (a, _ra) = open_client(&bm).await;
        let (tx, mut pending_rx) = mpsc::channel(8);
        let _pending = bm.register(tx).await;

        let frame = Arc::new("x".to_string());
        assert_eq!(bm.broadcast_except(a.key, &frame).await, 0);
        assert!(pending_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn removed_client_is_closed() {
        let bm = BroadcastManager::new();
        let (a, _ra) = open_client(&bm).await;
        bm.remove(a.key).await;
        assert!(!a.is_open());
        assert_eq!(bm.connection_count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_json_reaches_everyone() {
        let bm = BroadcastManager::new();
        let (_a, mut ra) = open_client(&bm).await;
        let (_b, mut rb) = open_client(&bm).await;
        let sent = bm
            .broadcast_json(&serde_json::json!({"appId": "core", "clockReSync": true}))
            .await;
        assert_eq!(sent, 2);
        assert!(ra.recv().await.unwrap().contains("clockReSync"));
        assert!(rb.recv().await.unwrap().contains("clockReSync"));
    }
}
