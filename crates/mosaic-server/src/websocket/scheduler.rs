//! Delayed sends to a single client.
//!
//! A deferred frame is queued on the client after its delay elapses, so
//! anything queued on that client before scheduling is delivered first.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::connection::ClientConnection;

/// Schedules "send this frame to that client after a delay".
#[derive(Clone)]
pub struct DeferredSender {
    shutdown: CancellationToken,
}

impl DeferredSender {
    /// Pending sends are abandoned when `shutdown` is cancelled.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    /// Queue `frame` on `client` once `delay` has elapsed.
    pub fn send_after(
        &self,
        client: Arc<ClientConnection>,
        delay: Duration,
        frame: Arc<String>,
    ) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if !client.send(frame) {
                        trace!(client_id = client.log_id, "deferred frame not delivered");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn client() -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new(1, 1, tx));
        conn.mark_open();
        (conn, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_after_delay() {
        let (conn, mut rx) = client();
        let sender = DeferredSender::new(CancellationToken::new());
        let _h = sender.send_after(conn, Duration::from_millis(150), Arc::new("later".into()));

        tokio::time::sleep(Duration::from_millis(149)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(&*rx.recv().await.unwrap(), "later");
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_send_precedes_deferred() {
        let (conn, mut rx) = client();
        let sender = DeferredSender::new(CancellationToken::new());
        let _ = conn.send(Arc::new("now".into()));
        let _h = sender.send_after(conn.clone(), Duration::ZERO, Arc::new("after".into()));
        assert_eq!(&*rx.recv().await.unwrap(), "now");
        assert_eq!(&*rx.recv().await.unwrap(), "after");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_on_shutdown() {
        let (conn, mut rx) = client();
        let token = CancellationToken::new();
        let sender = DeferredSender::new(token.clone());
        let handle = sender.send_after(conn, Duration::from_secs(1), Arc::new("never".into()));
        token.cancel();
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
