//! A managed outbound WebSocket to one peer server.
//!
//! The link connects to `ws://<host>` as an ordinary client of the peer,
//! learns the peer's server id from its handshake, and reconnects after a
//! fixed delay whenever the socket drops. Other inbound traffic is
//! ignored: the peer delivers frames meant for us over its own link.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics::counter;
use mosaic_core::ServerId;
use mosaic_core::protocol::Handshake;
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::PEER_RECONNECTS_TOTAL;

type PeerStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handle to one peer connection.
pub struct PeerLink {
    host: String,
    tx: mpsc::Sender<Arc<String>>,
    open: AtomicBool,
    remote_id: RwLock<Option<ServerId>>,
    cancel: CancellationToken,
}

impl PeerLink {
    /// Start connecting to `host` in the background.
    ///
    /// The link stops when `parent` is cancelled or [`PeerLink::close`]
    /// is called.
    pub fn spawn(
        host: String,
        refresh_delay: Duration,
        queue_capacity: usize,
        parent: &CancellationToken,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let link = Arc::new(Self {
            host,
            tx,
            open: AtomicBool::new(false),
            remote_id: RwLock::new(None),
            cancel: parent.child_token(),
        });
        let handle = tokio::spawn(run(link.clone(), rx, refresh_delay));
        (link, handle)
    }

    /// A link reported open with no background task, returning the
    /// receiving end of its outbound queue.
    #[cfg(test)]
    pub(crate) fn open_for_test(
        host: &str,
        remote_id: Option<ServerId>,
        queue_capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let link = Arc::new(Self {
            host: host.to_string(),
            tx,
            open: AtomicBool::new(true),
            remote_id: RwLock::new(remote_id),
            cancel: CancellationToken::new(),
        });
        (link, rx)
    }

    /// `host:port` this link connects to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether the socket is currently connected.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Server id announced by the peer over the current socket, once its
    /// handshake has arrived.
    pub fn remote_id(&self) -> Option<ServerId> {
        self.remote_id.read().clone()
    }

    /// Queue a frame. Frames are dropped while the socket is down.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(peer = %self.host, error = %e, "dropping frame for peer");
                false
            }
        }
    }

    /// Close the socket and stop reconnecting.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the link has been closed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn run(link: Arc<PeerLink>, mut rx: mpsc::Receiver<Arc<String>>, refresh_delay: Duration) {
    let url = format!("ws://{}", link.host);
    loop {
        debug!(peer = %link.host, %url, "establishing peer connection");
        let attempt = tokio::select! {
            () = link.cancel.cancelled() => break,
            r = connect_async(url.as_str()) => r,
        };
        match attempt {
            Ok((stream, _)) => {
                // Anything queued for a previous socket is stale.
                while rx.try_recv().is_ok() {}
                link.open.store(true, Ordering::Release);
                info!(peer = %link.host, "peer connected");
                drive(&link, stream, &mut rx).await;
                // A restarted peer announces a new id on the next socket.
                *link.remote_id.write() = None;
                link.open.store(false, Ordering::Release);
            }
            Err(e) => error!(peer = %link.host, error = %e, "peer connection failed"),
        }

        if link.cancel.is_cancelled() {
            break;
        }
        warn!(peer = %link.host, delay = ?refresh_delay, "attempting to reconnect");
        tokio::select! {
            () = link.cancel.cancelled() => break,
            () = tokio::time::sleep(refresh_delay) => {}
        }
        counter!(PEER_RECONNECTS_TOTAL, "peer" => link.host.clone()).increment(1);
    }
    link.open.store(false, Ordering::Release);
    debug!(peer = %link.host, "peer link stopped");
}

async fn drive(link: &PeerLink, stream: PeerStream, rx: &mut mpsc::Receiver<Arc<String>>) {
    let (mut sink, mut inbound) = stream.split();
    loop {
        tokio::select! {
            () = link.cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            frame = rx.recv() => {
                let Some(frame) = frame else { return };
                if let Err(e) = sink.send(Message::text(String::clone(&frame))).await {
                    warn!(peer = %link.host, error = %e, "peer send failed");
                    return;
                }
            }
            msg = inbound.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(handshake) = Handshake::parse(text.as_str()) {
                        debug!(peer = %link.host, remote = ?handshake.server_id, "peer handshake");
                        *link.remote_id.write() = handshake.server_id;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    warn!(peer = %link.host, ?code, "lost peer connection");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(peer = %link.host, error = %e, "peer socket error");
                    return;
                }
                None => {
                    warn!(peer = %link.host, "peer socket closed");
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_connect_is_dropped() {
        let root = CancellationToken::new();
        // Port 1 on loopback refuses connections.
        let (link, handle) = PeerLink::spawn("127.0.0.1:1".into(), Duration::from_secs(60), 4, &root);
        assert!(!link.is_open());
        assert!(!link.send(Arc::new("{}".into())));
        assert_eq!(link.host(), "127.0.0.1:1");
        assert_eq!(link.remote_id(), None);

        link.close();
        assert!(link.is_closed());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn parent_cancel_stops_link() {
        let root = CancellationToken::new();
        let (link, handle) = PeerLink::spawn("127.0.0.1:1".into(), Duration::from_secs(60), 4, &root);
        root.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(link.is_closed());
        assert!(!link.is_open());
    }

    #[tokio::test]
    async fn remote_id_cleared_when_socket_drops() {
        use tokio::net::TcpListener;
        use tokio::sync::oneshot;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        let peer_id = ServerId::new();
        let (drop_tx, drop_rx) = oneshot::channel::<()>();

        let handshake = serde_json::to_string(&Handshake::new(&peer_id)).unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::text(handshake)).await.unwrap();
            let _ = drop_rx.await;
            drop(ws);
        });

        let root = CancellationToken::new();
        let (link, handle) = PeerLink::spawn(host, Duration::from_secs(60), 4, &root);

        tokio::time::timeout(Duration::from_secs(5), async {
            while link.remote_id().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(link.remote_id(), Some(peer_id));
        assert!(link.is_open());

        drop_tx.send(()).unwrap();
        server.await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while link.is_open() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(link.remote_id(), None);

        link.close();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
