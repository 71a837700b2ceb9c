//! The set of peer links and loop-free forwarding across them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use mosaic_core::ServerId;
use mosaic_core::protocol::Envelope;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use super::link::PeerLink;
use super::url::normalize_peer_url;
use crate::errors::FederationError;
use crate::metrics::PEER_FORWARDS_TOTAL;
use crate::shutdown::ShutdownCoordinator;

/// Frames buffered per receive subscriber before the slowest one lags.
const RECEIVE_CAPACITY: usize = 256;

/// Peer mesh membership for one server.
pub struct PeerFederation {
    server_id: ServerId,
    links: RwLock<BTreeMap<String, Arc<PeerLink>>>,
    refresh_delay: Duration,
    queue_capacity: usize,
    trace_messages: bool,
    received: broadcast::Sender<Envelope>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl PeerFederation {
    /// Empty federation for `server_id`.
    ///
    /// Link tasks are tracked by `shutdown` and stop when it fires.
    pub fn new(
        server_id: ServerId,
        refresh_delay: Duration,
        queue_capacity: usize,
        trace_messages: bool,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        let (received, _) = broadcast::channel(RECEIVE_CAPACITY);
        Self {
            server_id,
            links: RwLock::new(BTreeMap::new()),
            refresh_delay,
            queue_capacity,
            trace_messages,
            received,
            shutdown,
        }
    }

    /// This server's identity in the mesh.
    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    /// Number of configured peers, connected or not.
    pub fn peer_count(&self) -> usize {
        self.links.read().len()
    }

    /// Configured peer hosts, sorted.
    pub fn hosts(&self) -> Vec<String> {
        self.links.read().keys().cloned().collect()
    }

    /// Link for `host`, if configured.
    pub fn link(&self, host: &str) -> Option<Arc<PeerLink>> {
        self.links.read().get(host).cloned()
    }

    /// Forward a frame to every connected peer.
    ///
    /// Our id is appended to `forwardedBy` and peers already listed there
    /// are skipped. Returns the number of peers the frame was queued for.
    pub fn send(&self, mut envelope: Envelope) -> usize {
        let links: Vec<Arc<PeerLink>> = self
            .links
            .read()
            .values()
            .filter(|l| l.is_open())
            .cloned()
            .collect();
        if links.is_empty() {
            return 0;
        }

        let targets: Vec<_> = links
            .into_iter()
            .filter(|l| l.remote_id().is_none_or(|id| !envelope.was_forwarded_by(&id)))
            .collect();
        if targets.is_empty() {
            return 0;
        }

        envelope.mark_forwarded_by(&self.server_id);
        let frame = match envelope.to_json() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                error!(error = %e, "failed to serialize peer frame");
                return 0;
            }
        };

        let mut sent = 0;
        for link in targets {
            if self.trace_messages {
                trace!(peer = link.host(), message = %frame, "sending to peer");
            }
            if link.send(frame.clone()) {
                sent += 1;
            }
        }
        counter!(PEER_FORWARDS_TOTAL).increment(sent as u64);
        sent
    }

    /// Subscribe to frames that arrived from a peer.
    ///
    /// Each subscriber sees every frame with a non-empty `forwardedBy`
    /// that this server has not itself forwarded, and should ignore the
    /// ones it does not handle.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.received.subscribe()
    }

    /// Hand a peer-originated frame to every subscriber.
    ///
    /// Returns the number of subscribers it reached.
    pub fn deliver(&self, envelope: &Envelope) -> usize {
        if self.received.receiver_count() == 0 {
            return 0;
        }
        if self.trace_messages {
            trace!(forwarded_by = ?envelope.forwarded_by, "got message from peer");
        }
        self.received.send(envelope.clone()).unwrap_or(0)
    }

    /// Replace the peer set with the hosts named in `body`.
    ///
    /// `body` must be a JSON array of `{url}` objects; entries without a
    /// `url` are skipped. New hosts get a link, missing hosts are closed,
    /// unchanged hosts are left alone. A non-array body changes nothing.
    pub fn reconcile(&self, body: &Value) -> Result<(), FederationError> {
        let Value::Array(entries) = body else {
            error!(body = %body, "invalid request to update peers");
            return Err(FederationError::NotAList);
        };
        let desired: Vec<String> = entries
            .iter()
            .filter_map(|e| e.get("url").and_then(Value::as_str))
            .filter(|url| !url.is_empty())
            .map(normalize_peer_url)
            .collect();
        self.apply(&desired);
        Ok(())
    }

    /// Reconcile against an already-extracted list of peer URLs.
    pub fn reconcile_urls<S: AsRef<str>>(&self, urls: &[S]) {
        let desired: Vec<String> = urls
            .iter()
            .map(|u| normalize_peer_url(u.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();
        self.apply(&desired);
    }

    fn apply(&self, desired: &[String]) {
        let mut links = self.links.write();
        for host in desired {
            if !links.contains_key(host) {
                debug!(peer = %host, "adding peer");
                let (link, handle) = PeerLink::spawn(
                    host.clone(),
                    self.refresh_delay,
                    self.queue_capacity,
                    &self.shutdown.token(),
                );
                self.shutdown.track(handle);
                let _ = links.insert(host.clone(), link);
            }
        }
        links.retain(|host, link| {
            let keep = desired.contains(host);
            if !keep {
                debug!(peer = %host, "removing peer");
                link.close();
            }
            keep
        });
        info!("successfully updated peers of node");
        debug!(active = links.len(), "existing active peers");
    }

    /// Close every link.
    pub fn close_all(&self) {
        let mut links = self.links.write();
        for link in links.values() {
            link.close();
        }
        if !links.is_empty() {
            warn!(count = links.len(), "closing all peer links");
        }
        links.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn federation() -> PeerFederation {
        PeerFederation::new(
            ServerId::new(),
            Duration::from_secs(60),
            8,
            false,
            Arc::new(ShutdownCoordinator::new()),
        )
    }

    fn insert_open_link(
        fed: &PeerFederation,
        host: &str,
        remote_id: Option<ServerId>,
    ) -> tokio::sync::mpsc::Receiver<Arc<String>> {
        let (link, rx) = PeerLink::open_for_test(host, remote_id, 4);
        let _ = fed.links.write().insert(host.to_string(), link);
        rx
    }

    #[tokio::test]
    async fn reconcile_adds_and_removes() {
        let fed = federation();
        fed.reconcile(&json!([{ "url": "http://127.0.0.1:1" }, { "url": "ws://127.0.0.1:2/path" }]))
            .unwrap();
        assert_eq!(fed.hosts(), vec!["127.0.0.1:1", "127.0.0.1:2"]);

        let kept = fed.link("127.0.0.1:2").unwrap();
        let dropped = fed.link("127.0.0.1:1").unwrap();
        fed.reconcile(&json!([{ "url": "127.0.0.1:2" }])).unwrap();

        assert_eq!(fed.hosts(), vec!["127.0.0.1:2"]);
        assert!(dropped.is_closed());
        assert!(!kept.is_closed());
        // Same link, not reopened.
        assert!(Arc::ptr_eq(&kept, &fed.link("127.0.0.1:2").unwrap()));
        fed.close_all();
    }

    #[tokio::test]
    async fn reconcile_rejects_non_array_without_change() {
        let fed = federation();
        fed.reconcile(&json!([{ "url": "127.0.0.1:3" }])).unwrap();

        assert_matches!(fed.reconcile(&json!({ "url": "x:1" })), Err(FederationError::NotAList));
        assert_matches!(fed.reconcile(&json!("x:1")), Err(FederationError::NotAList));
        assert_eq!(fed.hosts(), vec!["127.0.0.1:3"]);
        fed.close_all();
    }

    #[tokio::test]
    async fn reconcile_skips_entries_without_url() {
        let fed = federation();
        fed.reconcile(&json!([{ "name": "nope" }, { "url": "" }, { "url": "127.0.0.1:4" }]))
            .unwrap();
        assert_eq!(fed.peer_count(), 1);
        fed.close_all();
    }

    #[tokio::test]
    async fn empty_list_removes_everything() {
        let fed = federation();
        fed.reconcile_urls(&["127.0.0.1:5", "http://127.0.0.1:6/"]);
        assert_eq!(fed.peer_count(), 2);
        fed.reconcile(&json!([])).unwrap();
        assert_eq!(fed.peer_count(), 0);
    }

    #[tokio::test]
    async fn send_without_open_links_is_noop() {
        let fed = federation();
        fed.reconcile_urls(&["127.0.0.1:7"]);
        let env = Envelope::parse(r#"{"appId":"maps","message":{}}"#).unwrap();
        assert_eq!(fed.send(env), 0);
        fed.close_all();
    }

    // ── Forwarding ──

    #[tokio::test]
    async fn send_skips_peer_already_in_forwarded_by() {
        let fed = federation();
        let visited = ServerId::new();
        let fresh = ServerId::new();
        let mut rx_visited = insert_open_link(&fed, "10.0.0.1:8080", Some(visited.clone()));
        let mut rx_fresh = insert_open_link(&fed, "10.0.0.2:8080", Some(fresh.clone()));

        let raw = format!(r#"{{"appId":"maps","forwardedBy":["{visited}"],"message":{{}}}}"#);
        let env = Envelope::parse(&raw).unwrap();
        assert_eq!(fed.send(env), 1);

        assert!(rx_visited.try_recv().is_err());
        let frame: Value = serde_json::from_str(&rx_fresh.try_recv().unwrap()).unwrap();
        assert_eq!(frame["forwardedBy"], json!([visited.as_str(), fed.server_id().as_str()]));
        assert!(rx_fresh.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_reaches_peer_before_its_handshake() {
        let fed = federation();
        let mut rx = insert_open_link(&fed, "10.0.0.3:8080", None);
        let env = Envelope::parse(r#"{"appId":"maps","forwardedBy":["elsewhere"]}"#).unwrap();
        assert_eq!(fed.send(env), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_with_every_peer_visited_is_noop() {
        let fed = federation();
        let visited = ServerId::new();
        let mut rx = insert_open_link(&fed, "10.0.0.4:8080", Some(visited.clone()));
        let raw = format!(r#"{{"appId":"maps","forwardedBy":["{visited}"]}}"#);
        assert_eq!(fed.send(Envelope::parse(&raw).unwrap()), 0);
        assert!(rx.try_recv().is_err());
    }

    // ── Receive subscription ──

    #[tokio::test]
    async fn deliver_reaches_every_subscriber() {
        let fed = federation();
        let env = Envelope::parse(r#"{"appId":"core","forwardedBy":["p"],"message":{"op":"x"}}"#)
            .unwrap();
        assert_eq!(fed.deliver(&env), 0);

        let mut first = fed.subscribe();
        let mut second = fed.subscribe();
        assert_eq!(fed.deliver(&env), 2);
        assert_eq!(first.recv().await.unwrap().message, Some(json!({ "op": "x" })));
        assert!(second.recv().await.unwrap().is_forwarded());
    }

    // ── Shutdown ──

    #[tokio::test]
    async fn link_tasks_are_tracked_for_shutdown() {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let fed = PeerFederation::new(
            ServerId::new(),
            Duration::from_secs(60),
            8,
            false,
            shutdown.clone(),
        );
        fed.reconcile_urls(&["127.0.0.1:1", "127.0.0.1:2"]);
        assert_eq!(shutdown.tracked_tasks(), 2);

        tokio::time::timeout(Duration::from_secs(5), shutdown.graceful_shutdown(None))
            .await
            .unwrap();
        assert_eq!(shutdown.tracked_tasks(), 0);
        assert!(fed.link("127.0.0.1:1").unwrap().is_closed());
    }
}
