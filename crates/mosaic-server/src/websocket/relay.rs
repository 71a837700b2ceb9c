//! Routing of inbound client frames.
//!
//! Every frame fans out verbatim to the other open clients and is
//! forwarded to peers, except a core `read` request, which replays the
//! current topology to the requester alone. Frames that came from a peer
//! are also handed to the federation's receive subscribers.

use std::sync::Arc;
use std::time::Duration;

use mosaic_core::ServerId;
use mosaic_core::protocol::{self, Envelope};
use mosaic_core::topology::TopologyStore;
use parking_lot::RwLock;
use tracing::{debug, error, trace, warn};

use super::broadcast::BroadcastManager;
use super::connection::ClientConnection;
use super::scheduler::DeferredSender;
use crate::clock::ClockSyncEngine;
use crate::federation::PeerFederation;

/// What the relay did with one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Fanned out to `local` clients and `peers` peer links.
    Broadcast {
        /// Local clients the frame was queued for.
        local: usize,
        /// Peers the frame was queued for.
        peers: usize,
    },
    /// Topology replayed to the sender.
    Replayed {
        /// Sections sent as `create`.
        sections: usize,
        /// `update` frames scheduled.
        updates: usize,
    },
    /// A replay request from inside a section; dropped.
    Rejected,
    /// This server already forwarded the frame; dropped.
    Looped,
    /// Not valid JSON, or not an object; dropped.
    Malformed,
}

/// Shared message bus for all client sessions.
pub struct MessageRelay {
    app_name: String,
    section_update_delay: Duration,
    trace_messages: bool,
    server_id: ServerId,
    topology: Arc<RwLock<TopologyStore>>,
    clients: Arc<BroadcastManager>,
    clock: Arc<ClockSyncEngine>,
    peers: Arc<PeerFederation>,
    deferred: DeferredSender,
}

impl MessageRelay {
    /// Wire the relay to the state it routes over.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app_name: String,
        section_update_delay: Duration,
        trace_messages: bool,
        topology: Arc<RwLock<TopologyStore>>,
        clients: Arc<BroadcastManager>,
        clock: Arc<ClockSyncEngine>,
        peers: Arc<PeerFederation>,
        deferred: DeferredSender,
    ) -> Self {
        let server_id = peers.server_id().clone();
        Self {
            app_name,
            section_update_delay,
            trace_messages,
            server_id,
            topology,
            clients,
            clock,
            peers,
            deferred,
        }
    }

    /// Identity this server announces in handshakes.
    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    /// Route one text frame received from `sender`.
    pub async fn handle_frame(&self, sender: &Arc<ClientConnection>, raw: &str) -> RelayOutcome {
        if self.trace_messages {
            trace!(client_id = sender.log_id, message = raw, "received frame");
        }

        let envelope = match Envelope::parse(raw) {
            Ok(env) => env,
            Err(e) => {
                warn!(client_id = sender.log_id, error = %e, "dropping malformed frame");
                return RelayOutcome::Malformed;
            }
        };

        if envelope.is_replay_request(&self.app_name) {
            if envelope.has_section_id() {
                error!(
                    client_id = sender.log_id,
                    "section information cannot be requested from within a section"
                );
                return RelayOutcome::Rejected;
            }
            return self.replay_to(sender);
        }

        if envelope.was_forwarded_by(&self.server_id) {
            debug!(client_id = sender.log_id, "dropping frame we already forwarded");
            return RelayOutcome::Looped;
        }

        if envelope.is_forwarded() {
            let _ = self.peers.deliver(&envelope);
        }

        if envelope.is_for(&self.app_name) {
            let samples = envelope.sync_samples();
            if !samples.is_empty() {
                self.clock.ingest(&samples);
            }
        }

        let frame = Arc::new(raw.to_string());
        let local = self.clients.broadcast_except(sender.key, &frame).await;
        let peers = self.peers.send(envelope);
        RelayOutcome::Broadcast { local, peers }
    }

    /// Send every live section to `client`: `create` now, and `update`
    /// after the section update delay for sections with an app.
    pub fn replay_to(&self, client: &Arc<ClientConnection>) -> RelayOutcome {
        let frames: Vec<_> = {
            let topology = self.topology.read();
            topology
                .sections()
                .map(|s| {
                    (
                        protocol::section_create(&self.app_name, s.id, &s.spaces),
                        s.app
                            .as_ref()
                            .map(|app| protocol::section_update(&self.app_name, s.id, app)),
                    )
                })
                .collect()
        };

        let mut sections = 0;
        let mut updates = 0;
        for (create, update) in frames {
            if !client.send_json(&create) {
                continue;
            }
            sections += 1;
            let Some(update) = update else { continue };
            match serde_json::to_string(&update) {
                Ok(json) => {
                    let _ = self
                        .deferred
                        .send_after(client.clone(), self.section_update_delay, Arc::new(json));
                    updates += 1;
                }
                Err(e) => error!(client_id = client.log_id, error = %e, "failed to serialize update"),
            }
        }
        debug!(client_id = client.log_id, sections, updates, "topology replayed");
        RelayOutcome::Replayed { sections, updates }
    }
}
