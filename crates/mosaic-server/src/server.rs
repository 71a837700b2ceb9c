//! `MosaicServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use mosaic_core::ServerId;
use mosaic_core::topology::TopologyStore;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::clock::{ClockSyncEngine, timers};
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::federation::PeerFederation;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::relay::MessageRelay;
use crate::websocket::scheduler::DeferredSender;
use crate::websocket::session::{SessionLimits, run_ws_session};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Frame router shared by every session.
    pub relay: Arc<MessageRelay>,
    /// Connected clients.
    pub clients: Arc<BroadcastManager>,
    /// Peer mesh.
    pub peers: Arc<PeerFederation>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Per-session limits.
    pub limits: SessionLimits,
    /// Largest accepted WebSocket message.
    pub max_message_size: usize,
}

/// The coordination server: topology, relay, peers and clock in one
/// explicitly owned object.
pub struct MosaicServer {
    config: ServerConfig,
    topology: Arc<RwLock<TopologyStore>>,
    clients: Arc<BroadcastManager>,
    clock: Arc<ClockSyncEngine>,
    peers: Arc<PeerFederation>,
    relay: Arc<MessageRelay>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl MosaicServer {
    /// Create a server with a fresh identity and empty topology.
    pub fn new(config: ServerConfig) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let topology = Arc::new(RwLock::new(TopologyStore::new()));
        let clients = Arc::new(BroadcastManager::new());
        let clock = Arc::new(ClockSyncEngine::new(config.clock_sync_attempts));
        let peers = Arc::new(PeerFederation::new(
            ServerId::new(),
            config.socket_refresh_delay,
            config.send_queue_capacity,
            config.trace_messages,
            shutdown.clone(),
        ));
        let relay = Arc::new(MessageRelay::new(
            config.app_name.clone(),
            config.section_update_delay,
            config.trace_messages,
            topology.clone(),
            clients.clone(),
            clock.clone(),
            peers.clone(),
            DeferredSender::new(shutdown.token()),
        ));
        Self {
            config,
            topology,
            clients,
            clock,
            peers,
            relay,
            shutdown,
            start_time: Instant::now(),
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            clients: self.clients.clone(),
            peers: self.peers.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            limits: SessionLimits {
                max_connections: self.config.max_connections,
                send_queue_capacity: self.config.send_queue_capacity,
            },
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/peers", post(peers_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind, start background tasks, and serve until shutdown.
    ///
    /// Returns the bound address and the serve task handle.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        self.start_background_tasks();

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server terminated");
            }
        });

        info!(
            addr = %local_addr,
            server_id = %self.peers.server_id(),
            "mosaic server listening"
        );
        Ok((local_addr, handle))
    }

    fn start_background_tasks(&self) {
        let token = self.shutdown.token();
        self.shutdown.track(timers::spawn_resync_timer(
            self.clients.clone(),
            self.config.app_name.clone(),
            self.config.clock_re_sync_interval,
            token.clone(),
        ));
        self.shutdown.track(timers::spawn_sync_timer(
            self.clock.clone(),
            self.clients.clone(),
            self.config.app_name.clone(),
            self.config.clock_sync_interval,
            token,
        ));
        if !self.config.initial_peers.is_empty() {
            self.peers.reconcile_urls(&self.config.initial_peers);
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// This server's identity in the peer mesh.
    pub fn server_id(&self) -> &ServerId {
        self.peers.server_id()
    }

    /// Shared topology, mutated by the section API layer.
    pub fn topology(&self) -> &Arc<RwLock<TopologyStore>> {
        &self.topology
    }

    /// Connected clients.
    pub fn clients(&self) -> &Arc<BroadcastManager> {
        &self.clients
    }

    /// Clock engine.
    pub fn clock(&self) -> &Arc<ClockSyncEngine> {
        &self.clock
    }

    /// Peer mesh.
    pub fn peers(&self) -> &Arc<PeerFederation> {
        &self.peers
    }

    /// Frame router.
    pub fn relay(&self) -> &Arc<MessageRelay> {
        &self.relay
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }
}

/// GET /: WebSocket upgrade.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let token = state.shutdown.token();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, state.relay, state.clients, state.limits, token))
}

/// POST /peers: replace the peer set.
async fn peers_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let desired: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    match state.peers.reconcile(&desired) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, Json(json!({}))).into_response(),
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.clients.connection_count().await;
    Json(health::health_check(
        state.start_time,
        connections,
        state.peers.peer_count(),
    ))
}
