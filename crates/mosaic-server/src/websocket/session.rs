//! WebSocket session lifecycle: one connected client from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use mosaic_core::protocol::Handshake;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::broadcast::BroadcastManager;
use super::relay::MessageRelay;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_REJECTED_TOTAL,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Interval between server-initiated Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Per-session limits.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    /// Refuse new sockets once this many clients are connected.
    pub max_connections: usize,
    /// Outbound queue depth per client.
    pub send_queue_capacity: usize,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Refuses the socket when the connection limit is reached
/// 2. Queues the `{func: "connect"}` handshake, then opens the client
/// 3. Forwards queued frames to the socket with periodic Pings
/// 4. Routes every inbound text frame through the relay
/// 5. Cleans up on disconnect or server shutdown
#[instrument(skip_all, fields(client_id))]
pub async fn run_ws_session(
    mut ws: WebSocket,
    relay: Arc<MessageRelay>,
    clients: Arc<BroadcastManager>,
    limits: SessionLimits,
    shutdown: CancellationToken,
) {
    let current = clients.connection_count().await;
    if current >= limits.max_connections {
        warn!(current, max = limits.max_connections, "connection limit reached, refusing socket");
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        let _ = ws.send(Message::Close(None)).await;
        return;
    }

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(limits.send_queue_capacity);
    let connection = clients.register(send_tx).await;
    let client_id = connection.log_id;
    let _ = tracing::Span::current().record("client_id", client_id);

    let connection_start = Instant::now();
    let connected = clients.connection_count().await;
    info!(client_id, clients = connected, "websocket connection established");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    match serde_json::to_value(Handshake::new(relay.server_id())) {
        Ok(handshake) => {
            let _ = connection.send_json(&handshake);
        }
        Err(e) => warn!(client_id, error = %e, "failed to encode handshake"),
    }
    connection.mark_open();

    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let msg = tokio::select! {
            () = shutdown.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        let Some(Ok(msg)) = msg else { break };
        match msg {
            Message::Text(text) => {
                let _ = relay.handle_frame(&connection, text.as_str()).await;
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = relay.handle_frame(&connection, text).await;
                }
                Err(_) => debug!(client_id, len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            Message::Close(_) => {
                debug!(client_id, "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    info!(client_id, "websocket connection closed");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    clients.remove(connection.key).await;
    outbound.abort();
}
