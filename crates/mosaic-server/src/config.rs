//! Server configuration.

use std::time::Duration;

use mosaic_core::protocol::CORE_APP;
use mosaic_settings::MosaicSettings;

/// Runtime configuration for the Mosaic server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-socket outbound queue length.
    pub send_queue_capacity: usize,
    /// Application id of the coordination core.
    pub app_name: String,
    /// Delay between a replayed `CREATE` and its `UPDATE`.
    pub section_update_delay: Duration,
    /// Log every relayed frame at trace level.
    pub trace_messages: bool,
    /// Samples per client required for a clock cycle.
    pub clock_sync_attempts: usize,
    /// Offset computation period.
    pub clock_sync_interval: Duration,
    /// `clockReSync` broadcast period.
    pub clock_re_sync_interval: Duration,
    /// Delay before a closed peer link reconnects.
    pub socket_refresh_delay: Duration,
    /// Peers reconciled at startup.
    pub initial_peers: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 512,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            send_queue_capacity: 1024,
            app_name: CORE_APP.into(),
            section_update_delay: Duration::from_millis(150),
            trace_messages: false,
            clock_sync_attempts: 5,
            clock_sync_interval: Duration::from_millis(120_000),
            clock_re_sync_interval: Duration::from_millis(3_600_000),
            socket_refresh_delay: Duration::from_millis(5000),
            initial_peers: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Build from resolved settings.
    pub fn from_settings(settings: &MosaicSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            max_message_size: settings.server.max_message_size,
            send_queue_capacity: settings.server.send_queue_capacity,
            app_name: settings.relay.app_name.clone(),
            section_update_delay: Duration::from_millis(settings.relay.section_update_delay_ms),
            trace_messages: settings.logging.trace_messages,
            clock_sync_attempts: settings.clock.sync_attempts,
            clock_sync_interval: Duration::from_millis(settings.clock.sync_interval_ms),
            clock_re_sync_interval: Duration::from_millis(settings.clock.re_sync_interval_ms),
            socket_refresh_delay: Duration::from_millis(settings.peers.socket_refresh_delay_ms),
            initial_peers: settings.peers.initial.clone(),
        }
    }

    /// `host:port` listen address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
