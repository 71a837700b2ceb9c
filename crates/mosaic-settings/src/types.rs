//! Settings schema.
//!
//! Every struct is `#[serde(default)]`, so a partial file only needs the
//! keys it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MosaicSettings {
    /// Listener and per-socket limits.
    pub server: ServerSettings,
    /// Clock synchronization timers.
    pub clock: ClockSettings,
    /// Message relay behaviour.
    pub relay: RelaySettings,
    /// Peer federation.
    pub peers: PeerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl MosaicSettings {
    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.server.max_connections == 0, "server.maxConnections must be at least 1"),
            (self.server.send_queue_capacity == 0, "server.sendQueueCapacity must be at least 1"),
            (self.clock.sync_attempts == 0, "clock.syncAttempts must be at least 1"),
            (self.clock.sync_interval_ms == 0, "clock.syncIntervalMs must be positive"),
            (self.clock.re_sync_interval_ms == 0, "clock.reSyncIntervalMs must be positive"),
            (self.relay.app_name.is_empty(), "relay.appName must not be empty"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(SettingsError::InvalidValue((*message).to_string())),
            None => Ok(()),
        }
    }
}

/// Listener and per-socket limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Maximum concurrently connected WebSocket clients.
    pub max_connections: usize,
    /// Maximum inbound frame size in bytes.
    pub max_message_size: usize,
    /// Per-socket outbound queue length before frames are dropped.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 512,
            max_message_size: 16 * 1024 * 1024,
            send_queue_capacity: 1024,
        }
    }
}

/// Clock synchronization timers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClockSettings {
    /// Samples a client must contribute before it takes part in a cycle.
    pub sync_attempts: usize,
    /// Offset computation period.
    pub sync_interval_ms: u64,
    /// Period of the `clockReSync` broadcast.
    pub re_sync_interval_ms: u64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            sync_attempts: 5,
            sync_interval_ms: 120_000,
            re_sync_interval_ms: 3_600_000,
        }
    }
}

/// Message relay behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Delay between a replayed `CREATE` and its `UPDATE`.
    pub section_update_delay_ms: u64,
    /// Application id the core answers to.
    pub app_name: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            section_update_delay_ms: 150,
            app_name: "core".to_string(),
        }
    }
}

/// Peer federation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerSettings {
    /// Delay before reconnecting a closed peer socket.
    pub socket_refresh_delay_ms: u64,
    /// Peer URLs reconciled at startup.
    pub initial: Vec<String>,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            socket_refresh_delay_ms: 5000,
            initial: Vec::new(),
        }
    }
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Log every relayed frame at trace level.
    pub trace_messages: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            trace_messages: false,
        }
    }
}
