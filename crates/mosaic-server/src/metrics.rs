//! Metric names.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! embedding binary installs a recorder.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Client connection lifetime (histogram, seconds).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Frames dropped because a client's send queue was full (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Connections refused at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Peer link reconnect attempts (counter, labels: peer).
pub const PEER_RECONNECTS_TOTAL: &str = "peer_reconnects_total";
/// Frames forwarded to peers (counter).
pub const PEER_FORWARDS_TOTAL: &str = "peer_forwards_total";
/// Per-client clock corrections broadcast (counter).
pub const CLOCK_CORRECTIONS_TOTAL: &str = "clock_corrections_total";
