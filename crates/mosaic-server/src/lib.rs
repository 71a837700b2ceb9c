//! # mosaic-server
//!
//! axum HTTP + `WebSocket` server for the display-wall coordination core.
//!
//! - `WebSocket` relay: fan-out to local clients, topology replay on `read`
//! - Peer federation: outbound links to other servers with `forwardedBy`
//!   loop suppression, reconciled through `POST /peers`
//! - Clock synchronisation: periodic interquartile offset computation and
//!   `clockDiff`/`clockReSync` broadcasts
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod errors;
pub mod federation;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{FederationError, ServerError};
pub use server::MosaicServer;
