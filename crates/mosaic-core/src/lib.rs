//! # mosaic-core
//!
//! Foundation types for the Mosaic display-wall coordination server.
//!
//! - **Topology**: [`topology::TopologyStore`] tracks sections and the
//!   connections that mirror one space onto others. Pure, no I/O.
//! - **Protocol**: the WebSocket envelope and the core-app frames
//!   (replay, clock, handshake) in [`protocol`]
//! - **IDs**: branded newtypes in [`ids`]
//! - **Errors**: `thiserror` hierarchy in [`errors`]
//! - **Logging**: `tracing` subscriber setup and test capture in [`logging`]

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod topology;

pub use errors::{ProtocolError, TopologyError};
pub use ids::{ConnectionId, SectionId, ServerId};
