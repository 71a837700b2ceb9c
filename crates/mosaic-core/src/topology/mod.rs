//! Section and connection topology.
//!
//! [`TopologyStore`] owns both collections in [`SlotArena`]s so that ids
//! stay stable across deletions. It performs no I/O; callers broadcast
//! the resulting changes.

mod arena;
mod connection;
mod geometry;
mod section;
mod store;

pub use arena::SlotArena;
pub use connection::{Connection, ReplicaMapping};
pub use geometry::{Extent, Rect, rescale_geometry};
pub use section::{App, ClientFrame, Offset, Section, SpaceFrames};
pub use store::TopologyStore;
