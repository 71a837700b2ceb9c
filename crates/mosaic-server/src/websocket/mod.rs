//! Client-facing WebSocket plumbing.

pub mod broadcast;
pub mod connection;
pub mod relay;
pub mod scheduler;
pub mod session;

pub use broadcast::BroadcastManager;
pub use connection::{ClientConnection, ConnectionState};
pub use relay::{MessageRelay, RelayOutcome};
pub use scheduler::DeferredSender;
pub use session::{SessionLimits, run_ws_session};
