//! Clock synchronisation across the clients of one server.
//!
//! Clients report measured offsets in `syncResults` frames. The engine
//! keeps a bounded window per client and, on each cycle, broadcasts
//! `clockDiff` corrections; a slower timer broadcasts `clockReSync` so
//! clients start measuring afresh.

pub mod engine;
pub mod timers;
pub mod window;

pub use engine::{ClockSyncEngine, SyncOutcome};
pub use window::ObservationWindow;
