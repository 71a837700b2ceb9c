//! Periodic clock tasks.

use std::sync::Arc;
use std::time::Duration;

use mosaic_core::protocol;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::engine::ClockSyncEngine;
use crate::websocket::broadcast::BroadcastManager;

/// Tick every `period`, first tick one period from now.
fn delayed_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Periodically ask every client to restart its clock measurement.
pub fn spawn_resync_timer(
    clients: Arc<BroadcastManager>,
    app_name: String,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = delayed_interval(period);
        let frame = protocol::clock_resync(&app_name);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let sent = clients.broadcast_json(&frame).await;
                    info!(recipients = sent, "clock re-sync requested");
                }
            }
        }
        debug!("re-sync timer stopped");
    })
}

/// Periodically compute and distribute clock corrections.
pub fn spawn_sync_timer(
    engine: Arc<ClockSyncEngine>,
    clients: Arc<BroadcastManager>,
    app_name: String,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = delayed_interval(period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let _ = engine.run_cycle(&clients, &app_name).await;
                }
            }
        }
        debug!("clock sync timer stopped");
    })
}
