//! Periodic eviction of idle sessions.

use crate::checker::session::SessionRegistry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;

/// Spawn the background sweep: every `period`, sessions idle longer than
/// `max_idle` are torn down and evicted. Runs until the process exits.
pub fn spawn_reaper(
    registry: Arc<SessionRegistry>,
    period: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the first sweep
        // happens one full period after startup.
        tick.tick().await;
        loop {
            tick.tick().await;
            let evicted = registry.reap_idle(max_idle).await;
            if evicted > 0 {
                info!(evicted, "reaper evicted inactive sessions");
            }
        }
    })
}
