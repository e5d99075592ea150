//! Background staleness sweeper
//!
//! One task per process. On every tick it force-releases locks whose
//! holders stopped refreshing them and tears down connections that have
//! gone quiet, with the same cascade an explicit disconnect runs.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::Coordinator;

/// Reason broadcast with every sweeper-initiated force unlock
pub const STALE_LOCK_REASON: &str = "Lock expired due to inactivity";

/// Run sweep passes until the shutdown flag flips or its sender is gone
pub async fn run(coordinator: Coordinator, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(coordinator.config().sweep_interval_seconds);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(period_secs = period.as_secs(), "Sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (released, reaped) = sweep_once(&coordinator);
                if released > 0 || reaped > 0 {
                    info!(released, reaped, "Sweep pass complete");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Sweeper stopped");
}

/// One pass: stale locks first, idle connections second
///
/// Returns how many locks were released and how many connections reaped.
pub fn sweep_once(coordinator: &Coordinator) -> (usize, usize) {
    let config = coordinator.config();

    let ttl = chrono::Duration::seconds(
        i64::try_from(config.lock_ttl_seconds).unwrap_or(i64::MAX),
    );
    let mut released = 0;
    for key in coordinator.locks().stale_locks(ttl) {
        if coordinator.locks().force_unlock(&key, STALE_LOCK_REASON) {
            released += 1;
        }
    }

    let idle = coordinator
        .registry()
        .idle_connections(Duration::from_secs(config.idle_timeout_seconds));
    let reaped = idle.len();
    for connection_id in &idle {
        debug!(connection_id = %connection_id, "Reaping idle connection");
        coordinator.disconnect(connection_id);
    }

    (released, reaped)
}
