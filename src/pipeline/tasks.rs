// src/pipeline/tasks.rs
//
// Periodic async loops: the signal scheduler (1 Hz) and the analytics
// recorder (configurable). Both take the shared lock only for the
// duration of one state update.

use super::shared_state::SharedHandle;
use super::shutdown::Shutdown;
use crate::analysis::SignalScheduler;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

pub const SCHEDULER_TICK: Duration = Duration::from_secs(1);

pub fn spawn_signal_scheduler(shared: SharedHandle, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut scheduler = SignalScheduler::new();
        let mut ticker = interval(SCHEDULER_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Signal scheduler started");
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let change = scheduler.tick(&mut shared.lock().traffic);
                    if let Some(change) = change {
                        if change.round_started {
                            info!("Round {} started", change.round);
                        }
                        info!(
                            "🚦 Lane {} GREEN for {}s (round {})",
                            change.lane + 1,
                            change.duration,
                            change.round
                        );
                    }
                }
            }
        }
        info!("Signal scheduler stopped");
    })
}

pub fn spawn_analytics_recorder(
    shared: SharedHandle,
    period: Duration,
    shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Analytics recorder started (every {:?})", period);
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let snapshot = shared.record_snapshot(chrono::Utc::now().timestamp());
                    debug!("Analytics snapshot: total={} lanes={:?}", snapshot.total, snapshot.per_lane);
                }
            }
        }
        info!("Analytics recorder stopped");
    })
}
