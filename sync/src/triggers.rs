//! Background drain triggers.
//!
//! Besides the drain scheduled after each local write, the active namespace
//! is drained when the triggers start, whenever the network comes back
//! online, and on a periodic catch-all interval.

use crate::engine::{DrainOutcome, SyncEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to the trigger task.
///
/// Dropping the handle without calling [`TriggerHandle::stop`] detaches the
/// loop: it keeps draining until the runtime shuts down.
#[derive(Debug)]
pub struct TriggerHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TriggerHandle {
    /// Stop the trigger loop and wait for it to exit. A drain in progress is
    /// allowed to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "trigger task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start the trigger loop on the current tokio runtime.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn spawn_triggers(engine: Arc<SyncEngine>, period: Duration) -> TriggerHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let mut online_rx = engine.network().subscribe();

    let task = tokio::spawn(async move {
        tracing::debug!(period_secs = period.as_secs(), "sync triggers started");
        run_drain(&engine, "start").await;

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip first immediate tick
        ticker.tick().await;

        let mut detached = false;
        loop {
            tokio::select! {
                stop = &mut stop_rx, if !detached => match stop {
                    Ok(()) => break,
                    // Handle dropped
                    Err(_) => detached = true,
                },
                _ = ticker.tick() => run_drain(&engine, "interval").await,
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    if online {
                        run_drain(&engine, "online").await;
                    }
                }
            }
        }

        tracing::debug!("sync triggers stopped");
    });

    TriggerHandle { stop_tx, task }
}

async fn run_drain(engine: &SyncEngine, trigger: &'static str) {
    match engine.drain_current().await {
        DrainOutcome::Stopped {
            pushed, remaining, ..
        } => tracing::debug!(trigger, pushed, remaining, "triggered drain stopped"),
        outcome => tracing::trace!(trigger, ?outcome, "triggered drain"),
    }
}
