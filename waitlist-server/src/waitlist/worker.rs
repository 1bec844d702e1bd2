//! Post-commit background work
//!
//! - [`BroadcastQueue`] / [`BroadcastWorker`]: queue state fan-out, dispatched
//!   after the triggering ledger write has committed
//! - [`ReconcileWorker`]: periodic index rebuild from the ledger
//!
//! Note: redb operations are synchronous; both workers call them inline.

use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::coordinator::WaitlistCoordinator;

/// Producer side of the broadcast job queue (restaurant ids)
#[derive(Clone, Debug)]
pub struct BroadcastQueue {
    tx: mpsc::Sender<i64>,
}

impl BroadcastQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<i64>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Never blocks; a full or closed queue only loses this trigger
    pub fn enqueue(&self, restaurant_id: i64) {
        match self.tx.try_send(restaurant_id) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(restaurant_id, "Broadcast queue full, dropping trigger");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(restaurant_id, "Broadcast queue closed, dropping trigger");
            }
        }
    }
}

/// Drains broadcast jobs; bursts for the same restaurant collapse into one run
pub struct BroadcastWorker {
    coordinator: WaitlistCoordinator,
}

impl BroadcastWorker {
    pub fn new(coordinator: WaitlistCoordinator) -> Self {
        Self { coordinator }
    }

    pub async fn run(self, mut jobs: mpsc::Receiver<i64>, shutdown: CancellationToken) {
        tracing::info!("BroadcastWorker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("BroadcastWorker received shutdown signal");
                    break;
                }
                job = jobs.recv() => {
                    let Some(first) = job else {
                        tracing::info!("Broadcast channel closed, shutting down BroadcastWorker");
                        break;
                    };
                    let mut pending = BTreeSet::from([first]);
                    while let Ok(next) = jobs.try_recv() {
                        pending.insert(next);
                    }
                    for restaurant_id in pending {
                        self.broadcast(restaurant_id).await;
                    }
                }
            }
        }
    }

    async fn broadcast(&self, restaurant_id: i64) {
        match self.coordinator.broadcast_queue_state(restaurant_id).await {
            Ok(report) => {
                tracing::debug!(
                    restaurant_id,
                    waiting_count = report.waiting_count,
                    "Queue state broadcast"
                );
            }
            Err(e) => {
                tracing::error!(restaurant_id, error = %e, "Queue state broadcast failed");
            }
        }
    }
}

/// Periodic index reconciliation
pub struct ReconcileWorker {
    coordinator: WaitlistCoordinator,
    interval: Duration,
}

impl ReconcileWorker {
    pub fn new(coordinator: WaitlistCoordinator, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "ReconcileWorker started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // startup pass runs separately

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("ReconcileWorker received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let summary = self.coordinator.reconcile_all().await;
                    let pruned = self.coordinator.gateway().prune_idle();
                    if summary.drifted > 0 || pruned > 0 {
                        tracing::info!(
                            restaurants = summary.restaurants,
                            drifted = summary.drifted,
                            pruned_channels = pruned,
                            "Reconciliation pass finished"
                        );
                    }
                }
            }
        }
    }
}
