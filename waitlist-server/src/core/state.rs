use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, Result};
use crate::directory::InMemoryDirectory;
use crate::utils::clock::{Clock, SystemClock};
use crate::waitlist::{
    BroadcastQueue, BroadcastWorker, MemoryQueueIndex, NotificationGateway, ReconcileWorker,
    WaitlistCoordinator, WaitlistLedger,
};

/// Shared server state
///
/// Cheap to clone; every field is reference counted.
///
/// | Field | Meaning |
/// |-------|---------|
/// | config | immutable configuration |
/// | coordinator | waitlist business rules |
/// | directory | members and restaurants |
/// | broadcast_jobs | receiver handed to the broadcast worker once |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub coordinator: WaitlistCoordinator,
    pub directory: InMemoryDirectory,
    broadcast_jobs: Arc<Mutex<Option<mpsc::Receiver<i64>>>>,
}

impl ServerState {
    /// Open the ledger, load the directory seed and wire the coordinator
    pub async fn initialize(config: &Config) -> Result<Self> {
        Self::initialize_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn initialize_with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.ensure_work_dir_structure()?;

        let ledger = WaitlistLedger::open(config.ledger_path())?;
        tracing::info!(path = %config.ledger_path().display(), "Ledger opened");

        let directory = match &config.directory_seed_path {
            Some(path) => {
                let directory = InMemoryDirectory::load(path)?;
                tracing::info!(
                    members = directory.member_count(),
                    restaurants = directory.restaurant_count(),
                    "Directory seed loaded"
                );
                directory
            }
            None => InMemoryDirectory::new(),
        };

        let index = Arc::new(MemoryQueueIndex::new(
            clock.clone(),
            config.snapshot_ttl_secs,
        ));
        let (broadcasts, jobs) = BroadcastQueue::channel(config.broadcast_queue_capacity);

        let coordinator = WaitlistCoordinator::new(
            ledger,
            index,
            NotificationGateway::new(),
            Arc::new(directory.clone()),
            clock,
            config.waitlist(),
            broadcasts,
        );

        Ok(Self {
            config: config.clone(),
            coordinator,
            directory,
            broadcast_jobs: Arc::new(Mutex::new(Some(jobs))),
        })
    }

    /// Register the startup reconcile, the broadcast worker and the
    /// periodic reconciler
    ///
    /// The broadcast receiver can only be taken once; a second call skips
    /// the broadcast worker.
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        let shutdown = tasks.shutdown_token();

        let coordinator = self.coordinator.clone();
        tasks.spawn("startup_reconcile", TaskKind::Warmup, async move {
            let summary = coordinator.reconcile_all().await;
            tracing::info!(
                restaurants = summary.restaurants,
                drifted = summary.drifted,
                failed = summary.failed,
                "Queue index rebuilt from ledger"
            );
        });

        match self.broadcast_jobs.lock().take() {
            Some(jobs) => {
                let worker = BroadcastWorker::new(self.coordinator.clone());
                tasks.spawn(
                    "queue_broadcaster",
                    TaskKind::Worker,
                    worker.run(jobs, shutdown.clone()),
                );
            }
            None => tracing::warn!("Broadcast worker already started"),
        }

        let reconciler = ReconcileWorker::new(
            self.coordinator.clone(),
            Duration::from_secs(self.config.reconcile_interval_secs.max(1)),
        );
        tasks.spawn("queue_reconciler", TaskKind::Periodic, reconciler.run(shutdown));
    }
}
