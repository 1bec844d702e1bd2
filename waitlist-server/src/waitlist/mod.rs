//! Seating waitlist
//!
//! # Modules
//!
//! - [`ledger`] - durable, authoritative entry store (redb)
//! - [`index`] - rebuildable rank/count projection of Waiting entries
//! - [`gateway`] - member channels and restaurant topics
//! - [`coordinator`] - business rules; the only writer
//! - [`worker`] - post-commit broadcast and periodic reconciliation

pub mod coordinator;
pub mod gateway;
pub mod index;
pub mod ledger;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{
    QueueBroadcast, QueuePosition, ReconcileReport, ReconcileSummary, Resource, WaitlistConfig,
    WaitlistCoordinator, WaitlistError, WaitlistResult,
};
pub use gateway::NotificationGateway;
pub use index::{IndexError, IndexResult, MemberSnapshot, MemoryQueueIndex, QueueIndex};
pub use ledger::{LedgerError, LedgerResult, NewWaiting, WaitlistLedger};
pub use worker::{BroadcastQueue, BroadcastWorker, ReconcileWorker};
