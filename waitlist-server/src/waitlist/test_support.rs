//! Coordinator wired to an in-memory ledger, for worker and transport tests

use chrono::TimeZone;
use shared::models::{Member, Restaurant};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{
    BroadcastQueue, MemoryQueueIndex, NotificationGateway, WaitlistConfig, WaitlistCoordinator,
    WaitlistLedger,
};
use crate::directory::InMemoryDirectory;
use crate::utils::clock::ManualClock;

pub const RESTAURANT: i64 = 1;
pub const OWNER: i64 = 9;
pub const GUESTS: [i64; 3] = [100, 101, 102];

/// Admission day of the fixture clock (Seoul)
pub const DAY: u32 = 20261018;

pub struct TestWaitlist {
    pub coordinator: WaitlistCoordinator,
    pub jobs: mpsc::Receiver<i64>,
    pub clock: Arc<ManualClock>,
    pub index: Arc<MemoryQueueIndex>,
}

impl TestWaitlist {
    pub fn new() -> Self {
        let noon = chrono_tz::Asia::Seoul
            .with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis();
        let clock = Arc::new(ManualClock::new(noon));
        let index = Arc::new(MemoryQueueIndex::new(clock.clone(), 600));

        let directory = InMemoryDirectory::new();
        directory.upsert_member(Member {
            id: OWNER,
            nickname: "owner".into(),
        });
        for id in GUESTS {
            directory.upsert_member(Member {
                id,
                nickname: format!("guest-{id}"),
            });
        }
        directory.upsert_restaurant(Restaurant {
            id: RESTAURANT,
            name: "Noodle Bar".into(),
            owner_id: OWNER,
            timezone: Some("Asia/Seoul".into()),
        });

        let (broadcasts, jobs) = BroadcastQueue::channel(64);
        let coordinator = WaitlistCoordinator::new(
            WaitlistLedger::open_in_memory().unwrap(),
            index.clone(),
            NotificationGateway::new(),
            Arc::new(directory),
            clock.clone(),
            WaitlistConfig::default(),
            broadcasts,
        );

        Self {
            coordinator,
            jobs,
            clock,
            index,
        }
    }
}
