use super::*;
use crate::directory::InMemoryDirectory;
use crate::utils::clock::ManualClock;
use crate::waitlist::index::{IndexError, MemberSnapshot, MemoryQueueIndex};
use chrono::TimeZone;
use shared::models::Member;
use tokio::sync::mpsc;

const NOODLE_BAR: i64 = 1;
const TACO_STAND: i64 = 2;
const OWNER: i64 = 9;
const ALICE: i64 = 100;
const BOB: i64 = 101;
const CAROL: i64 = 102;

/// Admission day of the harness clock
const TODAY: u32 = 20261018;

struct Harness {
    coordinator: WaitlistCoordinator,
    jobs: mpsc::Receiver<i64>,
    clock: Arc<ManualClock>,
    index: Arc<MemoryQueueIndex>,
}

fn seoul_millis(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
    chrono_tz::Asia::Seoul
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .unwrap()
        .timestamp_millis()
}

fn directory() -> Arc<InMemoryDirectory> {
    let directory = InMemoryDirectory::new();
    for (id, nickname) in [(OWNER, "owner"), (ALICE, "alice"), (BOB, "bob"), (CAROL, "carol")] {
        directory.upsert_member(Member {
            id,
            nickname: nickname.into(),
        });
    }
    directory.upsert_restaurant(Restaurant {
        id: NOODLE_BAR,
        name: "Noodle Bar".into(),
        owner_id: OWNER,
        timezone: Some("Asia/Seoul".into()),
    });
    directory.upsert_restaurant(Restaurant {
        id: TACO_STAND,
        name: "Taco Stand".into(),
        owner_id: OWNER,
        timezone: None,
    });
    Arc::new(directory)
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(seoul_millis(2026, 10, 18, 12, 0)));
    let index = Arc::new(MemoryQueueIndex::new(clock.clone(), 600));
    let (coordinator, jobs) = build(index.clone(), clock.clone());
    Harness {
        coordinator,
        jobs,
        clock,
        index,
    }
}

fn build(
    index: Arc<dyn QueueIndex>,
    clock: Arc<ManualClock>,
) -> (WaitlistCoordinator, mpsc::Receiver<i64>) {
    let (broadcasts, jobs) = BroadcastQueue::channel(1024);
    let coordinator = WaitlistCoordinator::new(
        WaitlistLedger::open_in_memory().unwrap(),
        index,
        NotificationGateway::new(),
        directory(),
        clock,
        WaitlistConfig::default(),
        broadcasts,
    );
    (coordinator, jobs)
}

fn drain(jobs: &mut mpsc::Receiver<i64>) -> Vec<i64> {
    let mut out = Vec::new();
    while let Ok(id) = jobs.try_recv() {
        out.push(id);
    }
    out
}

/// Index whose every operation fails
struct FailingIndex;

impl QueueIndex for FailingIndex {
    fn add_entry(&self, _: i64, _: u32, _: i64, _: u32) -> IndexResult<()> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
    fn remove_entry(&self, _: i64, _: i64, _: i64) -> IndexResult<()> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
    fn rank(&self, _: i64, _: i64) -> IndexResult<u32> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
    fn count(&self, _: i64, _: u32) -> IndexResult<u32> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
    fn set_count(&self, _: i64, _: u32, _: u32) -> IndexResult<()> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
    fn put_member_snapshot(&self, _: i64, _: i64, _: i64, _: u32) -> IndexResult<()> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
    fn member_snapshot(&self, _: i64) -> IndexResult<Option<MemberSnapshot>> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
    fn replace_active_set(&self, _: i64, _: u32, _: &[(i64, u32)]) -> IndexResult<()> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
    fn tracked_restaurants(&self) -> IndexResult<Vec<i64>> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn test_full_lifecycle_scenario() {
    let mut h = harness();
    let c = &h.coordinator;

    let a = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    assert_eq!((a.waiting_number, a.estimated_wait_minutes), (1, 15));
    let a_pos = c.my_queue_position(ALICE).await.unwrap().unwrap();
    assert_eq!((a_pos.position_in_queue, a_pos.estimated_wait_minutes), (0, 15));

    let b = c.create_waiting(BOB, NOODLE_BAR, 3).await.unwrap();
    assert_eq!((b.waiting_number, b.estimated_wait_minutes), (2, 30));
    let b_pos = c.my_queue_position(BOB).await.unwrap().unwrap();
    assert_eq!((b_pos.position_in_queue, b_pos.estimated_wait_minutes), (1, 30));
    assert_eq!(b_pos.total_waiting_count, 2);

    let called = c.call(a.id, OWNER).await.unwrap();
    assert_eq!(called.status, WaitingStatus::Called);
    assert!(called.called_at.is_some());
    assert_eq!(c.get_waiting_count(NOODLE_BAR).await.unwrap().waiting_count, 1);
    assert!(c.my_queue_position(ALICE).await.unwrap().is_none());

    let report = c.broadcast_queue_state(NOODLE_BAR).await.unwrap();
    assert_eq!(report.waiting_count, 1);
    assert_eq!(
        report.positions,
        vec![QueuePosition {
            waiting_id: b.id,
            member_id: BOB,
            position: 0,
            estimated_wait_minutes: 15,
        }]
    );
    let b_pos = c.my_queue_position(BOB).await.unwrap().unwrap();
    assert_eq!((b_pos.position_in_queue, b_pos.estimated_wait_minutes), (0, 15));

    let seated = c.seat(a.id, OWNER).await.unwrap();
    assert_eq!(seated.status, WaitingStatus::Seated);

    let cancelled = c.cancel(b.id, BOB).await.unwrap();
    assert_eq!(cancelled.status, WaitingStatus::Cancelled);
    assert_eq!(c.get_waiting_count(NOODLE_BAR).await.unwrap().waiting_count, 0);

    // create, create, call, cancel each queued a broadcast; seat did not
    assert_eq!(drain(&mut h.jobs), vec![NOODLE_BAR; 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_admissions_get_unique_numbers() {
    let h = harness();
    let parties = 32u32;

    let mut handles = Vec::new();
    for _ in 0..parties {
        let coordinator = h.coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.create_waiting(ALICE, NOODLE_BAR, 2).await
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap().unwrap().waiting_number);
    }
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=parties).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_numbers_increase_in_completion_order() {
    let h = harness();
    let mut last = 0;
    for member in [ALICE, BOB, CAROL, ALICE] {
        let entry = h.coordinator.create_waiting(member, NOODLE_BAR, 1).await.unwrap();
        assert!(entry.waiting_number > last);
        last = entry.waiting_number;
    }
}

#[tokio::test]
async fn test_cancel_outside_waiting_is_invalid_transition() {
    let h = harness();
    let c = &h.coordinator;
    let a = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    c.create_waiting(BOB, NOODLE_BAR, 2).await.unwrap();
    c.call(a.id, OWNER).await.unwrap();

    let before = c.get_waiting_count(NOODLE_BAR).await.unwrap().waiting_count;
    let err = c.cancel(a.id, ALICE).await.unwrap_err();
    assert!(matches!(
        err,
        WaitlistError::InvalidTransition {
            from: WaitingStatus::Called,
            ..
        }
    ));
    assert_eq!(c.get_waiting_count(NOODLE_BAR).await.unwrap().waiting_count, before);
}

#[tokio::test]
async fn test_seat_and_no_show_require_called() {
    let h = harness();
    let c = &h.coordinator;
    let a = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();

    assert!(matches!(
        c.seat(a.id, OWNER).await,
        Err(WaitlistError::InvalidTransition { .. })
    ));
    assert!(matches!(
        c.no_show(a.id, OWNER).await,
        Err(WaitlistError::InvalidTransition { .. })
    ));

    c.call(a.id, OWNER).await.unwrap();
    let gone = c.no_show(a.id, OWNER).await.unwrap();
    assert_eq!(gone.status, WaitingStatus::NoShow);
    assert!(matches!(
        c.call(a.id, OWNER).await,
        Err(WaitlistError::InvalidTransition { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_call_cancel_race_has_single_winner() {
    for _ in 0..10 {
        let h = harness();
        let entry = h.coordinator.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();

        let caller = h.coordinator.clone();
        let canceller = h.coordinator.clone();
        let (called, cancelled) = tokio::join!(
            tokio::spawn(async move { caller.call(entry.id, OWNER).await }),
            tokio::spawn(async move { canceller.cancel(entry.id, ALICE).await }),
        );
        let (called, cancelled) = (called.unwrap(), cancelled.unwrap());

        assert!(called.is_ok() ^ cancelled.is_ok());
        let loser = if called.is_ok() { cancelled } else { called };
        assert!(matches!(loser, Err(WaitlistError::InvalidTransition { .. })));

        let history = h.coordinator.ledger().history(entry.id).unwrap();
        assert_eq!(history.len(), 2);
    }
}

#[tokio::test]
async fn test_authorization_checked_before_status() {
    let h = harness();
    let c = &h.coordinator;
    let a = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();

    assert!(matches!(
        c.call(a.id, BOB).await,
        Err(WaitlistError::OwnerRequired {
            restaurant_id: NOODLE_BAR,
            member_id: BOB
        })
    ));
    assert!(matches!(c.cancel(a.id, BOB).await, Err(WaitlistError::Forbidden(_))));
    // Wrong actor on an entry that also fails the status guard
    assert!(matches!(
        c.seat(a.id, ALICE).await,
        Err(WaitlistError::OwnerRequired { .. })
    ));

    assert_eq!(c.ledger().get(a.id).unwrap().unwrap().status, WaitingStatus::Waiting);
}

#[tokio::test]
async fn test_create_validation_and_lookups() {
    let h = harness();
    let c = &h.coordinator;

    for bad in [0, -3] {
        assert!(matches!(
            c.create_waiting(ALICE, NOODLE_BAR, bad).await,
            Err(WaitlistError::Validation(_))
        ));
    }
    assert!(matches!(
        c.create_waiting(4242, NOODLE_BAR, 2).await,
        Err(WaitlistError::NotFound {
            resource: Resource::Member,
            ..
        })
    ));
    assert!(matches!(
        c.create_waiting(ALICE, 4242, 2).await,
        Err(WaitlistError::NotFound {
            resource: Resource::Restaurant,
            ..
        })
    ));
    assert!(matches!(
        c.call(4242, OWNER).await,
        Err(WaitlistError::NotFound {
            resource: Resource::Waiting,
            ..
        })
    ));
}

#[tokio::test]
async fn test_day_boundary_restarts_numbering() {
    let h = harness();
    let c = &h.coordinator;
    h.clock.set(seoul_millis(2026, 10, 18, 23, 50));

    let late_a = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    let late_b = c.create_waiting(BOB, NOODLE_BAR, 2).await.unwrap();
    assert_eq!(late_b.waiting_number, 2);

    h.clock.set(seoul_millis(2026, 10, 19, 0, 10));
    let early = c.create_waiting(CAROL, NOODLE_BAR, 2).await.unwrap();
    assert_eq!(early.waiting_number, 1);
    assert_eq!(early.estimated_wait_minutes, 15);
    assert_ne!(early.admission_day, late_a.admission_day);

    // Yesterday's Waiting entries stay in the ledger but are not ranked today
    let report = c.broadcast_queue_state(NOODLE_BAR).await.unwrap();
    assert_eq!(report.waiting_count, 1);
    assert!(c.my_queue_position(ALICE).await.unwrap().is_none());
    assert_eq!(
        c.ledger().get(late_a.id).unwrap().unwrap().status,
        WaitingStatus::Waiting
    );
}

#[tokio::test]
async fn test_count_resets_at_local_midnight_without_reconcile() {
    let h = harness();
    let c = &h.coordinator;

    c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    c.broadcast_queue_state(NOODLE_BAR).await.unwrap();
    assert_eq!(c.get_waiting_count(NOODLE_BAR).await.unwrap().waiting_count, 1);
    assert_eq!(h.index.count(NOODLE_BAR, TODAY).unwrap(), 1);

    // 01:00 the next local day; nothing has reconciled the index yet
    h.clock.advance_secs(13 * 3600);
    assert_eq!(c.get_waiting_count(NOODLE_BAR).await.unwrap().waiting_count, 0);

    let early = c.create_waiting(BOB, NOODLE_BAR, 2).await.unwrap();
    assert_eq!(early.waiting_number, 1);
    assert_eq!(c.get_waiting_count(NOODLE_BAR).await.unwrap().waiting_count, 1);
    assert!(h.index.count(NOODLE_BAR, TODAY).is_err());
}

#[tokio::test]
async fn test_day_boundary_is_local_not_utc() {
    let h = harness();
    let c = &h.coordinator;

    // 08:50 and 09:10 in Seoul straddle UTC midnight but are the same local day
    h.clock.set(seoul_millis(2026, 10, 18, 8, 50));
    c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    h.clock.set(seoul_millis(2026, 10, 18, 9, 10));
    let next = c.create_waiting(BOB, NOODLE_BAR, 2).await.unwrap();
    assert_eq!(next.waiting_number, 2);
}

#[tokio::test]
async fn test_broadcast_is_idempotent_and_fans_out() {
    let h = harness();
    let c = &h.coordinator;
    let mut topic = c.gateway().subscribe_restaurant(NOODLE_BAR);
    let mut bob_rx = c.gateway().subscribe_member(BOB);

    let a = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    let b = c.create_waiting(BOB, NOODLE_BAR, 2).await.unwrap();
    let carol = c.create_waiting(CAROL, NOODLE_BAR, 2).await.unwrap();
    c.cancel(a.id, ALICE).await.unwrap();

    let first = c.broadcast_queue_state(NOODLE_BAR).await.unwrap();
    let second = c.broadcast_queue_state(NOODLE_BAR).await.unwrap();
    assert_eq!(first, second);

    let order: Vec<(i64, u32, u32)> = first
        .positions
        .iter()
        .map(|p| (p.waiting_id, p.position, p.estimated_wait_minutes))
        .collect();
    assert_eq!(order, vec![(b.id, 0, 15), (carol.id, 1, 30)]);

    // ETA is persisted on the entry
    assert_eq!(c.ledger().get(carol.id).unwrap().unwrap().estimated_wait_minutes, 30);

    let update = topic.recv().await.unwrap();
    assert_eq!((update.restaurant_id, update.waiting_count), (NOODLE_BAR, 2));

    match bob_rx.recv().await.unwrap() {
        MemberNotification::WaitingQueueUpdate(update) => {
            assert_eq!(update.waiting_id, b.id);
            assert_eq!(update.position_in_queue, 0);
            assert_eq!(update.total_waiting_count, 2);
            assert_eq!(update.restaurant_name, "Noodle Bar");
        }
        other => panic!("unexpected notification: {other:?}"),
    }
}

#[tokio::test]
async fn test_direct_notifications() {
    let h = harness();
    let c = &h.coordinator;
    let mut owner_rx = c.gateway().subscribe_member(OWNER);
    let mut alice_rx = c.gateway().subscribe_member(ALICE);

    let a = c.create_waiting(ALICE, NOODLE_BAR, 4).await.unwrap();
    match owner_rx.recv().await.unwrap() {
        MemberNotification::WaitingNew(notice) => {
            assert_eq!(notice.waiting_id, a.id);
            assert_eq!(notice.member_nickname, "alice");
            assert_eq!(notice.guest_count, 4);
        }
        other => panic!("unexpected notification: {other:?}"),
    }

    c.call(a.id, OWNER).await.unwrap();
    match alice_rx.recv().await.unwrap() {
        MemberNotification::WaitingCalled(notice) => {
            assert_eq!(notice.waiting_id, a.id);
            assert_eq!(notice.restaurant_name, "Noodle Bar");
        }
        other => panic!("unexpected notification: {other:?}"),
    }

    let b = c.create_waiting(BOB, NOODLE_BAR, 2).await.unwrap();
    let _ = owner_rx.recv().await.unwrap();
    c.cancel(b.id, BOB).await.unwrap();
    match owner_rx.recv().await.unwrap() {
        MemberNotification::WaitingCancelled(notice) => {
            assert_eq!(notice.waiting_id, b.id);
            assert_eq!(notice.member_nickname, "bob");
        }
        other => panic!("unexpected notification: {other:?}"),
    }
}

#[tokio::test]
async fn test_index_failure_is_invisible_to_callers() {
    let clock = Arc::new(ManualClock::new(seoul_millis(2026, 10, 18, 12, 0)));
    let (c, _jobs) = build(Arc::new(FailingIndex), clock);

    let a = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    let b = c.create_waiting(BOB, NOODLE_BAR, 2).await.unwrap();
    assert_eq!(b.waiting_number, 2);

    let pos = c.my_queue_position(BOB).await.unwrap().unwrap();
    assert_eq!((pos.position_in_queue, pos.total_waiting_count), (1, 2));
    assert_eq!(c.get_waiting_count(NOODLE_BAR).await.unwrap().waiting_count, 2);

    c.call(a.id, OWNER).await.unwrap();
    c.cancel(b.id, BOB).await.unwrap();
    assert_eq!(c.broadcast_queue_state(NOODLE_BAR).await.unwrap().waiting_count, 0);

    let summary = c.reconcile_all().await;
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_position_falls_back_when_snapshot_expires() {
    let h = harness();
    let c = &h.coordinator;
    let entry = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    assert!(h.index.member_snapshot(ALICE).unwrap().is_some());

    h.clock.advance_secs(601);
    assert!(h.index.member_snapshot(ALICE).unwrap().is_none());

    let pos = c.my_queue_position(ALICE).await.unwrap().unwrap();
    assert_eq!(pos.waiting_id, entry.id);
    // Fallback re-seeds the snapshot
    assert_eq!(h.index.member_snapshot(ALICE).unwrap().unwrap().entry_id, entry.id);
}

#[tokio::test]
async fn test_stale_snapshot_is_not_trusted() {
    let h = harness();
    let c = &h.coordinator;
    let entry = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();

    // Snapshot pointing at an entry of someone else
    let other = c.create_waiting(BOB, NOODLE_BAR, 2).await.unwrap();
    h.index.put_member_snapshot(ALICE, NOODLE_BAR, other.id, 2).unwrap();

    let pos = c.my_queue_position(ALICE).await.unwrap().unwrap();
    assert_eq!(pos.waiting_id, entry.id);
    assert_eq!(pos.position_in_queue, 0);
}

#[tokio::test]
async fn test_reconcile_repairs_drift() {
    let h = harness();
    let c = &h.coordinator;
    let a = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    let b = c.create_waiting(BOB, NOODLE_BAR, 2).await.unwrap();

    // Lose an entry, invent a ghost restaurant
    h.index.remove_entry(NOODLE_BAR, a.id, ALICE).unwrap();
    h.index.add_entry(TACO_STAND, TODAY, 999, 1).unwrap();
    assert_eq!(h.index.rank(NOODLE_BAR, b.id).unwrap(), 0);

    let summary = c.reconcile_all().await;
    assert_eq!(summary.restaurants, 2);
    assert_eq!(summary.drifted, 2);

    assert_eq!(h.index.count(NOODLE_BAR, TODAY).unwrap(), 2);
    assert_eq!(h.index.rank(NOODLE_BAR, b.id).unwrap(), 1);
    assert_eq!(h.index.member_snapshot(ALICE).unwrap().unwrap().entry_id, a.id);
    assert_eq!(h.index.tracked_restaurants().unwrap(), vec![NOODLE_BAR]);

    // Nothing left to repair
    let again = c.reconcile_all().await;
    assert_eq!(again.drifted, 0);
}

#[tokio::test]
async fn test_visibility_and_history() {
    let h = harness();
    let c = &h.coordinator;
    let a = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    c.call(a.id, OWNER).await.unwrap();

    let mine = c.get_waiting(a.id, ALICE).await.unwrap();
    assert_eq!(mine.member_nickname, "alice");
    assert_eq!(mine.restaurant_name, "Noodle Bar");
    assert!(c.get_waiting(a.id, OWNER).await.is_ok());
    assert!(matches!(
        c.get_waiting(a.id, BOB).await,
        Err(WaitlistError::Forbidden(_))
    ));

    let history = c.get_waiting_history(a.id, OWNER).await.unwrap();
    let statuses: Vec<WaitingStatus> = history.iter().map(|h| h.to).collect();
    assert_eq!(statuses, vec![WaitingStatus::Waiting, WaitingStatus::Called]);
    assert_eq!(history[1].actor_id, OWNER);
    assert!(c.get_waiting_history(a.id, BOB).await.is_err());
}

#[tokio::test]
async fn test_listings() {
    let h = harness();
    let c = &h.coordinator;

    let first = c.create_waiting(ALICE, NOODLE_BAR, 2).await.unwrap();
    h.clock.advance_secs(60);
    let second = c.create_waiting(ALICE, TACO_STAND, 2).await.unwrap();
    h.clock.advance_secs(60);
    let bob = c.create_waiting(BOB, NOODLE_BAR, 2).await.unwrap();

    let mine = c.list_my_waitings(ALICE, PageRequest::default()).await.unwrap();
    let ids: Vec<i64> = mine.items.iter().map(|w| w.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert_eq!(mine.items[0].restaurant_name, "Taco Stand");

    let page = c
        .list_restaurant_waitings(NOODLE_BAR, OWNER, PageRequest::new(Some(0), Some(1)))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, first.id);

    let page = c
        .list_restaurant_waitings(NOODLE_BAR, OWNER, PageRequest::new(Some(1), Some(1)))
        .await
        .unwrap();
    assert_eq!(page.items[0].id, bob.id);
    assert_eq!(page.items[0].member_nickname, "bob");

    assert!(matches!(
        c.list_restaurant_waitings(4242, OWNER, PageRequest::default()).await,
        Err(WaitlistError::NotFound { .. })
    ));

    // guests see their own entries, not the whole queue
    assert!(matches!(
        c.list_restaurant_waitings(NOODLE_BAR, ALICE, PageRequest::default()).await,
        Err(WaitlistError::OwnerRequired { .. })
    ));
}

#[tokio::test]
async fn test_restaurant_without_timezone_uses_default() {
    let h = harness();
    let entry = h.coordinator.create_waiting(ALICE, TACO_STAND, 2).await.unwrap();
    assert_eq!(entry.admission_day, 20261018);
}
