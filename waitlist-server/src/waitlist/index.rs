//! Queue index
//!
//! Disposable projection of the Waiting entries of each restaurant, used for
//! cheap rank/count lookups. Everything here can be rebuilt from the ledger,
//! so callers treat every operation as advisory.

use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::utils::clock::Clock;

/// Index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Queue index unavailable: {0}")]
    Unavailable(String),

    #[error("Not indexed: restaurant={restaurant_id}, entry={entry_id:?}")]
    NotFound {
        restaurant_id: i64,
        entry_id: Option<i64>,
    },
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Where a member last joined a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSnapshot {
    pub restaurant_id: i64,
    pub entry_id: i64,
    pub waiting_number: u32,
    /// Snapshot is ignored after this instant (UTC millis)
    pub expires_at: i64,
}

/// Rank/count index over Waiting entries
///
/// Each restaurant holds one admission day at a time. Writes for a newer day
/// replace the older day's state; reads for any other day are `NotFound`.
pub trait QueueIndex: Send + Sync {
    /// Upsert an entry scored by its waiting number
    fn add_entry(
        &self,
        restaurant_id: i64,
        day: u32,
        entry_id: i64,
        waiting_number: u32,
    ) -> IndexResult<()>;

    /// Remove an entry; clears the member's snapshot if it points at this entry
    fn remove_entry(&self, restaurant_id: i64, entry_id: i64, member_id: i64) -> IndexResult<()>;

    /// Zero-based position among the restaurant's indexed entries
    fn rank(&self, restaurant_id: i64, entry_id: i64) -> IndexResult<u32>;

    /// Size of the day's active set (or the cached count if one was set since the last change)
    fn count(&self, restaurant_id: i64, day: u32) -> IndexResult<u32>;

    /// Overwrite the cached count for the day
    fn set_count(&self, restaurant_id: i64, day: u32, count: u32) -> IndexResult<()>;

    /// Record a member snapshot with a bounded lifetime
    fn put_member_snapshot(
        &self,
        member_id: i64,
        restaurant_id: i64,
        entry_id: i64,
        waiting_number: u32,
    ) -> IndexResult<()>;

    /// Unexpired snapshot for a member
    fn member_snapshot(&self, member_id: i64) -> IndexResult<Option<MemberSnapshot>>;

    /// Replace a restaurant's active set with the day's `(entry_id, waiting_number)` pairs
    fn replace_active_set(
        &self,
        restaurant_id: i64,
        day: u32,
        entries: &[(i64, u32)],
    ) -> IndexResult<()>;

    /// Restaurants the index currently holds state for
    fn tracked_restaurants(&self) -> IndexResult<Vec<i64>>;
}

#[derive(Debug, Default)]
struct RestaurantQueue {
    day: u32,
    by_number: BTreeMap<u32, i64>,
    numbers: HashMap<i64, u32>,
    cached_count: Option<u32>,
}

impl RestaurantQueue {
    fn for_day(day: u32) -> Self {
        Self {
            day,
            ..Self::default()
        }
    }

    /// Move to `day` if it is newer; false when `day` is older than the held day
    fn roll_to(&mut self, day: u32) -> bool {
        if day > self.day {
            *self = Self::for_day(day);
        }
        day == self.day
    }

    fn insert(&mut self, entry_id: i64, waiting_number: u32) {
        if let Some(old) = self.numbers.insert(entry_id, waiting_number) {
            self.by_number.remove(&old);
        }
        self.by_number.insert(waiting_number, entry_id);
        self.cached_count = None;
    }

    fn remove(&mut self, entry_id: i64) {
        if let Some(number) = self.numbers.remove(&entry_id) {
            self.by_number.remove(&number);
        }
        self.cached_count = None;
    }

    fn count(&self) -> u32 {
        self.cached_count.unwrap_or(self.by_number.len() as u32)
    }

    fn is_idle(&self) -> bool {
        self.by_number.is_empty() && self.cached_count.unwrap_or(0) == 0
    }
}

/// In-process index
pub struct MemoryQueueIndex {
    queues: DashMap<i64, RestaurantQueue>,
    snapshots: DashMap<i64, MemberSnapshot>,
    clock: Arc<dyn Clock>,
    snapshot_ttl_ms: i64,
}

impl MemoryQueueIndex {
    pub fn new(clock: Arc<dyn Clock>, snapshot_ttl_secs: u64) -> Self {
        Self {
            queues: DashMap::new(),
            snapshots: DashMap::new(),
            clock,
            snapshot_ttl_ms: snapshot_ttl_secs as i64 * 1000,
        }
    }
}

impl QueueIndex for MemoryQueueIndex {
    fn add_entry(
        &self,
        restaurant_id: i64,
        day: u32,
        entry_id: i64,
        waiting_number: u32,
    ) -> IndexResult<()> {
        let mut queue = self
            .queues
            .entry(restaurant_id)
            .or_insert_with(|| RestaurantQueue::for_day(day));
        if queue.roll_to(day) {
            queue.insert(entry_id, waiting_number);
        }
        Ok(())
    }

    fn remove_entry(&self, restaurant_id: i64, entry_id: i64, member_id: i64) -> IndexResult<()> {
        if let Some(mut queue) = self.queues.get_mut(&restaurant_id) {
            queue.remove(entry_id);
        }
        self.queues
            .remove_if(&restaurant_id, |_, queue| queue.is_idle());
        self.snapshots
            .remove_if(&member_id, |_, snapshot| snapshot.entry_id == entry_id);
        Ok(())
    }

    fn rank(&self, restaurant_id: i64, entry_id: i64) -> IndexResult<u32> {
        let not_found = || IndexError::NotFound {
            restaurant_id,
            entry_id: Some(entry_id),
        };
        let queue = self.queues.get(&restaurant_id).ok_or_else(not_found)?;
        let number = queue.numbers.get(&entry_id).ok_or_else(not_found)?;
        Ok(queue.by_number.range(..*number).count() as u32)
    }

    fn count(&self, restaurant_id: i64, day: u32) -> IndexResult<u32> {
        self.queues
            .get(&restaurant_id)
            .filter(|queue| queue.day == day)
            .map(|queue| queue.count())
            .ok_or(IndexError::NotFound {
                restaurant_id,
                entry_id: None,
            })
    }

    fn set_count(&self, restaurant_id: i64, day: u32, count: u32) -> IndexResult<()> {
        let mut queue = self
            .queues
            .entry(restaurant_id)
            .or_insert_with(|| RestaurantQueue::for_day(day));
        if queue.roll_to(day) {
            queue.cached_count = Some(count);
        }
        Ok(())
    }

    fn put_member_snapshot(
        &self,
        member_id: i64,
        restaurant_id: i64,
        entry_id: i64,
        waiting_number: u32,
    ) -> IndexResult<()> {
        let snapshot = MemberSnapshot {
            restaurant_id,
            entry_id,
            waiting_number,
            expires_at: self.clock.now_millis() + self.snapshot_ttl_ms,
        };
        self.snapshots.insert(member_id, snapshot);
        Ok(())
    }

    fn member_snapshot(&self, member_id: i64) -> IndexResult<Option<MemberSnapshot>> {
        let now = self.clock.now_millis();
        self.snapshots
            .remove_if(&member_id, |_, snapshot| snapshot.expires_at <= now);
        Ok(self.snapshots.get(&member_id).map(|s| *s))
    }

    fn replace_active_set(
        &self,
        restaurant_id: i64,
        day: u32,
        entries: &[(i64, u32)],
    ) -> IndexResult<()> {
        if entries.is_empty() {
            self.queues.remove(&restaurant_id);
            return Ok(());
        }

        let mut queue = RestaurantQueue::for_day(day);
        for &(entry_id, waiting_number) in entries {
            queue.insert(entry_id, waiting_number);
        }
        queue.cached_count = Some(entries.len() as u32);
        self.queues.insert(restaurant_id, queue);
        Ok(())
    }

    fn tracked_restaurants(&self) -> IndexResult<Vec<i64>> {
        let mut restaurants: Vec<i64> = self.queues.iter().map(|e| *e.key()).collect();
        restaurants.sort_unstable();
        Ok(restaurants)
    }
}
