//! WaitlistCoordinator: admission, transitions and queue fan-out
//!
//! ```text
//! request ──▶ authorize ──▶ ledger (transactional, authoritative)
//!                              │ committed
//!                              ├──▶ queue index     (best-effort, logged)
//!                              ├──▶ direct notices  (best-effort)
//!                              └──▶ broadcast queue (post-commit job)
//! ```
//!
//! Index and gateway failures never reach the caller; reconciliation
//! rebuilds the index from the ledger.

mod error;

pub use error::{Resource, WaitlistError, WaitlistResult};

use chrono_tz::Tz;
use shared::message::{
    MemberNotification, QueuePositionUpdate, WaitingCalledNotice, WaitingCancelledNotice,
    WaitingCountUpdate, WaitingNewNotice,
};
use shared::models::{
    Member, Page, PageRequest, Restaurant, StatusChange, WaitingCount, WaitingEntry,
    WaitingResponse, WaitingStatus,
};
use shared::util::{admission_day, parse_timezone};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::gateway::NotificationGateway;
use super::index::{IndexResult, QueueIndex};
use super::ledger::{NewWaiting, WaitlistLedger};
use super::worker::BroadcastQueue;
use crate::directory::{MemberDirectory, RestaurantDirectory};
use crate::utils::clock::Clock;

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct WaitlistConfig {
    /// ETA minutes per party ahead (inclusive of the party itself)
    pub service_minutes_per_party: u32,
    /// Admission-day timezone for restaurants without one
    pub default_timezone: Tz,
}

impl Default for WaitlistConfig {
    fn default() -> Self {
        Self {
            service_minutes_per_party: 15,
            default_timezone: chrono_tz::Asia::Seoul,
        }
    }
}

/// One member's slot in a broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePosition {
    pub waiting_id: i64,
    pub member_id: i64,
    pub position: u32,
    pub estimated_wait_minutes: u32,
}

/// What a broadcast sent out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBroadcast {
    pub restaurant_id: i64,
    pub waiting_count: u32,
    pub positions: Vec<QueuePosition>,
}

/// Outcome of reconciling one restaurant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub restaurant_id: i64,
    pub waiting_count: u32,
    /// Index disagreed with the ledger before the rebuild
    pub drifted: bool,
}

/// Outcome of a full reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub restaurants: usize,
    pub drifted: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct WaitlistCoordinator {
    ledger: WaitlistLedger,
    index: Arc<dyn QueueIndex>,
    gateway: NotificationGateway,
    members: Arc<dyn MemberDirectory>,
    restaurants: Arc<dyn RestaurantDirectory>,
    clock: Arc<dyn Clock>,
    config: WaitlistConfig,
    broadcasts: BroadcastQueue,
}

impl WaitlistCoordinator {
    pub fn new<D>(
        ledger: WaitlistLedger,
        index: Arc<dyn QueueIndex>,
        gateway: NotificationGateway,
        directory: Arc<D>,
        clock: Arc<dyn Clock>,
        config: WaitlistConfig,
        broadcasts: BroadcastQueue,
    ) -> Self
    where
        D: MemberDirectory + RestaurantDirectory + 'static,
    {
        let members: Arc<dyn MemberDirectory> = directory.clone();
        let restaurants: Arc<dyn RestaurantDirectory> = directory;
        Self {
            ledger,
            index,
            gateway,
            members,
            restaurants,
            clock,
            config,
            broadcasts,
        }
    }

    pub fn gateway(&self) -> &NotificationGateway {
        &self.gateway
    }

    pub fn ledger(&self) -> &WaitlistLedger {
        &self.ledger
    }

    // ========== Commands ==========

    /// Admit a party into a restaurant's queue
    pub async fn create_waiting(
        &self,
        member_id: i64,
        restaurant_id: i64,
        guest_count: i32,
    ) -> WaitlistResult<WaitingEntry> {
        if guest_count <= 0 {
            return Err(WaitlistError::Validation(format!(
                "guestCount must be at least 1, got {guest_count}"
            )));
        }
        let member = self.require_member(member_id).await?;
        let restaurant = self.require_restaurant(restaurant_id).await?;

        let now = self.clock.now_millis();
        let entry = self.ledger.admit(NewWaiting {
            restaurant_id,
            member_id,
            guest_count: guest_count as u32,
            admission_day: admission_day(self.timezone_of(&restaurant), now),
            created_at: now,
            service_minutes: self.config.service_minutes_per_party,
        })?;

        tracing::info!(
            waiting_id = entry.id,
            restaurant_id,
            member_id,
            waiting_number = entry.waiting_number,
            admission_day = entry.admission_day,
            "Waiting entry admitted"
        );

        self.best_effort("add_entry", restaurant_id, |index| {
            index.add_entry(
                restaurant_id,
                entry.admission_day,
                entry.id,
                entry.waiting_number,
            )
        });
        self.best_effort("put_member_snapshot", restaurant_id, |index| {
            index.put_member_snapshot(member_id, restaurant_id, entry.id, entry.waiting_number)
        });

        self.gateway.send_to_member(
            restaurant.owner_id,
            MemberNotification::WaitingNew(WaitingNewNotice {
                waiting_id: entry.id,
                restaurant_id,
                member_id,
                member_nickname: member.nickname,
                guest_count: entry.guest_count,
                waiting_number: entry.waiting_number,
            }),
        );
        self.broadcasts.enqueue(restaurant_id);

        Ok(entry)
    }

    /// Owner calls a waiting party in
    pub async fn call(&self, waiting_id: i64, owner_id: i64) -> WaitlistResult<WaitingEntry> {
        let entry = self.require_entry(waiting_id)?;
        let restaurant = self.require_restaurant(entry.restaurant_id).await?;
        Self::require_owner(&restaurant, owner_id)?;

        let called = self.ledger.transition(
            waiting_id,
            WaitingStatus::Called,
            owner_id,
            self.clock.now_millis(),
        )?;
        tracing::info!(waiting_id, restaurant_id = called.restaurant_id, "Waiting entry called");

        self.best_effort("remove_entry", called.restaurant_id, |index| {
            index.remove_entry(called.restaurant_id, waiting_id, called.member_id)
        });

        self.gateway.send_to_member(
            called.member_id,
            MemberNotification::WaitingCalled(WaitingCalledNotice {
                waiting_id,
                restaurant_id: called.restaurant_id,
                restaurant_name: restaurant.name.clone(),
                waiting_number: called.waiting_number,
                title: "Your table is ready".to_string(),
                message: format!(
                    "Number {} at {}, please come in now.",
                    called.waiting_number, restaurant.name
                ),
            }),
        );
        self.broadcasts.enqueue(called.restaurant_id);

        Ok(called)
    }

    /// Owner seats a called party
    pub async fn seat(&self, waiting_id: i64, owner_id: i64) -> WaitlistResult<WaitingEntry> {
        self.owner_transition(waiting_id, owner_id, WaitingStatus::Seated)
            .await
    }

    /// Owner marks a called party as not showing up
    pub async fn no_show(&self, waiting_id: i64, owner_id: i64) -> WaitlistResult<WaitingEntry> {
        self.owner_transition(waiting_id, owner_id, WaitingStatus::NoShow)
            .await
    }

    /// Member leaves the queue
    pub async fn cancel(&self, waiting_id: i64, member_id: i64) -> WaitlistResult<WaitingEntry> {
        let entry = self.require_entry(waiting_id)?;
        if entry.member_id != member_id {
            return Err(WaitlistError::Forbidden(
                "Only the member who registered can cancel this waiting".to_string(),
            ));
        }

        let cancelled = self.ledger.transition(
            waiting_id,
            WaitingStatus::Cancelled,
            member_id,
            self.clock.now_millis(),
        )?;
        tracing::info!(
            waiting_id,
            restaurant_id = cancelled.restaurant_id,
            "Waiting entry cancelled"
        );

        self.best_effort("remove_entry", cancelled.restaurant_id, |index| {
            index.remove_entry(cancelled.restaurant_id, waiting_id, member_id)
        });
        self.notify_owner_of_cancel(&cancelled).await;
        self.broadcasts.enqueue(cancelled.restaurant_id);

        Ok(cancelled)
    }

    async fn owner_transition(
        &self,
        waiting_id: i64,
        owner_id: i64,
        to: WaitingStatus,
    ) -> WaitlistResult<WaitingEntry> {
        let entry = self.require_entry(waiting_id)?;
        let restaurant = self.require_restaurant(entry.restaurant_id).await?;
        Self::require_owner(&restaurant, owner_id)?;

        let updated = self
            .ledger
            .transition(waiting_id, to, owner_id, self.clock.now_millis())?;
        tracing::info!(waiting_id, status = %to, "Waiting entry closed");
        Ok(updated)
    }

    async fn notify_owner_of_cancel(&self, entry: &WaitingEntry) {
        let restaurant = match self.restaurants.find_restaurant(entry.restaurant_id).await {
            Ok(Some(r)) => r,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(restaurant_id = entry.restaurant_id, error = %e, "Owner lookup failed, skipping cancel notice");
                return;
            }
        };
        let nickname = match self.members.find_member(entry.member_id).await {
            Ok(Some(m)) => m.nickname,
            _ => String::new(),
        };

        self.gateway.send_to_member(
            restaurant.owner_id,
            MemberNotification::WaitingCancelled(WaitingCancelledNotice {
                waiting_id: entry.id,
                restaurant_id: entry.restaurant_id,
                member_id: entry.member_id,
                member_nickname: nickname,
                waiting_number: entry.waiting_number,
            }),
        );
    }

    // ========== Queries ==========

    /// Live position of the member's Waiting entry in today's queue
    pub async fn my_queue_position(
        &self,
        member_id: i64,
    ) -> WaitlistResult<Option<QueuePositionUpdate>> {
        let now = self.clock.now_millis();

        if let Some(snapshot) = self.best_effort("member_snapshot", 0, |index| {
            index.member_snapshot(member_id)
        })
        .flatten()
            && let Some(entry) = self.ledger.get(snapshot.entry_id)?
            && entry.member_id == member_id
            && entry.is_waiting()
        {
            let restaurant = self.require_restaurant(entry.restaurant_id).await?;
            if entry.admission_day == admission_day(self.timezone_of(&restaurant), now) {
                return self.live_position(&entry, &restaurant, now).map(Some);
            }
        }

        // Snapshot absent, expired or stale: scan the ledger
        for entry in self.ledger.waiting_entries_for_member(member_id)? {
            let Some(restaurant) = self.restaurants.find_restaurant(entry.restaurant_id).await?
            else {
                continue;
            };
            if entry.admission_day != admission_day(self.timezone_of(&restaurant), now) {
                continue;
            }

            self.best_effort("put_member_snapshot", entry.restaurant_id, |index| {
                index.put_member_snapshot(
                    member_id,
                    entry.restaurant_id,
                    entry.id,
                    entry.waiting_number,
                )
            });
            return self.live_position(&entry, &restaurant, now).map(Some);
        }

        Ok(None)
    }

    fn live_position(
        &self,
        entry: &WaitingEntry,
        restaurant: &Restaurant,
        now: i64,
    ) -> WaitlistResult<QueuePositionUpdate> {
        let waiting = self
            .ledger
            .waiting_entries(entry.restaurant_id, entry.admission_day)?;
        let position = waiting
            .iter()
            .filter(|other| other.waiting_number < entry.waiting_number)
            .count() as u32;
        Ok(self.position_update(entry, &restaurant.name, position, waiting.len() as u32, now))
    }

    fn position_update(
        &self,
        entry: &WaitingEntry,
        restaurant_name: &str,
        position: u32,
        total: u32,
        now: i64,
    ) -> QueuePositionUpdate {
        QueuePositionUpdate {
            waiting_id: entry.id,
            restaurant_id: entry.restaurant_id,
            restaurant_name: restaurant_name.to_string(),
            waiting_number: entry.waiting_number,
            position_in_queue: position,
            estimated_wait_minutes: self.estimate(position),
            total_waiting_count: total,
            status: entry.status,
            timestamp: now,
        }
    }

    fn estimate(&self, position: u32) -> u32 {
        (position + 1) * self.config.service_minutes_per_party
    }

    /// All entries of a member, newest admission first
    pub async fn list_my_waitings(
        &self,
        member_id: i64,
        page: PageRequest,
    ) -> WaitlistResult<Page<WaitingResponse>> {
        self.require_member(member_id).await?;
        let entries = self.ledger.entries_for_member(member_id, page)?;
        self.to_response_page(entries).await
    }

    /// All entries of a restaurant, newest day first; owner only
    pub async fn list_restaurant_waitings(
        &self,
        restaurant_id: i64,
        acting_member_id: i64,
        page: PageRequest,
    ) -> WaitlistResult<Page<WaitingResponse>> {
        let restaurant = self.require_restaurant(restaurant_id).await?;
        Self::require_owner(&restaurant, acting_member_id)?;
        let entries = self.ledger.entries_for_restaurant(restaurant_id, page)?;
        self.to_response_page(entries).await
    }

    /// Entry detail, visible to its member and the restaurant owner
    pub async fn get_waiting(
        &self,
        waiting_id: i64,
        acting_member_id: i64,
    ) -> WaitlistResult<WaitingResponse> {
        let entry = self.require_visible_entry(waiting_id, acting_member_id).await?;
        let page = self
            .to_response_page(Page::slice(vec![entry], PageRequest::default()))
            .await?;
        page.items
            .into_iter()
            .next()
            .ok_or_else(|| WaitlistError::waiting_not_found(waiting_id))
    }

    /// Status history, same visibility as [`Self::get_waiting`]
    pub async fn get_waiting_history(
        &self,
        waiting_id: i64,
        acting_member_id: i64,
    ) -> WaitlistResult<Vec<StatusChange>> {
        self.require_visible_entry(waiting_id, acting_member_id)
            .await?;
        Ok(self.ledger.history(waiting_id)?)
    }

    /// Current queue size; index first, ledger when the index cannot answer
    pub async fn get_waiting_count(&self, restaurant_id: i64) -> WaitlistResult<WaitingCount> {
        let restaurant = self.require_restaurant(restaurant_id).await?;

        let day = admission_day(self.timezone_of(&restaurant), self.clock.now_millis());

        let waiting_count = match self.index.count(restaurant_id, day) {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!(restaurant_id, day, error = %e, "Index count unavailable, reading ledger");
                self.ledger.waiting_count(restaurant_id, day)?
            }
        };

        Ok(WaitingCount {
            restaurant_id,
            waiting_count,
        })
    }

    // ========== Broadcast & reconciliation ==========

    /// Recompute today's queue from the ledger and fan it out
    ///
    /// Publishes the aggregate count on the restaurant topic, then one
    /// position update per Waiting entry in waiting-number order. The index
    /// count and persisted ETAs are refreshed as side effects.
    pub async fn broadcast_queue_state(&self, restaurant_id: i64) -> WaitlistResult<QueueBroadcast> {
        let restaurant = self.require_restaurant(restaurant_id).await?;
        let now = self.clock.now_millis();
        let day = admission_day(self.timezone_of(&restaurant), now);

        let waiting = self.ledger.waiting_entries(restaurant_id, day)?;
        let total = waiting.len() as u32;

        self.gateway.publish_to_restaurant(WaitingCountUpdate {
            restaurant_id,
            waiting_count: total,
            timestamp: now,
        });

        let mut positions = Vec::with_capacity(waiting.len());
        for (position, entry) in waiting.iter().enumerate() {
            let update = self.position_update(entry, &restaurant.name, position as u32, total, now);
            positions.push(QueuePosition {
                waiting_id: entry.id,
                member_id: entry.member_id,
                position: update.position_in_queue,
                estimated_wait_minutes: update.estimated_wait_minutes,
            });
            self.gateway
                .send_to_member(entry.member_id, MemberNotification::WaitingQueueUpdate(update));
        }

        self.best_effort("set_count", restaurant_id, |index| {
            index.set_count(restaurant_id, day, total)
        });

        let estimates: Vec<(i64, u32)> = positions
            .iter()
            .map(|p| (p.waiting_id, p.estimated_wait_minutes))
            .collect();
        if let Err(e) = self.ledger.refresh_estimates(&estimates) {
            tracing::warn!(restaurant_id, error = %e, "Failed to persist refreshed ETAs");
        }

        Ok(QueueBroadcast {
            restaurant_id,
            waiting_count: total,
            positions,
        })
    }

    /// Rebuild a restaurant's index state from today's ledger queue
    pub async fn reconcile(&self, restaurant_id: i64) -> WaitlistResult<ReconcileReport> {
        let tz = match self.restaurants.find_restaurant(restaurant_id).await? {
            Some(restaurant) => self.timezone_of(&restaurant),
            None => self.config.default_timezone,
        };
        let day = admission_day(tz, self.clock.now_millis());
        let waiting = self.ledger.waiting_entries(restaurant_id, day)?;

        let drifted = self.index_drifted(restaurant_id, day, &waiting);
        let pairs: Vec<(i64, u32)> = waiting.iter().map(|e| (e.id, e.waiting_number)).collect();
        self.best_effort("replace_active_set", restaurant_id, |index| {
            index.replace_active_set(restaurant_id, day, &pairs)
        });
        for entry in &waiting {
            self.best_effort("put_member_snapshot", restaurant_id, |index| {
                index.put_member_snapshot(
                    entry.member_id,
                    restaurant_id,
                    entry.id,
                    entry.waiting_number,
                )
            });
        }

        if drifted {
            tracing::info!(restaurant_id, waiting_count = waiting.len(), "Queue index drift repaired");
        }

        Ok(ReconcileReport {
            restaurant_id,
            waiting_count: waiting.len() as u32,
            drifted,
        })
    }

    /// Reconcile every restaurant known to the ledger or the index
    pub async fn reconcile_all(&self) -> ReconcileSummary {
        let mut restaurants: BTreeSet<i64> = match self.ledger.restaurants_with_waiting() {
            Ok(set) => set,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list restaurants for reconciliation");
                BTreeSet::new()
            }
        };
        if let Some(tracked) = self.best_effort("tracked_restaurants", 0, |index| {
            index.tracked_restaurants()
        }) {
            restaurants.extend(tracked);
        }

        let mut summary = ReconcileSummary::default();
        for restaurant_id in restaurants {
            summary.restaurants += 1;
            match self.reconcile(restaurant_id).await {
                Ok(report) if report.drifted => summary.drifted += 1,
                Ok(_) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(restaurant_id, error = %e, "Reconciliation failed");
                }
            }
        }
        summary
    }

    fn index_drifted(&self, restaurant_id: i64, day: u32, waiting: &[WaitingEntry]) -> bool {
        match self.index.count(restaurant_id, day) {
            Ok(count) if count as usize == waiting.len() => {}
            Err(_) if waiting.is_empty() => return false,
            _ => return true,
        }
        waiting
            .iter()
            .enumerate()
            .any(|(position, entry)| match self.index.rank(restaurant_id, entry.id) {
                Ok(rank) => rank as usize != position,
                Err(_) => true,
            })
    }

    // ========== Helpers ==========

    fn best_effort<T>(
        &self,
        operation: &'static str,
        restaurant_id: i64,
        f: impl FnOnce(&dyn QueueIndex) -> IndexResult<T>,
    ) -> Option<T> {
        match f(self.index.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(operation, restaurant_id, error = %e, "Queue index operation failed");
                None
            }
        }
    }

    fn timezone_of(&self, restaurant: &Restaurant) -> Tz {
        parse_timezone(restaurant.timezone.as_deref(), self.config.default_timezone)
    }

    fn require_entry(&self, waiting_id: i64) -> WaitlistResult<WaitingEntry> {
        self.ledger
            .get(waiting_id)?
            .ok_or_else(|| WaitlistError::waiting_not_found(waiting_id))
    }

    async fn require_member(&self, member_id: i64) -> WaitlistResult<Member> {
        self.members
            .find_member(member_id)
            .await?
            .ok_or(WaitlistError::NotFound {
                resource: Resource::Member,
                id: member_id,
            })
    }

    async fn require_restaurant(&self, restaurant_id: i64) -> WaitlistResult<Restaurant> {
        self.restaurants
            .find_restaurant(restaurant_id)
            .await?
            .ok_or(WaitlistError::NotFound {
                resource: Resource::Restaurant,
                id: restaurant_id,
            })
    }

    fn require_owner(restaurant: &Restaurant, member_id: i64) -> WaitlistResult<()> {
        if restaurant.is_owned_by(member_id) {
            Ok(())
        } else {
            Err(WaitlistError::OwnerRequired {
                restaurant_id: restaurant.id,
                member_id,
            })
        }
    }

    async fn require_visible_entry(
        &self,
        waiting_id: i64,
        acting_member_id: i64,
    ) -> WaitlistResult<WaitingEntry> {
        let entry = self.require_entry(waiting_id)?;
        if entry.member_id == acting_member_id {
            return Ok(entry);
        }
        let restaurant = self.require_restaurant(entry.restaurant_id).await?;
        if restaurant.is_owned_by(acting_member_id) {
            Ok(entry)
        } else {
            Err(WaitlistError::Forbidden(
                "Waiting entry belongs to another member".to_string(),
            ))
        }
    }

    async fn to_response_page(
        &self,
        page: Page<WaitingEntry>,
    ) -> WaitlistResult<Page<WaitingResponse>> {
        let mut nicknames: HashMap<i64, String> = HashMap::new();
        let mut names: HashMap<i64, String> = HashMap::new();

        for entry in &page.items {
            if !nicknames.contains_key(&entry.member_id) {
                let nickname = self
                    .members
                    .find_member(entry.member_id)
                    .await?
                    .map(|m| m.nickname)
                    .unwrap_or_default();
                nicknames.insert(entry.member_id, nickname);
            }
            if !names.contains_key(&entry.restaurant_id) {
                let name = self
                    .restaurants
                    .find_restaurant(entry.restaurant_id)
                    .await?
                    .map(|r| r.name)
                    .unwrap_or_default();
                names.insert(entry.restaurant_id, name);
            }
        }

        Ok(page.map(|entry| {
            let nickname = nicknames.get(&entry.member_id).cloned().unwrap_or_default();
            let name = names.get(&entry.restaurant_id).cloned().unwrap_or_default();
            WaitingResponse::from_entry(&entry, nickname, name)
        }))
    }
}

#[cfg(test)]
mod tests;
