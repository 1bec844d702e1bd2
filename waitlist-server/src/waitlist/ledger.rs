//! redb-based ledger for waiting entries
//!
//! The ledger is the only source of truth: every entry ever admitted and
//! every status change it went through. Nothing is physically deleted.
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `waiting_entries` | `entry_id` | `WaitingEntry` | Entry records |
//! | `status_history` | `(entry_id, seq)` | `StatusChange` | Append-only history |
//! | `day_entries` | `(restaurant_id, day, number)` | `entry_id` | All admissions per day |
//! | `waiting_queue` | `(restaurant_id, day, number)` | `entry_id` | Entries currently Waiting |
//! | `member_entries` | `(member_id, entry_id)` | `()` | Member lookup |
//! | `sequence_counter` | `&str` | `u64` | Entry id sequence |
//!
//! # Numbering
//!
//! `waiting_number` is derived from `day_entries` inside the admission write
//! transaction. redb serializes write transactions, so two admissions for the
//! same (restaurant, day) can never observe the same count.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::models::{Page, PageRequest, StatusChange, WaitingEntry, WaitingStatus};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// key = entry_id, value = JSON-serialized WaitingEntry
const ENTRIES_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("waiting_entries");

/// key = (entry_id, seq), value = JSON-serialized StatusChange
const HISTORY_TABLE: TableDefinition<(i64, u32), &[u8]> = TableDefinition::new("status_history");

/// key = (restaurant_id, admission_day, waiting_number), value = entry_id
const DAY_ENTRIES_TABLE: TableDefinition<(i64, u32, u32), i64> =
    TableDefinition::new("day_entries");

/// Same key as `day_entries`, only rows whose entry is still Waiting
const WAITING_TABLE: TableDefinition<(i64, u32, u32), i64> = TableDefinition::new("waiting_queue");

/// key = (member_id, entry_id), value = empty (existence check)
const MEMBER_ENTRIES_TABLE: TableDefinition<(i64, i64), ()> =
    TableDefinition::new("member_entries");

const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const ENTRY_ID_KEY: &str = "entry_id";

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Waiting entry not found: {0}")]
    EntryNotFound(i64),

    #[error("Waiting entry {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: WaitingStatus,
        to: WaitingStatus,
    },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Admission request, already validated by the coordinator
#[derive(Debug, Clone)]
pub struct NewWaiting {
    pub restaurant_id: i64,
    pub member_id: i64,
    pub guest_count: u32,
    pub admission_day: u32,
    pub created_at: i64,
    pub service_minutes: u32,
}

/// Durable waiting ledger backed by redb
#[derive(Clone)]
pub struct WaitlistLedger {
    db: Arc<Database>,
}

impl WaitlistLedger {
    /// Open or create the ledger at the given path
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory ledger (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> LedgerResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> LedgerResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ENTRIES_TABLE)?;
            let _ = write_txn.open_table(HISTORY_TABLE)?;
            let _ = write_txn.open_table(DAY_ENTRIES_TABLE)?;
            let _ = write_txn.open_table(WAITING_TABLE)?;
            let _ = write_txn.open_table(MEMBER_ENTRIES_TABLE)?;

            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(ENTRY_ID_KEY)?.is_none() {
                seq_table.insert(ENTRY_ID_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Writes ==========

    /// Admit a new entry with status Waiting
    ///
    /// Number, initial ETA, entry row, index rows and the admission history
    /// record are all written in one transaction.
    pub fn admit(&self, new: NewWaiting) -> LedgerResult<WaitingEntry> {
        let txn = self.db.begin_write()?;

        let id = Self::next_entry_id(&txn)?;
        let day_range = (new.restaurant_id, new.admission_day, 0u32)
            ..=(new.restaurant_id, new.admission_day, u32::MAX);

        let admitted_today = {
            let table = txn.open_table(DAY_ENTRIES_TABLE)?;
            count_rows(table.range(day_range.clone())?)?
        };
        let waiting_today = {
            let table = txn.open_table(WAITING_TABLE)?;
            count_rows(table.range(day_range)?)?
        };

        let entry = WaitingEntry {
            id,
            restaurant_id: new.restaurant_id,
            member_id: new.member_id,
            waiting_number: admitted_today + 1,
            guest_count: new.guest_count,
            estimated_wait_minutes: (waiting_today + 1) * new.service_minutes,
            status: WaitingStatus::Waiting,
            admission_day: new.admission_day,
            created_at: new.created_at,
            called_at: None,
        };
        let queue_key = (entry.restaurant_id, entry.admission_day, entry.waiting_number);

        Self::store_entry(&txn, &entry)?;
        txn.open_table(DAY_ENTRIES_TABLE)?.insert(queue_key, id)?;
        txn.open_table(WAITING_TABLE)?.insert(queue_key, id)?;
        txn.open_table(MEMBER_ENTRIES_TABLE)?
            .insert((entry.member_id, id), ())?;
        Self::append_history(
            &txn,
            id,
            StatusChange {
                from: None,
                to: WaitingStatus::Waiting,
                actor_id: new.member_id,
                at: new.created_at,
            },
        )?;

        txn.commit()?;
        Ok(entry)
    }

    /// Apply a status transition
    ///
    /// The current status is re-read inside the write transaction, so of two
    /// racing transitions on the same entry at most one commits.
    pub fn transition(
        &self,
        id: i64,
        to: WaitingStatus,
        actor_id: i64,
        at: i64,
    ) -> LedgerResult<WaitingEntry> {
        let txn = self.db.begin_write()?;

        let mut entry = Self::load_entry(&txn, id)?.ok_or(LedgerError::EntryNotFound(id))?;
        let from = entry.status;
        if !from.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition { id, from, to });
        }

        entry.status = to;
        if to == WaitingStatus::Called {
            entry.called_at = Some(at);
        }
        Self::store_entry(&txn, &entry)?;

        if from == WaitingStatus::Waiting {
            txn.open_table(WAITING_TABLE)?.remove((
                entry.restaurant_id,
                entry.admission_day,
                entry.waiting_number,
            ))?;
        }

        Self::append_history(
            &txn,
            id,
            StatusChange {
                from: Some(from),
                to,
                actor_id,
                at,
            },
        )?;

        txn.commit()?;
        Ok(entry)
    }

    /// Persist recomputed ETAs
    ///
    /// Only entries that are still Waiting and whose stored value differs are
    /// rewritten. Returns the number of rows updated.
    pub fn refresh_estimates(&self, estimates: &[(i64, u32)]) -> LedgerResult<usize> {
        let txn = self.db.begin_write()?;
        let mut updated = 0;

        for &(id, minutes) in estimates {
            let Some(mut entry) = Self::load_entry(&txn, id)? else {
                continue;
            };
            if !entry.is_waiting() || entry.estimated_wait_minutes == minutes {
                continue;
            }
            entry.estimated_wait_minutes = minutes;
            Self::store_entry(&txn, &entry)?;
            updated += 1;
        }

        if updated == 0 {
            txn.abort()?;
        } else {
            txn.commit()?;
        }
        Ok(updated)
    }

    fn next_entry_id(txn: &WriteTransaction) -> LedgerResult<i64> {
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let current = table
            .get(ENTRY_ID_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(ENTRY_ID_KEY, next)?;
        Ok(next as i64)
    }

    fn load_entry(txn: &WriteTransaction, id: i64) -> LedgerResult<Option<WaitingEntry>> {
        let table = txn.open_table(ENTRIES_TABLE)?;
        let result = match table.get(id)? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(result)
    }

    fn store_entry(txn: &WriteTransaction, entry: &WaitingEntry) -> LedgerResult<()> {
        let mut table = txn.open_table(ENTRIES_TABLE)?;
        let value = serde_json::to_vec(entry)?;
        table.insert(entry.id, value.as_slice())?;
        Ok(())
    }

    fn append_history(txn: &WriteTransaction, id: i64, change: StatusChange) -> LedgerResult<()> {
        let mut table = txn.open_table(HISTORY_TABLE)?;
        let seq = count_rows(table.range((id, 0u32)..=(id, u32::MAX))?)?;
        let value = serde_json::to_vec(&change)?;
        table.insert((id, seq), value.as_slice())?;
        Ok(())
    }

    // ========== Reads ==========

    /// Get an entry by ID
    pub fn get(&self, id: i64) -> LedgerResult<Option<WaitingEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES_TABLE)?;
        let result = match table.get(id)? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(result)
    }

    /// Waiting entries of a restaurant's admission day, ordered by waiting number
    pub fn waiting_entries(&self, restaurant_id: i64, day: u32) -> LedgerResult<Vec<WaitingEntry>> {
        let read_txn = self.db.begin_read()?;
        let queue = read_txn.open_table(WAITING_TABLE)?;
        let entries = read_txn.open_table(ENTRIES_TABLE)?;

        let mut result = Vec::new();
        for row in queue.range((restaurant_id, day, 0u32)..=(restaurant_id, day, u32::MAX))? {
            let (_key, id) = row?;
            if let Some(value) = entries.get(id.value())? {
                let entry: WaitingEntry = serde_json::from_slice(value.value())?;
                result.push(entry);
            }
        }
        Ok(result)
    }

    /// Number of Waiting entries of a restaurant's admission day
    pub fn waiting_count(&self, restaurant_id: i64, day: u32) -> LedgerResult<u32> {
        let read_txn = self.db.begin_read()?;
        let queue = read_txn.open_table(WAITING_TABLE)?;
        count_rows(queue.range((restaurant_id, day, 0u32)..=(restaurant_id, day, u32::MAX))?)
    }

    /// Number of admissions (any status) of a restaurant's admission day
    pub fn day_entry_count(&self, restaurant_id: i64, day: u32) -> LedgerResult<u32> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DAY_ENTRIES_TABLE)?;
        count_rows(table.range((restaurant_id, day, 0u32)..=(restaurant_id, day, u32::MAX))?)
    }

    /// One page of a member's entries, newest admission first
    pub fn entries_for_member(
        &self,
        member_id: i64,
        page: PageRequest,
    ) -> LedgerResult<Page<WaitingEntry>> {
        let read_txn = self.db.begin_read()?;
        let members = read_txn.open_table(MEMBER_ENTRIES_TABLE)?;
        let entries = read_txn.open_table(ENTRIES_TABLE)?;

        let keys = (member_id, i64::MIN)..=(member_id, i64::MAX);
        let total = count_rows(members.range(keys.clone())?)?;

        let mut items = Vec::new();
        for row in members
            .range(keys)?
            .rev()
            .skip(page.offset())
            .take(page.size as usize)
        {
            let (key, _) = row?;
            let (_, id) = key.value();
            if let Some(value) = entries.get(id)? {
                items.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(Page::new(items, page, u64::from(total)))
    }

    /// Waiting entries of a member across all restaurants and days, newest first
    pub fn waiting_entries_for_member(&self, member_id: i64) -> LedgerResult<Vec<WaitingEntry>> {
        let read_txn = self.db.begin_read()?;
        let members = read_txn.open_table(MEMBER_ENTRIES_TABLE)?;
        let entries = read_txn.open_table(ENTRIES_TABLE)?;

        let mut result = Vec::new();
        for row in members.range((member_id, i64::MIN)..=(member_id, i64::MAX))?.rev() {
            let (key, _) = row?;
            let (_, id) = key.value();
            if let Some(value) = entries.get(id)? {
                let entry: WaitingEntry = serde_json::from_slice(value.value())?;
                if entry.is_waiting() {
                    result.push(entry);
                }
            }
        }
        Ok(result)
    }

    /// One page of a restaurant's entries: admission day descending, then
    /// waiting number ascending
    ///
    /// Days are visited newest first by seeking the last key at or below the
    /// previous day; only the rows of the requested page are decoded.
    pub fn entries_for_restaurant(
        &self,
        restaurant_id: i64,
        page: PageRequest,
    ) -> LedgerResult<Page<WaitingEntry>> {
        let read_txn = self.db.begin_read()?;
        let days = read_txn.open_table(DAY_ENTRIES_TABLE)?;
        let entries = read_txn.open_table(ENTRIES_TABLE)?;

        let total = count_rows(
            days.range((restaurant_id, 0u32, 0u32)..=(restaurant_id, u32::MAX, u32::MAX))?,
        )?;

        let size = page.size as usize;
        let mut skip = page.offset();
        let mut items = Vec::with_capacity(size);
        let mut upper = u32::MAX;

        while items.len() < size {
            let Some(row) = days
                .range((restaurant_id, 0u32, 0u32)..=(restaurant_id, upper, u32::MAX))?
                .next_back()
            else {
                break;
            };
            let (key, _) = row?;
            let (_, day, _) = key.value();

            let day_keys = (restaurant_id, day, 0u32)..=(restaurant_id, day, u32::MAX);
            let day_rows = count_rows(days.range(day_keys.clone())?)? as usize;
            if skip >= day_rows {
                skip -= day_rows;
            } else {
                for row in days.range(day_keys)?.skip(skip).take(size - items.len()) {
                    let (_key, id) = row?;
                    if let Some(value) = entries.get(id.value())? {
                        items.push(serde_json::from_slice(value.value())?);
                    }
                }
                skip = 0;
            }

            match day.checked_sub(1) {
                Some(previous) => upper = previous,
                None => break,
            }
        }
        Ok(Page::new(items, page, u64::from(total)))
    }

    /// Status history of an entry, oldest first
    pub fn history(&self, id: i64) -> LedgerResult<Vec<StatusChange>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(HISTORY_TABLE)?;

        let mut changes = Vec::new();
        for row in table.range((id, 0u32)..=(id, u32::MAX))? {
            let (_key, value) = row?;
            changes.push(serde_json::from_slice(value.value())?);
        }
        Ok(changes)
    }

    /// Restaurants that have at least one Waiting entry (any day)
    pub fn restaurants_with_waiting(&self) -> LedgerResult<BTreeSet<i64>> {
        let read_txn = self.db.begin_read()?;
        let queue = read_txn.open_table(WAITING_TABLE)?;

        let mut restaurants = BTreeSet::new();
        for row in queue.iter()? {
            let (key, _) = row?;
            let (restaurant_id, _, _) = key.value();
            restaurants.insert(restaurant_id);
        }
        Ok(restaurants)
    }
}

fn count_rows<I, T>(rows: I) -> LedgerResult<u32>
where
    I: Iterator<Item = Result<T, redb::StorageError>>,
{
    let mut count = 0u32;
    for row in rows {
        row?;
        count += 1;
    }
    Ok(count)
}
