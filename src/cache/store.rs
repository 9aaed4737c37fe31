//! The cache store.
//!
//! One [`CacheStore`] per running client holds the current value of every
//! key. All operations are synchronous: the table sits behind a
//! `parking_lot` mutex that is never held across an `.await`, so a
//! mutation's local transform cannot interleave with another write.
//!
//! # Design
//!
//! - **Full replacement**: a write replaces the whole value under a key,
//!   there is no partial merge
//! - **Snapshots**: [`CacheStore::snapshot`] captures value and freshness;
//!   restoring it brings the entry back exactly, including absence
//! - **Staleness**: [`CacheStore::invalidate`] only flags the entry; the
//!   value stays readable until a refetch replaces it
//! - **Notifications**: every change is broadcast as a [`CacheEvent`] so
//!   views can re-render
//! - **Versions**: every write or restore bumps a per-key counter, readable
//!   through [`CacheStore::version`]

use std::collections::HashMap;

use parking_lot::Mutex;
use static_assertions::assert_impl_all;
use tokio::sync::broadcast;

use super::CacheKey;
use crate::domain::{Habit, HabitId, OwnerId, User};

const EVENT_CAPACITY: usize = 256;

// =============================================================================
// Values and events
// =============================================================================

/// A cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    /// Habit list, newest first.
    HabitList(Vec<Habit>),
    /// A user record.
    User(User),
}

impl CacheValue {
    /// Returns the habit list, if this is one.
    #[must_use]
    pub fn as_habits(&self) -> Option<&[Habit]> {
        match self {
            Self::HabitList(habits) => Some(habits),
            Self::User(_) => None,
        }
    }

    /// Returns the user, if this is one.
    #[must_use]
    pub const fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(user) => Some(user),
            Self::HabitList(_) => None,
        }
    }
}

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheChange {
    /// A new value was written.
    Written,
    /// A snapshot was restored.
    Restored,
    /// The entry was marked stale.
    Invalidated,
}

/// Notification sent to subscribers after every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEvent {
    /// The affected key.
    pub key: CacheKey,
    /// The kind of change.
    pub change: CacheChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    value: CacheValue,
    stale: bool,
}

/// Opaque capture of one key's entry, used for rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    key: CacheKey,
    entry: Option<Entry>,
}

impl Snapshot {
    /// The captured key.
    #[must_use]
    pub const fn key(&self) -> CacheKey {
        self.key
    }

    /// The captured value, `None` if the key was absent.
    #[must_use]
    pub fn value(&self) -> Option<&CacheValue> {
        self.entry.as_ref().map(|entry| &entry.value)
    }
}

// =============================================================================
// CacheStore
// =============================================================================

/// Keyed in-memory store of habits and users.
///
/// Reads are public. Writes and restores are reserved to the mutation engine
/// and the refresher inside this crate, so every change goes through the
/// optimistic/reconciliation protocol.
///
/// # Examples
///
/// ```rust
/// use habit_sync::{CacheKey, CacheStore, OwnerId};
///
/// let store = CacheStore::new();
/// let key = CacheKey::HabitList(OwnerId::new(42));
///
/// assert!(store.read(key).is_none());
/// assert!(!store.is_fresh(key));
/// ```
#[derive(Debug)]
pub struct CacheStore {
    table: Mutex<Table>,
    events: broadcast::Sender<CacheEvent>,
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<CacheKey, Entry>,
    versions: HashMap<CacheKey, u64>,
}

impl Table {
    fn get(&self, key: CacheKey) -> Option<&Entry> {
        self.entries.get(&key)
    }

    fn put(&mut self, key: CacheKey, entry: Option<Entry>) {
        match entry {
            Some(entry) => self.entries.insert(key, entry),
            None => self.entries.remove(&key),
        };
        *self.versions.entry(key).or_default() += 1;
    }
}

assert_impl_all!(CacheStore: Send, Sync);

impl CacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            table: Mutex::new(Table::default()),
            events,
        }
    }

    /// Returns the current value of `key`.
    #[must_use]
    pub fn read(&self, key: CacheKey) -> Option<CacheValue> {
        self.table.lock().get(key).map(|entry| entry.value.clone())
    }

    /// Returns `true` if `key` holds a value that has not been invalidated.
    #[must_use]
    pub fn is_fresh(&self, key: CacheKey) -> bool {
        self.table.lock().get(key).is_some_and(|entry| !entry.stale)
    }

    /// Number of writes and restores applied to `key` so far.
    #[must_use]
    pub fn version(&self, key: CacheKey) -> u64 {
        self.table
            .lock()
            .versions
            .get(&key)
            .copied()
            .unwrap_or_default()
    }

    /// Returns the cached habit list of `owner`.
    #[must_use]
    pub fn habits(&self, owner: OwnerId) -> Option<Vec<Habit>> {
        match self.read(CacheKey::HabitList(owner)) {
            Some(CacheValue::HabitList(habits)) => Some(habits),
            _ => None,
        }
    }

    /// Returns one cached habit of `owner`.
    #[must_use]
    pub fn habit(&self, owner: OwnerId, habit_id: &HabitId) -> Option<Habit> {
        let table = self.table.lock();
        table
            .get(CacheKey::HabitList(owner))
            .and_then(|entry| entry.value.as_habits())
            .and_then(|habits| habits.iter().find(|habit| &habit.id == habit_id))
            .cloned()
    }

    /// Returns the cached user record of `owner`.
    #[must_use]
    pub fn user(&self, owner: OwnerId) -> Option<User> {
        match self.read(CacheKey::User(owner)) {
            Some(CacheValue::User(user)) => Some(user),
            _ => None,
        }
    }

    /// Captures the current entry of `key`.
    #[must_use]
    pub fn snapshot(&self, key: CacheKey) -> Snapshot {
        Snapshot {
            key,
            entry: self.table.lock().get(key).cloned(),
        }
    }

    /// Marks `key` stale so the next reader treats it as not fresh.
    ///
    /// Does nothing if the key is absent.
    pub fn invalidate(&self, key: CacheKey) {
        let invalidated = self
            .table
            .lock()
            .entries
            .get_mut(&key)
            .map(|entry| entry.stale = true)
            .is_some();
        if invalidated {
            self.notify(key, CacheChange::Invalidated);
        }
    }

    /// Subscribes to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Replaces the value of `key` and marks it fresh.
    pub(crate) fn write(&self, key: CacheKey, value: CacheValue) {
        self.table
            .lock()
            .put(key, Some(Entry { value, stale: false }));
        self.notify(key, CacheChange::Written);
    }

    /// Writes `value` but leaves the entry stale, for values loaded from a
    /// local mirror that still need an authoritative refetch.
    pub(crate) fn write_stale(&self, key: CacheKey, value: CacheValue) {
        self.table
            .lock()
            .put(key, Some(Entry { value, stale: true }));
        self.notify(key, CacheChange::Written);
    }

    /// Rolls the snapshot's key back to the captured entry.
    pub(crate) fn restore(&self, snapshot: Snapshot) {
        let key = snapshot.key;
        self.table.lock().put(key, snapshot.entry);
        self.notify(key, CacheChange::Restored);
    }

    /// Rewrites the habit list of `owner` with `transform`.
    ///
    /// An absent list is treated as empty. Returns the new list.
    pub(crate) fn update_habits<F>(&self, owner: OwnerId, transform: F) -> Vec<Habit>
    where
        F: FnOnce(Vec<Habit>) -> Vec<Habit>,
    {
        let key = CacheKey::HabitList(owner);
        let habits = {
            let mut table = self.table.lock();
            let current = table
                .get(key)
                .and_then(|entry| entry.value.as_habits())
                .map(<[Habit]>::to_vec)
                .unwrap_or_default();
            let updated = transform(current);
            table.put(
                key,
                Some(Entry {
                    value: CacheValue::HabitList(updated.clone()),
                    stale: false,
                }),
            );
            updated
        };
        self.notify(key, CacheChange::Written);
        habits
    }

    /// Rewrites the cached user of `owner` with `transform`.
    ///
    /// Nothing is written when no user is cached. Returns the new user.
    pub(crate) fn update_user<F>(&self, owner: OwnerId, transform: F) -> Option<User>
    where
        F: FnOnce(User) -> User,
    {
        let key = CacheKey::User(owner);
        let user = {
            let mut table = self.table.lock();
            let current = table.get(key).and_then(|entry| entry.value.as_user())?.clone();
            let updated = transform(current);
            table.put(
                key,
                Some(Entry {
                    value: CacheValue::User(updated.clone()),
                    stale: false,
                }),
            );
            updated
        };
        self.notify(key, CacheChange::Written);
        Some(user)
    }

    fn notify(&self, key: CacheKey, change: CacheChange) {
        // No subscribers is fine.
        let _ = self.events.send(CacheEvent { key, change });
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}
