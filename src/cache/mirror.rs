//! Device-local mirror of habit lists.
//!
//! The mirror stores the last known habit list of an owner in an opaque
//! key/value storage so a restarted client can render something before the
//! first fetch completes. Values loaded from the mirror enter the cache
//! stale, so the next reader still asks the server.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CacheChange, CacheKey, CacheStore, CacheValue};
use crate::domain::{Habit, OwnerId};

/// Errors raised by the local mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The underlying storage rejected the operation.
    #[error("local storage failed: {message}")]
    Storage {
        /// Message reported by the storage.
        message: String,
    },
    /// The stored value could not be encoded or decoded.
    #[error("local mirror payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Opaque string key/value storage provided by the host device.
pub trait LocalStorage: Send + Sync {
    /// Reads the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Storage`] when the storage is unavailable.
    fn get(&self, key: &str) -> Result<Option<String>, MirrorError>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Storage`] when the storage is unavailable.
    fn set(&self, key: &str, value: String) -> Result<(), MirrorError>;

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Storage`] when the storage is unavailable.
    fn remove(&self, key: &str) -> Result<(), MirrorError>;
}

/// In-process [`LocalStorage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, MirrorError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), MirrorError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MirrorError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Persists habit lists to a [`LocalStorage`].
pub struct LocalMirror {
    storage: Arc<dyn LocalStorage>,
}

impl LocalMirror {
    /// Creates a mirror over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    /// Storage key used for the habit list of `owner`.
    #[must_use]
    pub fn storage_key(owner: OwnerId) -> String {
        format!("habits_cache_{owner}")
    }

    /// Saves the habit list of `owner`. Empty lists are not saved.
    ///
    /// # Errors
    ///
    /// Returns a [`MirrorError`] if encoding or the storage fails.
    pub fn save_habits(&self, owner: OwnerId, habits: &[Habit]) -> Result<(), MirrorError> {
        if habits.is_empty() {
            return Ok(());
        }
        let encoded = serde_json::to_string(habits)?;
        self.storage.set(&Self::storage_key(owner), encoded)
    }

    /// Loads the saved habit list of `owner`.
    ///
    /// # Errors
    ///
    /// Returns a [`MirrorError`] if the storage fails or the saved value is
    /// malformed.
    pub fn load_habits(&self, owner: OwnerId) -> Result<Option<Vec<Habit>>, MirrorError> {
        self.storage
            .get(&Self::storage_key(owner))?
            .map(|encoded| serde_json::from_str(&encoded))
            .transpose()
            .map_err(MirrorError::from)
    }

    /// Seeds the cache with the saved habit list when the cache has none.
    ///
    /// The seeded entry is stale. A malformed saved value is discarded.
    /// Returns `true` if the cache was seeded.
    pub fn warm_start(&self, store: &CacheStore, owner: OwnerId) -> bool {
        let key = CacheKey::HabitList(owner);
        if store.read(key).is_some() {
            return false;
        }
        match self.load_habits(owner) {
            Ok(Some(habits)) => {
                debug!(%key, count = habits.len(), "warm start from local mirror");
                store.write_stale(key, CacheValue::HabitList(habits));
                true
            }
            Ok(None) => false,
            Err(error) => {
                warn!(%key, %error, "discarding local mirror");
                if let Err(error) = self.storage.remove(&Self::storage_key(owner)) {
                    warn!(%key, %error, "failed to clear local mirror");
                }
                false
            }
        }
    }

    /// Saves every fresh habit list written to `store` until the store is
    /// dropped or the returned task is aborted.
    pub fn attach(self: Arc<Self>, store: &Arc<CacheStore>) -> JoinHandle<()> {
        let mut events = store.subscribe();
        let store = Arc::downgrade(store);
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "local mirror lagged behind cache events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let CacheKey::HabitList(owner) = event.key else {
                    continue;
                };
                if event.change == CacheChange::Invalidated {
                    continue;
                }
                let Some(store) = store.upgrade() else {
                    break;
                };
                if !store.is_fresh(event.key) {
                    continue;
                }
                let Some(habits) = store.habits(owner) else {
                    continue;
                };
                if let Err(error) = self.save_habits(owner, &habits) {
                    warn!(key = %event.key, %error, "failed to update local mirror");
                }
            }
        })
    }
}

impl std::fmt::Debug for LocalMirror {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("LocalMirror").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, HabitId, NewHabit};
    use chrono::{DateTime, Utc};
    use rstest::{fixture, rstest};

    const OWNER: OwnerId = OwnerId::new(42);

    #[fixture]
    fn storage() -> Arc<MemoryStorage> {
        Arc::new(MemoryStorage::new())
    }

    fn habit(id: &str) -> Habit {
        NewHabit::new(OWNER, "Walk", Category::Other)
            .to_habit(HabitId::new(id), DateTime::<Utc>::UNIX_EPOCH)
    }

    #[rstest]
    fn warm_start_seeds_a_stale_entry(storage: Arc<MemoryStorage>) {
        let mirror = LocalMirror::new(storage);
        mirror.save_habits(OWNER, &[habit("a")]).unwrap();
        let store = CacheStore::new();

        assert!(mirror.warm_start(&store, OWNER));

        assert_eq!(store.habits(OWNER), Some(vec![habit("a")]));
        assert!(!store.is_fresh(CacheKey::HabitList(OWNER)));
    }

    #[rstest]
    fn warm_start_never_overwrites_the_cache(storage: Arc<MemoryStorage>) {
        let mirror = LocalMirror::new(storage);
        mirror.save_habits(OWNER, &[habit("old")]).unwrap();
        let store = CacheStore::new();
        store.write(
            CacheKey::HabitList(OWNER),
            CacheValue::HabitList(vec![habit("new")]),
        );

        assert!(!mirror.warm_start(&store, OWNER));
        assert_eq!(store.habits(OWNER), Some(vec![habit("new")]));
    }

    #[rstest]
    fn malformed_values_are_discarded(storage: Arc<MemoryStorage>) {
        storage
            .set(&LocalMirror::storage_key(OWNER), "{not json".to_string())
            .unwrap();
        let mirror = LocalMirror::new(storage.clone());

        assert!(!mirror.warm_start(&CacheStore::new(), OWNER));
        assert_eq!(storage.get(&LocalMirror::storage_key(OWNER)).unwrap(), None);
    }

    #[rstest]
    fn empty_lists_are_not_saved(storage: Arc<MemoryStorage>) {
        let mirror = LocalMirror::new(storage.clone());

        mirror.save_habits(OWNER, &[]).unwrap();

        assert_eq!(storage.get(&LocalMirror::storage_key(OWNER)).unwrap(), None);
    }

    #[rstest]
    #[tokio::test]
    async fn attached_mirror_follows_fresh_writes(storage: Arc<MemoryStorage>) {
        let mirror = Arc::new(LocalMirror::new(storage));
        let store = Arc::new(CacheStore::new());
        let task = Arc::clone(&mirror).attach(&store);

        store.write(
            CacheKey::HabitList(OWNER),
            CacheValue::HabitList(vec![habit("a")]),
        );

        let mut saved = None;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            saved = mirror.load_habits(OWNER).unwrap();
            if saved.is_some() {
                break;
            }
        }
        task.abort();

        assert_eq!(saved, Some(vec![habit("a")]));
    }
}
