//! Background refetches of cache keys.
//!
//! A [`Refresher`] owns at most one refetch task per [`CacheKey`]. Spawning
//! a new one supersedes the previous task, and a mutation cancels both keys
//! of its owner before its optimistic write so that a response fetched
//! before the mutation cannot overwrite it.
//!
//! Cancellation is two-layered: the task is aborted, and a generation number
//! recorded under the registry lock is checked again right before the write.
//! A task that already received its response when it was superseded will
//! therefore never write.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStore, CacheValue};
use crate::domain::UpsertUser;
use crate::gateway::{GatewayError, ServerGateway};

/// Failure of an authoritative refetch. Logged; the cache keeps its value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("refetch of {key} failed: {source}")]
pub struct ReconciliationFetchError {
    /// The key that could not be refetched.
    pub key: CacheKey,
    /// The gateway failure.
    #[source]
    pub source: GatewayError,
}

/// How a refetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetched value was written to the cache.
    Applied,
    /// A mutation or a newer refetch took over; nothing was written.
    Superseded,
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    abort: AbortHandle,
}

/// Registry of background refetch tasks.
pub struct Refresher {
    store: Arc<CacheStore>,
    gateway: Arc<dyn ServerGateway>,
    inflight: Mutex<HashMap<CacheKey, InFlight>>,
    next_generation: AtomicU64,
}

impl Refresher {
    /// Creates a refresher writing into `store`.
    #[must_use]
    pub fn new(store: Arc<CacheStore>, gateway: Arc<dyn ServerGateway>) -> Self {
        Self {
            store,
            gateway,
            inflight: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// The store refetched values are written to.
    #[must_use]
    pub const fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// The gateway used for refetches.
    #[must_use]
    pub const fn gateway(&self) -> &Arc<dyn ServerGateway> {
        &self.gateway
    }

    /// Starts a refetch of `key`, superseding any refetch already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        self: &Arc<Self>,
        key: CacheKey,
    ) -> JoinHandle<Result<RefreshOutcome, ReconciliationFetchError>> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let refresher = Arc::clone(self);

        // Registration happens under the lock so `complete` can never see
        // the task before it is recorded.
        let mut inflight = self.inflight.lock();
        let handle = tokio::spawn(async move {
            let fetched = refresher.fetch(key).await;
            refresher.complete(key, generation, fetched)
        });
        if let Some(previous) = inflight.insert(
            key,
            InFlight {
                generation,
                abort: handle.abort_handle(),
            },
        ) {
            debug!(%key, superseded = previous.generation, "refetch superseded");
            previous.abort.abort();
        }
        drop(inflight);
        handle
    }

    /// Refetches `key` and waits for the result.
    ///
    /// # Errors
    ///
    /// Returns [`ReconciliationFetchError`] if the gateway call fails.
    pub async fn refresh(
        self: &Arc<Self>,
        key: CacheKey,
    ) -> Result<RefreshOutcome, ReconciliationFetchError> {
        match self.spawn(key).await {
            Ok(result) => result,
            Err(_) => Ok(RefreshOutcome::Superseded),
        }
    }

    /// Cancels the refetch of `key`, if any. Returns `true` if one was
    /// running.
    pub fn cancel(&self, key: CacheKey) -> bool {
        let removed = self.inflight.lock().remove(&key);
        removed.is_some_and(|inflight| {
            debug!(%key, generation = inflight.generation, "refetch cancelled");
            inflight.abort.abort();
            true
        })
    }

    /// Returns `true` while a refetch of `key` is registered.
    #[must_use]
    pub fn in_flight(&self, key: CacheKey) -> bool {
        self.inflight.lock().contains_key(&key)
    }

    async fn fetch(&self, key: CacheKey) -> Result<CacheValue, GatewayError> {
        match key {
            CacheKey::HabitList(owner) => self
                .gateway
                .list_habits(owner)
                .await
                .map(CacheValue::HabitList),
            // The identity-only upsert changes no stored field and returns
            // the current record.
            CacheKey::User(owner) => self
                .gateway
                .upsert_user(&UpsertUser::new(owner))
                .await
                .map(CacheValue::User),
        }
    }

    fn complete(
        &self,
        key: CacheKey,
        generation: u64,
        fetched: Result<CacheValue, GatewayError>,
    ) -> Result<RefreshOutcome, ReconciliationFetchError> {
        let mut inflight = self.inflight.lock();
        if inflight.get(&key).map(|entry| entry.generation) != Some(generation) {
            return Ok(RefreshOutcome::Superseded);
        }
        inflight.remove(&key);
        match fetched {
            Ok(value) => {
                // Written under the registry lock: a mutation cancelling
                // this key either runs before (and we returned above) or
                // after this write.
                self.store.write(key, value);
                debug!(%key, "refetch applied");
                Ok(RefreshOutcome::Applied)
            }
            Err(source) => {
                let error = ReconciliationFetchError { key, source };
                warn!(%error, "refetch failed; cache left stale");
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Refresher")
            .field("inflight", &self.inflight.lock().len())
            .finish_non_exhaustive()
    }
}
