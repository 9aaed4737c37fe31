//! Push-driven reconciliation.
//!
//! A [`ReconciliationListener`] turns the owner's change feed into
//! authoritative refetches. It never trusts a payload and never merges:
//! every message invalidates the affected keys and starts a refetch whose
//! result replaces whatever the cache holds, optimistic values included.
//!
//! | Message | Refetched keys |
//! |---|---|
//! | change on `habits` | habit list, user |
//! | change on `users` | user |
//! | reconnected | habit list, user |
//!
//! A change on `habits` refetches the user too because toggles change the
//! point balance.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use crate::cache::CacheKey;
use crate::config::EngineConfig;
use crate::domain::OwnerId;
use crate::engine::refresh::Refresher;
use crate::feed::{ChangeFeed, FeedError, FeedMessage, FeedStream, Table};

/// Listener settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerConfig {
    /// Messages arriving within this window after a first one are folded
    /// into a single refetch per key. Zero refetches on every message.
    pub coalesce_window: Duration,
}

impl ListenerConfig {
    /// Creates a config with the given coalescing window.
    #[must_use]
    pub const fn with_coalesce_window(coalesce_window: Duration) -> Self {
        Self { coalesce_window }
    }
}

impl From<&EngineConfig> for ListenerConfig {
    fn from(config: &EngineConfig) -> Self {
        Self::with_coalesce_window(config.coalesce_window)
    }
}

/// Subscribes owners to the change feed and reconciles their cache.
pub struct ReconciliationListener {
    refresher: Arc<Refresher>,
    feed: Arc<dyn ChangeFeed>,
    config: ListenerConfig,
}

impl ReconciliationListener {
    /// Creates a listener refetching through `refresher`.
    ///
    /// Share the refresher with the [`MutationEngine`] so that mutations can
    /// cancel refetches started here.
    ///
    /// [`MutationEngine`]: crate::engine::MutationEngine
    #[must_use]
    pub fn new(refresher: Arc<Refresher>, feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            refresher,
            feed,
            config: ListenerConfig::default(),
        }
    }

    /// Replaces the listener settings.
    #[must_use]
    pub fn with_config(self, config: ListenerConfig) -> Self {
        Self { config, ..self }
    }

    /// The current settings.
    #[must_use]
    pub const fn config(&self) -> ListenerConfig {
        self.config
    }

    /// Opens the feed of `owner` and starts reconciling.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the feed refuses the subscription.
    pub async fn subscribe(&self, owner: OwnerId) -> Result<Subscription, FeedError> {
        let stream = self.feed.subscribe(owner).await?;
        let refresher = Arc::clone(&self.refresher);
        let window = self.config.coalesce_window;
        let task = tokio::spawn(run(refresher, stream, owner, window));
        info!(%owner, "subscribed to change feed");
        Ok(Subscription {
            owner,
            task: Some(task),
        })
    }

    /// Keys refetched in response to `message`.
    #[must_use]
    pub fn affected_keys(owner: OwnerId, message: &FeedMessage) -> Vec<CacheKey> {
        match message {
            FeedMessage::Change(event) if event.table == Table::Users => {
                vec![CacheKey::User(owner)]
            }
            FeedMessage::Change(_) | FeedMessage::Reconnected => {
                CacheKey::for_owner(owner).to_vec()
            }
        }
    }
}

impl std::fmt::Debug for ReconciliationListener {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ReconciliationListener")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn run(
    refresher: Arc<Refresher>,
    mut stream: FeedStream,
    owner: OwnerId,
    window: Duration,
) {
    while let Some(message) = stream.next().await {
        debug!(%owner, ?message, "feed message");
        let mut keys = ReconciliationListener::affected_keys(owner, &message);

        let mut closed = false;
        if !window.is_zero() {
            let deadline = Instant::now() + window;
            loop {
                match timeout_at(deadline, stream.next()).await {
                    Ok(Some(message)) => {
                        debug!(%owner, ?message, "feed message coalesced");
                        for key in ReconciliationListener::affected_keys(owner, &message) {
                            if !keys.contains(&key) {
                                keys.push(key);
                            }
                        }
                    }
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }
        }

        for key in keys {
            refresher.store().invalidate(key);
            drop(refresher.spawn(key));
        }
        if closed {
            break;
        }
    }
    debug!(%owner, "change feed closed");
}

/// A running reconciliation for one owner.
///
/// Dropping the subscription stops it; [`Subscription::unsubscribe`] also
/// waits until the feed stream is released.
#[derive(Debug)]
pub struct Subscription {
    owner: OwnerId,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// The subscribed owner.
    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Returns `true` until the subscription is stopped or its feed ends.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops reconciling. Calling it again does nothing.
    pub async fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // The task is either cancelled or already finished.
            let _ = task.await;
            info!(owner = %self.owner, "unsubscribed from change feed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
