//! Optimistic mutation engine.
//!
//! Every mutation follows the same protocol:
//!
//! 1. validate locally; a [`ValidationError`] leaves the cache untouched
//! 2. cancel background refetches of the keys about to change
//! 3. snapshot those keys
//! 4. write the optimistic value; readers see it immediately
//! 5. call the gateway (the only suspension point)
//! 6. keep the optimistic value on success, restore the snapshots on failure
//!
//! Steps 2 to 4 run without yielding, so a mutation's local transform is
//! atomic with respect to every other task. Concurrent mutations of the same
//! habit are allowed and each rolls back to its own snapshot; the last write
//! wins.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use habit_sync::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let clock = Arc::new(FixedClock::new(Day::from_ymd(2025, 1, 7).unwrap()));
//! let gateway = Arc::new(InMemoryGateway::new(clock.clone()));
//! let engine = MutationEngine::new(Arc::new(CacheStore::new()), gateway, clock);
//!
//! let error = engine
//!     .create_habit(NewHabit::new(OwnerId::new(1), "  ", Category::Other))
//!     .await
//!     .unwrap_err();
//! assert!(matches!(error, MutationError::Validation(_)));
//! # }
//! ```

pub mod refresh;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStore, CacheValue, Snapshot};
use crate::domain::{
    Clock, Day, Habit, HabitEdit, HabitId, NewHabit, OwnerId, ReminderTime, ReminderUpdate,
    ToggleCompletion, ToggleResponse, UpsertUser, User, ValidationError,
};
use crate::gateway::{GatewayError, ServerGateway};

use refresh::Refresher;

// =============================================================================
// Types
// =============================================================================

/// Lifecycle of one mutation.
///
/// `Idle -> Pending -> Settled | RolledBack`. Transitions are reported
/// through `tracing` at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationState {
    /// Not started.
    Idle,
    /// Optimistic value written, request in flight.
    Pending,
    /// The server accepted the request.
    Settled,
    /// The server rejected the request and the snapshots were restored.
    RolledBack,
}

impl fmt::Display for MutationState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Settled => "settled",
            Self::RolledBack => "rolled back",
        })
    }
}

/// Failure of a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// Rejected locally; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Rejected by the gateway; the cache was rolled back.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl MutationError {
    /// The state the mutation ended in.
    #[must_use]
    pub const fn state(&self) -> MutationState {
        match self {
            Self::Validation(_) => MutationState::Idle,
            Self::Gateway(_) => MutationState::RolledBack,
        }
    }
}

/// Result of a settled toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleReceipt {
    /// The habit as written optimistically.
    pub habit: Habit,
    /// Whether the day was completed before the toggle.
    pub was_completed: bool,
    /// Point change applied locally.
    pub points_delta: i64,
    /// The server's answer. Not written to the cache; the next refetch
    /// brings the authoritative state.
    pub server: ToggleResponse,
}

/// Tracks one mutation from `Pending` to its final state.
struct Tracker<'a> {
    pending: &'a AtomicUsize,
    operation: &'static str,
    state: MutationState,
}

impl<'a> Tracker<'a> {
    fn begin(pending: &'a AtomicUsize, operation: &'static str) -> Self {
        pending.fetch_add(1, Ordering::SeqCst);
        debug!(operation, from = %MutationState::Idle, to = %MutationState::Pending, "mutation");
        Self {
            pending,
            operation,
            state: MutationState::Pending,
        }
    }

    fn finish(mut self, state: MutationState) {
        debug!(operation = self.operation, from = %self.state, to = %state, "mutation");
        self.state = state;
    }
}

impl Drop for Tracker<'_> {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        if self.state == MutationState::Pending {
            // The caller dropped the future; the optimistic value stays until
            // the next refetch.
            debug!(operation = self.operation, "mutation abandoned while pending");
        }
    }
}

// =============================================================================
// MutationEngine
// =============================================================================

/// Applies user actions optimistically and reconciles them with the server.
pub struct MutationEngine {
    refresher: Arc<Refresher>,
    clock: Arc<dyn Clock>,
    pending: AtomicUsize,
}

impl MutationEngine {
    /// Creates an engine writing into `store`.
    #[must_use]
    pub fn new(
        store: Arc<CacheStore>,
        gateway: Arc<dyn ServerGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_refresher(Arc::new(Refresher::new(store, gateway)), clock)
    }

    /// Creates an engine sharing `refresher` with a reconciliation listener.
    #[must_use]
    pub fn with_refresher(refresher: Arc<Refresher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            refresher,
            clock,
            pending: AtomicUsize::new(0),
        }
    }

    /// The refresher, to be shared with a [`ReconciliationListener`].
    ///
    /// [`ReconciliationListener`]: crate::reconcile::ReconciliationListener
    #[must_use]
    pub const fn refresher(&self) -> &Arc<Refresher> {
        &self.refresher
    }

    /// The cache store.
    #[must_use]
    pub fn store(&self) -> &Arc<CacheStore> {
        self.refresher.store()
    }

    /// Number of mutations whose request is in flight.
    #[must_use]
    pub fn pending_mutations(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn gateway(&self) -> &Arc<dyn ServerGateway> {
        self.refresher.gateway()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Flips the completion of `day` and adjusts the owner's points.
    ///
    /// The habit list and, when cached, the user are updated before the
    /// request is sent. The user's balance is floored at zero.
    ///
    /// # Errors
    ///
    /// - [`MutationError::Validation`] if the habit is not cached or is still
    ///   being created
    /// - [`MutationError::Gateway`] if the server rejects the toggle; both
    ///   keys are restored
    pub async fn toggle_completion(
        &self,
        habit_id: &HabitId,
        day: Day,
        owner: OwnerId,
    ) -> Result<ToggleReceipt, MutationError> {
        self.cached_habit(owner, habit_id)?;
        let today = self.clock.today();
        let list_key = CacheKey::HabitList(owner);
        let user_key = CacheKey::User(owner);
        let snapshots = self.prepare(&[list_key, user_key]);

        let mut toggled = None;
        self.store().update_habits(owner, |habits| {
            habits
                .into_iter()
                .map(|habit| {
                    if &habit.id == habit_id {
                        let (next, was_completed) = habit.toggled(day, today);
                        toggled = Some((next.clone(), was_completed));
                        next
                    } else {
                        habit
                    }
                })
                .collect()
        });
        let Some((habit, was_completed)) = toggled else {
            self.restore(snapshots);
            return Err(Self::unknown(owner, habit_id).into());
        };
        let points_delta = habit.category.toggle_delta(was_completed);
        self.store()
            .update_user(owner, |user| user.with_points_delta(points_delta));

        let request = ToggleCompletion {
            habit_id: habit_id.clone(),
            day,
            owner_id: owner,
        };
        let server = self
            .commit(
                "toggle_completion",
                snapshots,
                self.gateway().toggle_completion(&request),
            )
            .await?;

        Ok(ToggleReceipt {
            habit,
            was_completed,
            points_delta,
            server,
        })
    }

    /// Creates a habit.
    ///
    /// A placeholder with an `optimistic-` id is prepended to the list right
    /// away. On success it is replaced by the created habit and the list is
    /// refetched; on failure the list is restored and a refetch is scheduled.
    ///
    /// # Errors
    ///
    /// - [`MutationError::Validation`] for a blank title
    /// - [`MutationError::Gateway`] if the server rejects the creation
    pub async fn create_habit(&self, draft: NewHabit) -> Result<Habit, MutationError> {
        draft.validate()?;
        let owner = draft.owner_id;
        let list_key = CacheKey::HabitList(owner);
        let placeholder = draft.to_habit(HabitId::placeholder(), self.clock.now());
        let placeholder_id = placeholder.id.clone();
        let snapshots = self.prepare(&[list_key]);

        self.store().update_habits(owner, |mut habits| {
            habits.insert(0, placeholder);
            habits
        });

        let created = match self
            .commit("create_habit", snapshots, self.gateway().create_habit(&draft))
            .await
        {
            Ok(created) => created,
            Err(error) => {
                drop(self.refresher.spawn(list_key));
                return Err(error);
            }
        };

        self.store().update_habits(owner, |habits| {
            habits
                .into_iter()
                .map(|habit| {
                    if habit.id == placeholder_id {
                        created.clone()
                    } else {
                        habit
                    }
                })
                .collect()
        });
        // The habit is created either way; a failed refetch leaves the list
        // stale until the next push.
        if let Err(error) = self.refresher.refresh(list_key).await {
            debug!(%error, "list refetch after creation failed");
        }
        Ok(created)
    }

    /// Changes title, icon or color of a habit.
    ///
    /// # Errors
    ///
    /// - [`MutationError::Validation`] if no non-blank field is given or the
    ///   habit is not cached
    /// - [`MutationError::Gateway`] if the server rejects the edit
    pub async fn edit_habit(&self, edit: HabitEdit) -> Result<Habit, MutationError> {
        let edit = edit.normalized()?;
        let owner = edit.owner_id;
        self.cached_habit(owner, &edit.habit_id)?;
        let snapshots = self.prepare(&[CacheKey::HabitList(owner)]);

        self.replace_habit(owner, &edit.habit_id, |habit| edit.apply(habit));

        self.commit("edit_habit", snapshots, self.gateway().edit_habit(&edit))
            .await
    }

    /// Turns reminders of a habit on or off and sets their time.
    ///
    /// # Arguments
    ///
    /// * `habit_id` - The habit to change
    /// * `owner` - Its owner
    /// * `enabled` - Whether reminders are sent
    /// * `time` - `HH:MM`, or `None` for the owner's default time
    ///
    /// # Errors
    ///
    /// - [`MutationError::Validation`] for a malformed time or an unknown
    ///   habit
    /// - [`MutationError::Gateway`] if the server rejects the update
    pub async fn update_reminder(
        &self,
        habit_id: &HabitId,
        owner: OwnerId,
        enabled: bool,
        time: Option<&str>,
    ) -> Result<Habit, MutationError> {
        let reminder_time = time.map(ReminderTime::parse).transpose()?;
        self.cached_habit(owner, habit_id)?;
        let update = ReminderUpdate {
            habit_id: habit_id.clone(),
            owner_id: owner,
            reminder_enabled: enabled,
            reminder_time,
        };
        let snapshots = self.prepare(&[CacheKey::HabitList(owner)]);

        self.replace_habit(owner, habit_id, |habit| update.apply(habit));

        self.commit(
            "update_reminder",
            snapshots,
            self.gateway().update_reminder(&update),
        )
        .await
    }

    /// Deletes a habit.
    ///
    /// # Errors
    ///
    /// - [`MutationError::Validation`] if the habit is not cached
    /// - [`MutationError::Gateway`] if the server rejects the deletion; the
    ///   habit reappears
    pub async fn delete_habit(
        &self,
        habit_id: &HabitId,
        owner: OwnerId,
    ) -> Result<(), MutationError> {
        self.cached_habit(owner, habit_id)?;
        let snapshots = self.prepare(&[CacheKey::HabitList(owner)]);

        self.store().update_habits(owner, |mut habits| {
            habits.retain(|habit| &habit.id != habit_id);
            habits
        });

        self.commit("delete_habit", snapshots, self.gateway().delete_habit(habit_id))
            .await
    }

    // =========================================================================
    // Initial loads
    // =========================================================================

    /// Fetches the habit list of `owner` into the cache.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Gateway`] if the fetch fails; the cache is
    /// left untouched.
    pub async fn load_habits(&self, owner: OwnerId) -> Result<Vec<Habit>, MutationError> {
        self.refresher
            .refresh(CacheKey::HabitList(owner))
            .await
            .map_err(|error| MutationError::Gateway(error.source))?;
        Ok(self.store().habits(owner).unwrap_or_default())
    }

    /// Creates or refreshes the user record and caches it.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Gateway`] if the upsert fails; the cache is
    /// left untouched.
    pub async fn load_user(&self, request: UpsertUser) -> Result<User, MutationError> {
        let key = CacheKey::User(request.owner_id);
        self.refresher.cancel(key);
        let user = self.gateway().upsert_user(&request).await?;
        self.store().write(key, CacheValue::User(user.clone()));
        Ok(user)
    }

    // =========================================================================
    // Protocol steps
    // =========================================================================

    fn unknown(owner: OwnerId, habit_id: &HabitId) -> ValidationError {
        ValidationError::UnknownHabit {
            habit_id: habit_id.clone(),
            owner_id: owner,
        }
    }

    fn cached_habit(&self, owner: OwnerId, habit_id: &HabitId) -> Result<Habit, ValidationError> {
        if habit_id.is_placeholder() {
            return Err(ValidationError::PendingCreation {
                habit_id: habit_id.clone(),
            });
        }
        self.store()
            .habit(owner, habit_id)
            .ok_or_else(|| Self::unknown(owner, habit_id))
    }

    /// Cancels background refetches of `keys` and snapshots them.
    fn prepare(&self, keys: &[CacheKey]) -> Vec<Snapshot> {
        keys.iter()
            .map(|&key| {
                self.refresher.cancel(key);
                self.store().snapshot(key)
            })
            .collect()
    }

    fn restore(&self, snapshots: Vec<Snapshot>) {
        for snapshot in snapshots.into_iter().rev() {
            self.store().restore(snapshot);
        }
    }

    fn replace_habit<F>(&self, owner: OwnerId, habit_id: &HabitId, transform: F)
    where
        F: Fn(&Habit) -> Habit,
    {
        self.store().update_habits(owner, |habits| {
            habits
                .into_iter()
                .map(|habit| {
                    if &habit.id == habit_id {
                        transform(&habit)
                    } else {
                        habit
                    }
                })
                .collect()
        });
    }

    /// Awaits the gateway call and settles or rolls back.
    async fn commit<T, F>(
        &self,
        operation: &'static str,
        snapshots: Vec<Snapshot>,
        request: F,
    ) -> Result<T, MutationError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        let tracker = Tracker::begin(&self.pending, operation);
        match request.await {
            Ok(value) => {
                tracker.finish(MutationState::Settled);
                Ok(value)
            }
            Err(error) => {
                self.restore(snapshots);
                warn!(operation, %error, "mutation rolled back");
                tracker.finish(MutationState::RolledBack);
                Err(error.into())
            }
        }
    }
}

impl fmt::Debug for MutationEngine {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MutationEngine")
            .field("refresher", &self.refresher)
            .field("pending", &self.pending_mutations())
            .finish_non_exhaustive()
    }
}
