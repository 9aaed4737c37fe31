//! Authoritative server held in process memory.
//!
//! [`InMemoryGateway`] implements the server side of every route the way the
//! habit API does: it computes streaks with [`compute_streak`], applies point
//! deltas to users, and announces changes on an optional
//! [`MemoryChangeFeed`]. Tests drive it through a few extra controls:
//!
//! - [`InMemoryGateway::fail_next`] queues an error for the next call
//! - [`InMemoryGateway::fail_next_on`] queues one for the next call of a
//!   single [`Operation`]
//! - [`InMemoryGateway::pause`] / [`InMemoryGateway::release`] hold calls in
//!   flight
//! - [`InMemoryGateway::calls`] counts calls per [`Operation`]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use super::{GatewayError, ServerGateway};
use crate::domain::{
    Clock, Habit, HabitEdit, HabitId, NewHabit, OwnerId, ReminderUpdate, ToggleCompletion,
    ToggleResponse, UpsertUser, User,
};
use crate::feed::{ChangeEvent, ChangeKind, MemoryChangeFeed, Table};
use crate::streak::compute_streak;

/// Gateway operation, used to count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_habits`
    ListHabits,
    /// `create_habit`
    CreateHabit,
    /// `toggle_completion`
    ToggleCompletion,
    /// `edit_habit`
    EditHabit,
    /// `update_reminder`
    UpdateReminder,
    /// `delete_habit`
    DeleteHabit,
    /// `upsert_user`
    UpsertUser,
}

#[derive(Debug, Default)]
struct ServerState {
    habits: Vec<Habit>,
    users: HashMap<OwnerId, User>,
    next_id: u64,
}

/// [`ServerGateway`] backed by in-process state.
pub struct InMemoryGateway {
    state: Mutex<ServerState>,
    clock: Arc<dyn Clock>,
    feed: Option<Arc<MemoryChangeFeed>>,
    failures: Mutex<VecDeque<GatewayError>>,
    targeted_failures: Mutex<HashMap<Operation, VecDeque<GatewayError>>>,
    gate: watch::Sender<bool>,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl InMemoryGateway {
    /// Creates an empty server whose `today` comes from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            clock,
            feed: None,
            failures: Mutex::new(VecDeque::new()),
            targeted_failures: Mutex::new(HashMap::new()),
            gate: watch::Sender::new(true),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Announces every change on `feed`.
    #[must_use]
    pub fn with_feed(self, feed: Arc<MemoryChangeFeed>) -> Self {
        Self {
            feed: Some(feed),
            ..self
        }
    }

    // =========================================================================
    // Test controls
    // =========================================================================

    /// Makes the next call fail with `error` after it passes the gate.
    pub fn fail_next(&self, error: GatewayError) {
        self.failures.lock().push_back(error);
    }

    /// Makes the next call of `operation` fail with `error`; other
    /// operations are unaffected.
    pub fn fail_next_on(&self, operation: Operation, error: GatewayError) {
        self.targeted_failures
            .lock()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Holds every call until [`InMemoryGateway::release`].
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    /// Lets held and future calls proceed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Number of calls of `operation` that reached the server so far.
    #[must_use]
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls.lock().get(&operation).copied().unwrap_or_default()
    }

    // =========================================================================
    // Direct state access
    // =========================================================================

    /// Stores `habit` as if another session had created it. Not announced.
    pub fn seed_habit(&self, habit: Habit) {
        let mut state = self.state.lock();
        state.habits.retain(|stored| stored.id != habit.id);
        state.habits.insert(0, habit);
    }

    /// Stores `user` as is. Not announced.
    pub fn seed_user(&self, user: User) {
        self.state.lock().users.insert(user.id, user);
    }

    /// The stored habit with `habit_id`.
    #[must_use]
    pub fn habit(&self, habit_id: &HabitId) -> Option<Habit> {
        self.state
            .lock()
            .habits
            .iter()
            .find(|habit| &habit.id == habit_id)
            .cloned()
    }

    /// The stored habits of `owner`, newest first.
    #[must_use]
    pub fn habits(&self, owner: OwnerId) -> Vec<Habit> {
        self.state
            .lock()
            .habits
            .iter()
            .filter(|habit| habit.owner_id == owner)
            .cloned()
            .collect()
    }

    /// The stored user of `owner`.
    #[must_use]
    pub fn user(&self, owner: OwnerId) -> Option<User> {
        self.state.lock().users.get(&owner).cloned()
    }

    /// Toggles a day as another device would, announcing the change.
    ///
    /// # Errors
    ///
    /// Returns a 404 [`GatewayError::Server`] for an unknown habit.
    pub fn toggle_elsewhere(
        &self,
        request: &ToggleCompletion,
    ) -> Result<ToggleResponse, GatewayError> {
        self.apply_toggle(request)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn enter(&self, operation: Operation) -> Result<(), GatewayError> {
        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = gate.wait_for(|open| *open).await;
        *self.calls.lock().entry(operation).or_default() += 1;
        let targeted = self
            .targeted_failures
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match targeted.or_else(|| self.failures.lock().pop_front()) {
            Some(error) => {
                debug!(?operation, %error, "injected failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn announce(&self, owner: OwnerId, table: Table, kind: ChangeKind) {
        if let Some(feed) = &self.feed {
            feed.publish(owner, ChangeEvent::new(table, kind));
        }
    }

    fn not_found() -> GatewayError {
        GatewayError::server(404, "Habit not found")
    }

    fn update_habit<F>(&self, habit_id: &HabitId, transform: F) -> Result<Habit, GatewayError>
    where
        F: FnOnce(&Habit) -> Habit,
    {
        let updated = {
            let mut state = self.state.lock();
            let stored = state
                .habits
                .iter_mut()
                .find(|habit| &habit.id == habit_id)
                .ok_or_else(Self::not_found)?;
            let updated = transform(stored);
            *stored = updated.clone();
            updated
        };
        self.announce(updated.owner_id, Table::Habits, ChangeKind::Update);
        Ok(updated)
    }

    fn apply_toggle(&self, request: &ToggleCompletion) -> Result<ToggleResponse, GatewayError> {
        let today = self.clock.today();
        let (habit, points_delta, owner) = {
            let mut state = self.state.lock();
            let stored = state
                .habits
                .iter_mut()
                .find(|habit| habit.id == request.habit_id)
                .ok_or_else(Self::not_found)?;
            let (dates, was_completed) = stored.completion_dates.toggled(request.day);
            stored.streak = compute_streak(dates.iter(), today);
            stored.total_completions = u32::try_from(dates.len()).unwrap_or(u32::MAX);
            stored.completion_dates = dates;
            let points_delta = stored.category.toggle_delta(was_completed);
            let habit = stored.clone();

            let user = state
                .users
                .remove(&request.owner_id)
                .unwrap_or_else(|| User::new(request.owner_id));
            state
                .users
                .insert(request.owner_id, user.with_points_delta(points_delta));
            (habit, points_delta, request.owner_id)
        };
        self.announce(habit.owner_id, Table::Habits, ChangeKind::Update);
        if points_delta != 0 {
            self.announce(owner, Table::Users, ChangeKind::Update);
        }
        Ok(ToggleResponse {
            habit,
            points_delta,
        })
    }
}

impl std::fmt::Debug for InMemoryGateway {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("InMemoryGateway")
            .field("state", &self.state)
            .field("paused", &!*self.gate.borrow())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ServerGateway for InMemoryGateway {
    async fn list_habits(&self, owner: OwnerId) -> Result<Vec<Habit>, GatewayError> {
        self.enter(Operation::ListHabits).await?;
        Ok(self.habits(owner))
    }

    async fn create_habit(&self, draft: &NewHabit) -> Result<Habit, GatewayError> {
        self.enter(Operation::CreateHabit).await?;
        if draft.validate().is_err() {
            return Err(GatewayError::server(
                400,
                "telegram_id and title are required",
            ));
        }
        let habit = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = HabitId::new(format!("habit-{}", state.next_id));
            let habit = draft.to_habit(id, self.clock.now());
            state.habits.insert(0, habit.clone());
            habit
        };
        self.announce(habit.owner_id, Table::Habits, ChangeKind::Insert);
        Ok(habit)
    }

    async fn toggle_completion(
        &self,
        request: &ToggleCompletion,
    ) -> Result<ToggleResponse, GatewayError> {
        self.enter(Operation::ToggleCompletion).await?;
        self.apply_toggle(request)
    }

    async fn edit_habit(&self, edit: &HabitEdit) -> Result<Habit, GatewayError> {
        self.enter(Operation::EditHabit).await?;
        let edit = edit.clone().normalized().map_err(|_| {
            GatewayError::server(400, "At least one field (title, icon, color) is required")
        })?;
        self.update_habit(&edit.habit_id, |habit| edit.apply(habit))
    }

    async fn update_reminder(&self, update: &ReminderUpdate) -> Result<Habit, GatewayError> {
        self.enter(Operation::UpdateReminder).await?;
        self.update_habit(&update.habit_id, |habit| update.apply(habit))
    }

    async fn delete_habit(&self, habit_id: &HabitId) -> Result<(), GatewayError> {
        self.enter(Operation::DeleteHabit).await?;
        let removed = {
            let mut state = self.state.lock();
            let position = state.habits.iter().position(|habit| &habit.id == habit_id);
            position.map(|index| state.habits.remove(index))
        };
        if let Some(habit) = removed {
            self.announce(habit.owner_id, Table::Habits, ChangeKind::Delete);
        }
        Ok(())
    }

    async fn upsert_user(&self, request: &UpsertUser) -> Result<User, GatewayError> {
        self.enter(Operation::UpsertUser).await?;
        let (user, inserted) = {
            let mut state = self.state.lock();
            let inserted = !state.users.contains_key(&request.owner_id);
            let user = state
                .users
                .entry(request.owner_id)
                .or_insert_with(|| User::new(request.owner_id));
            user.profile = user.profile.merged(&request.profile);
            (user.clone(), inserted)
        };
        // Updating an existing user is not announced, otherwise every user
        // refetch would trigger the next one.
        if inserted {
            self.announce(user.id, Table::Users, ChangeKind::Insert);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, Day, FixedClock};
    use crate::feed::{ChangeFeed, FeedMessage};
    use futures::StreamExt;
    use rstest::{fixture, rstest};

    const OWNER: OwnerId = OwnerId::new(42);

    fn day(day: u32) -> Day {
        Day::from_ymd(2025, 1, day).unwrap()
    }

    #[fixture]
    fn gateway() -> InMemoryGateway {
        InMemoryGateway::new(Arc::new(FixedClock::new(day(7))))
    }

    #[rstest]
    #[tokio::test]
    async fn toggle_recomputes_streak_and_points(gateway: InMemoryGateway) {
        let habit = gateway
            .create_habit(&NewHabit::new(OWNER, "Run", Category::Sport))
            .await
            .unwrap();

        for date in [day(5), day(6), day(7)] {
            let request = ToggleCompletion {
                habit_id: habit.id.clone(),
                day: date,
                owner_id: OWNER,
            };
            gateway.toggle_completion(&request).await.unwrap();
        }

        let stored = gateway.habit(&habit.id).unwrap();
        assert_eq!(stored.streak, 3);
        assert_eq!(stored.total_completions, 3);
        assert_eq!(gateway.user(OWNER).unwrap().total_points, 30);
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_habits_are_not_found(gateway: InMemoryGateway) {
        let request = ToggleCompletion {
            habit_id: HabitId::new("missing"),
            day: day(7),
            owner_id: OWNER,
        };

        let error = gateway.toggle_completion(&request).await.unwrap_err();

        assert_eq!(error.status(), Some(404));
    }

    #[rstest]
    #[tokio::test]
    async fn injected_failures_are_consumed_once(gateway: InMemoryGateway) {
        gateway.fail_next(GatewayError::server(500, "boom"));

        assert!(gateway.list_habits(OWNER).await.is_err());
        assert!(gateway.list_habits(OWNER).await.is_ok());
        assert_eq!(gateway.calls(Operation::ListHabits), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn targeted_failures_skip_other_operations(gateway: InMemoryGateway) {
        gateway.fail_next_on(Operation::ListHabits, GatewayError::server(503, "busy"));

        assert!(
            gateway
                .create_habit(&NewHabit::new(OWNER, "Run", Category::Sport))
                .await
                .is_ok()
        );
        assert!(gateway.list_habits(OWNER).await.is_err());
        assert!(gateway.list_habits(OWNER).await.is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn changes_are_announced(gateway: InMemoryGateway) {
        let feed = Arc::new(MemoryChangeFeed::new());
        let gateway = gateway.with_feed(Arc::clone(&feed));
        let mut stream = feed.subscribe(OWNER).await.unwrap();

        gateway
            .create_habit(&NewHabit::new(OWNER, "Run", Category::Sport))
            .await
            .unwrap();

        assert_eq!(
            stream.next().await,
            Some(FeedMessage::Change(ChangeEvent::new(
                Table::Habits,
                ChangeKind::Insert
            )))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn upsert_keeps_the_point_balance(gateway: InMemoryGateway) {
        gateway.seed_user(User {
            total_points: 40,
            ..User::new(OWNER)
        });

        let user = gateway.upsert_user(&UpsertUser::new(OWNER)).await.unwrap();

        assert_eq!(user.total_points, 40);
    }

    #[rstest]
    #[tokio::test]
    async fn upsert_merges_only_given_profile_fields(gateway: InMemoryGateway) {
        let mut stored = User::new(OWNER);
        stored.profile.first_name = Some("Ada".to_string());
        stored.profile.timezone = Some("Europe/Moscow".to_string());
        gateway.seed_user(stored);
        let mut request = UpsertUser::new(OWNER);
        request.profile.username = Some("ada".to_string());

        let user = gateway.upsert_user(&request).await.unwrap();

        assert_eq!(user.profile.username.as_deref(), Some("ada"));
        assert_eq!(user.profile.first_name.as_deref(), Some("Ada"));
        assert_eq!(user.profile.timezone.as_deref(), Some("Europe/Moscow"));
    }
}
