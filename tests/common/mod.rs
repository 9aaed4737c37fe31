//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use habit_sync::prelude::*;
use rstest::fixture;

pub const OWNER: OwnerId = OwnerId::new(42);

/// A day of January 2025.
pub fn day(day: u32) -> Day {
    Day::from_ymd(2025, 1, day).unwrap()
}

/// A client wired to an in-memory server, pinned to January 7th.
pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub feed: Arc<MemoryChangeFeed>,
    pub gateway: Arc<InMemoryGateway>,
    pub store: Arc<CacheStore>,
    pub engine: MutationEngine,
    pub listener: ReconciliationListener,
}

impl Harness {
    pub fn new(config: ListenerConfig) -> Self {
        let clock = Arc::new(FixedClock::new(day(7)));
        let feed = Arc::new(MemoryChangeFeed::new());
        let gateway =
            Arc::new(InMemoryGateway::new(clock.clone()).with_feed(Arc::clone(&feed)));
        let store = Arc::new(CacheStore::new());
        let engine = MutationEngine::new(
            Arc::clone(&store),
            Arc::clone(&gateway) as Arc<dyn ServerGateway>,
            clock.clone(),
        );
        let listener = ReconciliationListener::new(
            Arc::clone(engine.refresher()),
            Arc::clone(&feed) as Arc<dyn ChangeFeed>,
        )
        .with_config(config);
        Self {
            clock,
            feed,
            gateway,
            store,
            engine,
            listener,
        }
    }

    /// Stores a habit on the server only.
    pub fn seed_habit(&self, id: &str, category: Category, days: &[u32]) -> Habit {
        let dates: CompletionDates = days.iter().map(|&d| day(d)).collect();
        let habit = NewHabit::new(OWNER, id, category)
            .to_habit(HabitId::new(id), DateTime::<Utc>::UNIX_EPOCH)
            .with_completions(dates, self.clock.today());
        self.gateway.seed_habit(habit.clone());
        habit
    }

    /// Stores a user with `points` on the server only.
    pub fn seed_points(&self, points: u32) {
        self.gateway.seed_user(User {
            total_points: points,
            ..User::new(OWNER)
        });
    }

    /// Loads habits and user into the cache.
    pub async fn load(&self) {
        self.engine.load_habits(OWNER).await.unwrap();
        self.engine.load_user(UpsertUser::new(OWNER)).await.unwrap();
    }

    /// The server's habit list of the owner.
    pub fn server_habits(&self) -> Vec<Habit> {
        self.gateway.habits(OWNER)
    }
}

#[fixture]
pub fn harness() -> Harness {
    Harness::new(ListenerConfig::default())
}

/// Polls `condition` until it holds, failing after two seconds.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}
