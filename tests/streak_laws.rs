//! Property-based tests for the streak calculator.
//!
//! - **Determinism**: the same set and day always give the same streak
//! - **Set semantics**: order and duplicates of the input do not matter
//! - **Bound**: a streak never exceeds the number of distinct days
//! - **Agreement**: the optimistic habit and the server's habit carry the
//!   same streak after a toggle

use std::collections::BTreeSet;

use habit_sync::{Day, compute_streak};
use proptest::prelude::*;

fn day_strategy() -> impl Strategy<Value = Day> {
    (0u32..60).prop_map(|offset| Day::from_ymd(2025, 3, 1).unwrap().days_before(offset))
}

fn dates_strategy() -> impl Strategy<Value = Vec<Day>> {
    prop::collection::vec(day_strategy(), 0..40)
}

proptest! {
    /// Calling twice gives the same result
    #[test]
    fn prop_streak_is_deterministic(dates in dates_strategy(), today in day_strategy()) {
        prop_assert_eq!(compute_streak(&dates, today), compute_streak(&dates, today));
    }

    /// Reversing and duplicating the input changes nothing
    #[test]
    fn prop_streak_ignores_order_and_duplicates(dates in dates_strategy(), today in day_strategy()) {
        let mut shuffled: Vec<Day> = dates.iter().rev().copied().collect();
        shuffled.extend(dates.iter().copied());

        prop_assert_eq!(compute_streak(&shuffled, today), compute_streak(&dates, today));
    }

    /// The streak counts distinct days only
    #[test]
    fn prop_streak_is_bounded_by_distinct_days(dates in dates_strategy(), today in day_strategy()) {
        let distinct: BTreeSet<Day> = dates.iter().copied().collect();

        prop_assert!(compute_streak(&dates, today) as usize <= distinct.len());
    }

    /// A run of consecutive days ending today has exactly its length
    #[test]
    fn prop_consecutive_run_ending_today(length in 1u32..45, today in day_strategy()) {
        let dates: Vec<Day> = (0..length).map(|offset| today.days_before(offset)).collect();

        prop_assert_eq!(compute_streak(&dates, today), length);
    }

    /// Dates older than yesterday alone never form a streak
    #[test]
    fn prop_old_dates_break_the_streak(dates in dates_strategy(), today in day_strategy()) {
        let yesterday = today.previous();
        let old: Vec<Day> = dates.into_iter().filter(|date| *date < yesterday).collect();

        prop_assert_eq!(compute_streak(&old, today), 0);
    }
}

mod agreement {
    use std::sync::Arc;

    use habit_sync::prelude::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Client and server compute the same streak for the same toggle
        #[test]
        fn prop_client_and_server_agree(
            offsets in prop::collection::btree_set(0u32..20, 0..15),
            toggled in 0u32..20,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let today = Day::from_ymd(2025, 1, 31).unwrap();
            let owner = OwnerId::new(1);

            runtime.block_on(async {
                let clock = Arc::new(FixedClock::new(today));
                let gateway = Arc::new(InMemoryGateway::new(clock.clone()));
                let dates: CompletionDates =
                    offsets.iter().map(|&offset| today.days_before(offset)).collect();
                let habit = NewHabit::new(owner, "Walk", Category::Other)
                    .to_habit(HabitId::new("walk"), clock.now())
                    .with_completions(dates, today);
                gateway.seed_habit(habit.clone());
                let engine = MutationEngine::new(
                    Arc::new(CacheStore::new()),
                    gateway.clone() as Arc<dyn ServerGateway>,
                    clock,
                );
                engine.load_habits(owner).await.unwrap();

                let receipt = engine
                    .toggle_completion(&habit.id, today.days_before(toggled), owner)
                    .await
                    .unwrap();

                assert_eq!(receipt.habit.streak, receipt.server.habit.streak);
                assert_eq!(receipt.habit.completion_dates, receipt.server.habit.completion_dates);
                assert_eq!(receipt.points_delta, receipt.server.points_delta);
            });
        }
    }
}
