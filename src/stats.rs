//! Dashboard figures derived from a habit list.
//!
//! Everything here is a pure function of the cached habits and `today`, so
//! figures follow optimistic writes and rollbacks without extra bookkeeping.
//! Streaks are recomputed from the completion dates rather than read from
//! the stored field, which may lag a day behind.

use crate::domain::{Category, Day, Habit};

/// Days covered by the weekly figures, today included.
pub const WEEK_DAYS: u32 = 7;

/// Per-category figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryStats {
    /// The category.
    pub category: Category,
    /// Number of habits in it.
    pub habits: usize,
    /// Completed days across those habits.
    pub completions: usize,
}

/// Aggregate figures of one owner's habits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitStats {
    /// Number of habits.
    pub total_habits: usize,
    /// Habits completed today.
    pub completed_today: usize,
    /// Longest current streak.
    pub best_streak: u32,
    /// Completed days across all habits.
    pub total_completions: usize,
    /// Share of habit-days completed over the last [`WEEK_DAYS`] days, in
    /// percent.
    pub weekly_progress: u8,
    /// Figures per category, in [`Category::ALL`] order.
    pub categories: Vec<CategoryStats>,
}

impl HabitStats {
    /// Computes the figures of `habits` as of `today`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use habit_sync::stats::HabitStats;
    /// use habit_sync::Day;
    ///
    /// let stats = HabitStats::from_habits(&[], Day::from_ymd(2025, 1, 7).unwrap());
    /// assert_eq!(stats.total_habits, 0);
    /// assert_eq!(stats.weekly_progress, 0);
    /// ```
    #[must_use]
    pub fn from_habits(habits: &[Habit], today: Day) -> Self {
        let week_start = today.days_before(WEEK_DAYS - 1);
        let completed_this_week: usize = habits
            .iter()
            .map(|habit| habit.completion_dates.count_between(week_start, today))
            .sum();
        let possible = habits.len() * WEEK_DAYS as usize;
        let weekly_progress = if possible == 0 {
            0
        } else {
            u8::try_from(completed_this_week * 100 / possible).unwrap_or(100)
        };

        let categories = Category::ALL
            .iter()
            .map(|&category| {
                let (count, completions) = habits
                    .iter()
                    .filter(|habit| habit.category == category)
                    .fold((0, 0), |(count, completions), habit| {
                        (count + 1, completions + habit.completion_dates.len())
                    });
                CategoryStats {
                    category,
                    habits: count,
                    completions,
                }
            })
            .collect();

        Self {
            total_habits: habits.len(),
            completed_today: habits
                .iter()
                .filter(|habit| habit.is_completed_on(today))
                .count(),
            best_streak: habits
                .iter()
                .map(|habit| habit.completion_dates.streak(today))
                .max()
                .unwrap_or(0),
            total_completions: habits
                .iter()
                .map(|habit| habit.completion_dates.len())
                .sum(),
            weekly_progress,
            categories,
        }
    }

    /// Achievements unlocked by these figures.
    #[must_use]
    pub fn achievements(&self) -> Vec<Achievement> {
        Achievement::ALL
            .into_iter()
            .filter(|achievement| achievement.is_unlocked(self))
            .collect()
    }
}

/// Milestones shown on the progress page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Achievement {
    /// At least one completion.
    FirstSteps,
    /// A streak of seven days.
    Week,
    /// Thirty completions.
    Consistency,
    /// A hundred completions.
    Legend,
}

impl Achievement {
    /// Every achievement, easiest first.
    pub const ALL: [Self; 4] = [Self::FirstSteps, Self::Week, Self::Consistency, Self::Legend];

    /// Returns `true` if `stats` reach this milestone.
    #[must_use]
    pub const fn is_unlocked(self, stats: &HabitStats) -> bool {
        match self {
            Self::FirstSteps => stats.total_completions >= 1,
            Self::Week => stats.best_streak >= 7,
            Self::Consistency => stats.total_completions >= 30,
            Self::Legend => stats.total_completions >= 100,
        }
    }
}

/// Points earned per day over the `days` days ending `today`, oldest first.
///
/// Each completion counts the weight of its habit's category.
#[must_use]
pub fn daily_points(habits: &[Habit], today: Day, days: u32) -> Vec<(Day, u32)> {
    (0..days)
        .rev()
        .map(|offset| {
            let day = today.days_before(offset);
            let points = habits
                .iter()
                .filter(|habit| habit.is_completed_on(day))
                .map(|habit| habit.category.weight())
                .sum();
            (day, points)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompletionDates, HabitId, NewHabit, OwnerId};
    use chrono::{DateTime, Utc};
    use rstest::rstest;

    fn day(day: u32) -> Day {
        Day::from_ymd(2025, 1, day).unwrap()
    }

    fn habit(category: Category, days: &[u32]) -> Habit {
        let dates: CompletionDates = days.iter().map(|&d| day(d)).collect();
        NewHabit::new(OwnerId::new(1), "Habit", category)
            .to_habit(HabitId::new("h"), DateTime::<Utc>::UNIX_EPOCH)
            .with_completions(dates, day(10))
    }

    #[rstest]
    fn figures_follow_the_completion_dates() {
        let habits = [
            habit(Category::Sport, &[8, 9, 10]),
            habit(Category::Nutrition, &[1, 10]),
            habit(Category::Sport, &[]),
        ];

        let stats = HabitStats::from_habits(&habits, day(10));

        assert_eq!(stats.total_habits, 3);
        assert_eq!(stats.completed_today, 2);
        assert_eq!(stats.best_streak, 3);
        assert_eq!(stats.total_completions, 5);
        // 4 of 21 habit-days in Jan 4..=10.
        assert_eq!(stats.weekly_progress, 19);
        let sport = stats.categories[0];
        assert_eq!(sport.category, Category::Sport);
        assert_eq!((sport.habits, sport.completions), (2, 3));
    }

    #[rstest]
    fn stale_stored_streaks_are_recomputed() {
        let habits = [habit(Category::Other, &[1, 2, 3])];

        let stats = HabitStats::from_habits(&habits, day(10));

        assert_eq!(stats.best_streak, 0);
    }

    #[rstest]
    #[case(0, &[])]
    #[case(1, &[Achievement::FirstSteps])]
    #[case(7, &[Achievement::FirstSteps, Achievement::Week])]
    #[case(30, &[Achievement::FirstSteps, Achievement::Week, Achievement::Consistency])]
    fn achievements_unlock_at_thresholds(#[case] streak: u32, #[case] expected: &[Achievement]) {
        let days: Vec<u32> = (0..streak).map(|offset| 31 - offset).collect();
        let dates: CompletionDates = days.iter().map(|&d| day(d)).collect();
        let habit = habit(Category::Other, &[]).with_completions(dates, day(31));

        let stats = HabitStats::from_habits(&[habit], day(31));

        assert_eq!(stats.achievements(), expected);
    }

    #[rstest]
    fn daily_points_weigh_categories() {
        let habits = [
            habit(Category::Regime, &[9, 10]),
            habit(Category::Nutrition, &[10]),
        ];

        let points = daily_points(&habits, day(10), 3);

        assert_eq!(points, vec![(day(8), 0), (day(9), 12), (day(10), 20)]);
    }
}
