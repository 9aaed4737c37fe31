//! Streak derivation.
//!
//! A streak is the number of consecutive calendar days, ending today or
//! yesterday, on which a habit was completed. The client computes it for
//! the optimistic display and the server for the stored value; both call
//! [`compute_streak`], so the two can only disagree when their `today`
//! differs.
//!
//! # Examples
//!
//! ```rust
//! use habit_sync::{Day, compute_streak};
//!
//! let day = |d| Day::from_ymd(2025, 1, d).unwrap();
//!
//! assert_eq!(compute_streak(&[day(5), day(6), day(7)], day(7)), 3);
//! assert_eq!(compute_streak(&[day(1), day(3)], day(3)), 1);
//! assert_eq!(compute_streak(&[day(1)], day(5)), 0);
//! assert_eq!(compute_streak(&Vec::<Day>::new(), day(5)), 0);
//! ```

use std::collections::BTreeSet;

use crate::domain::Day;

/// Computes the current streak of a completion-date set.
///
/// Duplicates are ignored and the input order does not matter. If the most
/// recent day is older than yesterday the streak is broken and `0` is
/// returned; otherwise days are counted backwards from the most recent one
/// until the first gap.
///
/// # Arguments
///
/// * `dates` - Completed days, in any order, possibly repeated
/// * `today` - The current calendar day
pub fn compute_streak<'a, I>(dates: I, today: Day) -> u32
where
    I: IntoIterator<Item = &'a Day>,
{
    let unique: BTreeSet<Day> = dates.into_iter().copied().collect();
    let mut descending = unique.into_iter().rev();

    let Some(latest) = descending.next() else {
        return 0;
    };

    if latest < today.previous() {
        return 0;
    }

    let mut streak = 1;
    let mut previous = latest;
    for date in descending {
        if date != previous.previous() {
            break;
        }
        streak += 1;
        previous = date;
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn january(day: u32) -> Day {
        Day::from_ymd(2025, 1, day).unwrap()
    }

    #[rstest]
    #[case(&[5, 6, 7], 7, 3)]
    #[case(&[1, 3], 3, 1)]
    #[case(&[1], 5, 0)]
    #[case(&[], 5, 0)]
    #[case(&[], 1, 0)]
    #[case(&[5, 6], 7, 2)]
    #[case(&[4, 6], 7, 1)]
    #[case(&[7, 5, 6, 6, 7], 7, 3)]
    #[case(&[1, 2, 3, 4, 5, 6, 7], 7, 7)]
    #[case(&[1, 2, 3, 4, 5], 7, 0)]
    fn streak_examples(#[case] days: &[u32], #[case] today: u32, #[case] expected: u32) {
        let dates: Vec<Day> = days.iter().map(|&day| january(day)).collect();

        assert_eq!(compute_streak(&dates, january(today)), expected);
    }

    #[rstest]
    fn streak_spans_month_boundaries() {
        let dates = [
            Day::from_ymd(2024, 12, 30).unwrap(),
            Day::from_ymd(2024, 12, 31).unwrap(),
            january(1),
        ];

        assert_eq!(compute_streak(&dates, january(2)), 3);
    }

    #[rstest]
    fn future_days_start_the_walk() {
        let dates = [january(8), january(7)];

        assert_eq!(compute_streak(&dates, january(7)), 2);
    }
}
