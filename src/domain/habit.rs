//! The habit entity and its value objects.
//!
//! A [`Habit`] is only ever changed by producing a new value: toggling a
//! completion returns a habit whose derived fields (`streak`,
//! `total_completions`) have been recomputed from the new completion set.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Category, Day, ValidationError};
use crate::streak::compute_streak;

/// Prefix of identifiers assigned locally to habits awaiting creation.
pub const PLACEHOLDER_PREFIX: &str = "optimistic-";

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of the account owning habits and points.
///
/// Assigned by the chat platform; serialized as a bare number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OwnerId(i64);

impl OwnerId {
    /// Wraps a platform user id.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw platform id.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Opaque habit identifier.
///
/// Server-assigned, except for placeholders (prefixed with
/// [`PLACEHOLDER_PREFIX`]) used while a creation is in flight.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(String);

impl HabitId {
    /// Wraps a server-assigned identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh placeholder identifier.
    #[must_use]
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", Uuid::new_v4()))
    }

    /// Returns `true` for locally generated placeholder identifiers.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for HabitId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for HabitId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// =============================================================================
// CompletionDates
// =============================================================================

/// The set of days on which a habit was completed.
///
/// Backed by an ordered set, so duplicates cannot exist and duplicates in
/// incoming JSON arrays collapse on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionDates(BTreeSet<Day>);

impl CompletionDates {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns `true` if `day` is in the set.
    #[must_use]
    pub fn contains(&self, day: Day) -> bool {
        self.0.contains(&day)
    }

    /// Returns the set with `day` flipped, and whether it was present before.
    #[must_use]
    pub fn toggled(&self, day: Day) -> (Self, bool) {
        let mut dates = self.0.clone();
        let was_present = dates.remove(&day);
        if !was_present {
            dates.insert(day);
        }
        (Self(dates), was_present)
    }

    /// Number of completed days.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no day is completed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The most recent completed day.
    #[must_use]
    pub fn latest(&self) -> Option<Day> {
        self.0.last().copied()
    }

    /// Iterates the days in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Day> {
        self.0.iter()
    }

    /// Current streak ending `today` or yesterday.
    #[must_use]
    pub fn streak(&self, today: Day) -> u32 {
        compute_streak(self.iter(), today)
    }

    /// Number of completed days in `[from, to]`.
    #[must_use]
    pub fn count_between(&self, from: Day, to: Day) -> usize {
        if from > to {
            return 0;
        }
        self.0.range(from..=to).count()
    }
}

impl FromIterator<Day> for CompletionDates {
    fn from_iter<I: IntoIterator<Item = Day>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// ReminderTime
// =============================================================================

/// Time of day for a reminder, written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime(NaiveTime);

impl ReminderTime {
    /// Parses `HH:MM`; a trailing `:SS` as stored by the database is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidReminderTime`] for anything else.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map(Self)
            .map_err(|_| ValidationError::InvalidReminderTime {
                input: input.to_string(),
            })
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0.format("%H:%M"))
    }
}

impl TryFrom<String> for ReminderTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReminderTime> for String {
    fn from(time: ReminderTime) -> Self {
        time.to_string()
    }
}

// =============================================================================
// Habit
// =============================================================================

/// One tracked behaviour of one owner.
///
/// `streak` and `total_completions` are derived from `completion_dates`;
/// use [`Habit::with_completions`] or [`Habit::toggled`] to change them
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    /// Server-assigned id, or a placeholder while creation is in flight.
    pub id: HabitId,
    /// Owning account.
    #[serde(rename = "telegram_id")]
    pub owner_id: OwnerId,
    /// Display title, never blank.
    pub title: String,
    /// Category deciding the point weight.
    #[serde(default)]
    pub category: Category,
    /// Icon name.
    pub icon: String,
    /// Hex color.
    pub color: String,
    /// Current streak, derived.
    #[serde(default)]
    pub streak: u32,
    /// Completed days.
    #[serde(rename = "completed_dates", default)]
    pub completion_dates: CompletionDates,
    /// Number of completed days, derived.
    #[serde(default)]
    pub total_completions: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Whether reminders are sent for this habit.
    #[serde(default)]
    pub reminder_enabled: bool,
    /// Reminder time; `None` means the owner's default.
    #[serde(default)]
    pub reminder_time: Option<ReminderTime>,
}

impl Habit {
    /// Icon used when a creation request omits one.
    pub const DEFAULT_ICON: &'static str = "circle";

    /// Color used when a creation request omits one.
    pub const DEFAULT_COLOR: &'static str = "#6366F1";

    /// Returns `true` if `day` is completed.
    #[must_use]
    pub fn is_completed_on(&self, day: Day) -> bool {
        self.completion_dates.contains(day)
    }

    /// Replaces the completion set and recomputes the derived fields.
    #[must_use]
    pub fn with_completions(self, completion_dates: CompletionDates, today: Day) -> Self {
        let streak = completion_dates.streak(today);
        let total_completions = u32::try_from(completion_dates.len()).unwrap_or(u32::MAX);
        Self {
            streak,
            total_completions,
            completion_dates,
            ..self
        }
    }

    /// Flips the completion of `day`.
    ///
    /// Returns the updated habit and whether `day` was completed before.
    #[must_use]
    pub fn toggled(&self, day: Day, today: Day) -> (Self, bool) {
        let (dates, was_completed) = self.completion_dates.toggled(day);
        (self.clone().with_completions(dates, today), was_completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn day(month: u32, day: u32) -> Day {
        Day::from_ymd(2025, month, day).unwrap()
    }

    #[fixture]
    fn habit() -> Habit {
        Habit {
            id: HabitId::new("habit-1"),
            owner_id: OwnerId::new(42),
            title: "Read".to_string(),
            category: Category::Other,
            icon: Habit::DEFAULT_ICON.to_string(),
            color: Habit::DEFAULT_COLOR.to_string(),
            streak: 0,
            completion_dates: CompletionDates::new(),
            total_completions: 0,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            reminder_enabled: false,
            reminder_time: None,
        }
    }

    #[rstest]
    fn toggling_on_recomputes_derived_fields(habit: Habit) {
        let (updated, was_completed) = habit.toggled(day(1, 7), day(1, 7));

        assert!(!was_completed);
        assert!(updated.is_completed_on(day(1, 7)));
        assert_eq!(updated.total_completions, 1);
        assert_eq!(updated.streak, 1);
    }

    #[rstest]
    fn toggling_twice_restores_the_original(habit: Habit) {
        let (once, _) = habit.toggled(day(1, 7), day(1, 7));
        let (twice, was_completed) = once.toggled(day(1, 7), day(1, 7));

        assert!(was_completed);
        assert_eq!(twice, habit);
    }

    #[rstest]
    fn placeholder_ids_are_recognised() {
        let placeholder = HabitId::placeholder();

        assert!(placeholder.is_placeholder());
        assert!(placeholder.as_str().starts_with(PLACEHOLDER_PREFIX));
        assert!(!HabitId::new("0b6c4f0e").is_placeholder());
        assert_ne!(placeholder, HabitId::placeholder());
    }

    #[rstest]
    fn completion_dates_collapse_duplicates_from_the_wire() {
        let dates: CompletionDates =
            serde_json::from_str(r#"["2025-01-06", "2025-01-07", "2025-01-06"]"#).unwrap();

        assert_eq!(dates.len(), 2);
        assert_eq!(dates.latest(), Some(day(1, 7)));
    }

    #[rstest]
    fn count_between_is_inclusive() {
        let dates: CompletionDates = [day(1, 1), day(1, 3), day(1, 7), day(1, 9)]
            .into_iter()
            .collect();

        assert_eq!(dates.count_between(day(1, 1), day(1, 7)), 3);
        assert_eq!(dates.count_between(day(1, 8), day(1, 2)), 0);
    }

    #[rstest]
    #[case("07:30", "07:30")]
    #[case("21:05:00", "21:05")]
    fn reminder_time_accepts_database_formats(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(ReminderTime::parse(input).unwrap().to_string(), expected);
    }

    #[rstest]
    fn reminder_time_rejects_garbage() {
        assert_eq!(
            ReminderTime::parse("25:99"),
            Err(ValidationError::InvalidReminderTime {
                input: "25:99".to_string()
            })
        );
    }

    #[rstest]
    fn deserializes_server_rows() {
        let json = r##"{
            "id": "0b6c4f0e",
            "telegram_id": 42,
            "title": "Push-ups",
            "category": "sport",
            "icon": "dumbbell",
            "color": "#F59E0B",
            "streak": 2,
            "completed_dates": ["2025-01-06", "2025-01-07"],
            "total_completions": 2,
            "created_at": "2025-01-01T08:00:00.123456+00:00",
            "reminder_enabled": true,
            "reminder_time": null
        }"##;

        let habit: Habit = serde_json::from_str(json).unwrap();

        assert_eq!(habit.category, Category::Sport);
        assert_eq!(habit.completion_dates.len(), 2);
        assert_eq!(habit.reminder_time, None);
    }
}
