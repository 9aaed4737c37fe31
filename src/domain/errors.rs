//! Validation errors raised before any optimistic write or network call.

use thiserror::Error;

use super::{HabitId, OwnerId};

/// A request was rejected locally.
///
/// Validation always happens before the cache is touched, so a validation
/// failure never needs a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or blank.
    #[error("{field} is required")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// An edit carries no field to change.
    #[error("at least one of title, icon or color is required")]
    EmptyEdit,

    /// The habit is not present in the owner's cached habit list.
    #[error("habit '{habit_id}' is not cached for owner {owner_id}")]
    UnknownHabit {
        /// The requested habit.
        habit_id: HabitId,
        /// The owner whose list was searched.
        owner_id: OwnerId,
    },

    /// The habit only exists as an optimistic placeholder; the server does
    /// not know it yet.
    #[error("habit '{habit_id}' is still being created")]
    PendingCreation {
        /// The placeholder identifier.
        habit_id: HabitId,
    },

    /// A reminder time is not `HH:MM`.
    #[error("invalid reminder time '{input}': expected HH:MM")]
    InvalidReminderTime {
        /// The rejected input.
        input: String,
    },
}
