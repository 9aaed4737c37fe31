//! Domain model: habits, users, calendar days and the commands that change
//! them.

pub mod category;
pub mod clock;
pub mod commands;
pub mod day;
pub mod errors;
pub mod habit;
pub mod user;

pub use category::Category;
pub use clock::{Clock, FixedClock, SystemClock};
pub use commands::{
    HabitEdit, NewHabit, ReminderUpdate, ToggleCompletion, ToggleResponse, UpsertUser,
};
pub use day::{Day, DayParseError};
pub use errors::ValidationError;
pub use habit::{CompletionDates, Habit, HabitId, OwnerId, PLACEHOLDER_PREFIX, ReminderTime};
pub use user::{User, UserProfile};
