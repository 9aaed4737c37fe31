//! Mutation requests and their local validation.
//!
//! Each command serializes to the request body the server expects and knows
//! how to apply itself to a cached [`Habit`] for the optimistic write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Category, CompletionDates, Day, Habit, HabitId, OwnerId, ReminderTime, UserProfile,
    ValidationError,
};

// =============================================================================
// NewHabit
// =============================================================================

/// Request to create a habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHabit {
    /// Owner of the new habit.
    #[serde(rename = "telegram_id")]
    pub owner_id: OwnerId,
    /// Title, must not be blank.
    pub title: String,
    /// Category.
    pub category: Category,
    /// Icon, [`Habit::DEFAULT_ICON`] when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Color, [`Habit::DEFAULT_COLOR`] when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl NewHabit {
    /// Creates a request with default icon and color.
    #[must_use]
    pub fn new(owner_id: OwnerId, title: impl Into<String>, category: Category) -> Self {
        Self {
            owner_id,
            title: title.into(),
            category,
            icon: None,
            color: None,
        }
    }

    /// Sets the icon.
    #[must_use]
    pub fn with_icon(self, icon: impl Into<String>) -> Self {
        Self {
            icon: Some(icon.into()),
            ..self
        }
    }

    /// Sets the color.
    #[must_use]
    pub fn with_color(self, color: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            ..self
        }
    }

    /// Checks the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] for a blank title.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "title" });
        }
        Ok(())
    }

    /// Builds the habit as it is shown before the server confirms it.
    #[must_use]
    pub fn to_habit(&self, id: HabitId, created_at: DateTime<Utc>) -> Habit {
        Habit {
            id,
            owner_id: self.owner_id,
            title: self.title.trim().to_string(),
            category: self.category,
            icon: self
                .icon
                .clone()
                .unwrap_or_else(|| Habit::DEFAULT_ICON.to_string()),
            color: self
                .color
                .clone()
                .unwrap_or_else(|| Habit::DEFAULT_COLOR.to_string()),
            streak: 0,
            completion_dates: CompletionDates::new(),
            total_completions: 0,
            created_at,
            reminder_enabled: false,
            reminder_time: None,
        }
    }
}

// =============================================================================
// ToggleCompletion
// =============================================================================

/// Request to flip the completion of one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleCompletion {
    /// Target habit.
    pub habit_id: HabitId,
    /// Day to flip.
    #[serde(rename = "date")]
    pub day: Day,
    /// Owner whose points change.
    #[serde(rename = "telegram_id")]
    pub owner_id: OwnerId,
}

/// Server answer to [`ToggleCompletion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleResponse {
    /// The habit as stored by the server.
    pub habit: Habit,
    /// Signed point change applied by the server.
    #[serde(rename = "pointsDelta")]
    pub points_delta: i64,
}

// =============================================================================
// HabitEdit
// =============================================================================

/// Request to change display metadata.
///
/// Absent fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitEdit {
    /// Target habit.
    pub habit_id: HabitId,
    /// Owner, used for the cache key only.
    #[serde(skip)]
    pub owner_id: OwnerId,
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New icon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// New color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl HabitEdit {
    /// Creates an edit changing nothing yet.
    #[must_use]
    pub fn new(habit_id: HabitId, owner_id: OwnerId) -> Self {
        Self {
            habit_id,
            owner_id,
            title: None,
            icon: None,
            color: None,
        }
    }

    /// Sets the new title.
    #[must_use]
    pub fn title(self, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..self
        }
    }

    /// Sets the new icon.
    #[must_use]
    pub fn icon(self, icon: impl Into<String>) -> Self {
        Self {
            icon: Some(icon.into()),
            ..self
        }
    }

    /// Sets the new color.
    #[must_use]
    pub fn color(self, color: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            ..self
        }
    }

    /// Drops blank fields and trims the title.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEdit`] when nothing is left to change.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        let non_blank = |value: Option<String>| {
            value
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        };
        let edit = Self {
            title: non_blank(self.title),
            icon: non_blank(self.icon),
            color: non_blank(self.color),
            ..self
        };
        if edit.title.is_none() && edit.icon.is_none() && edit.color.is_none() {
            return Err(ValidationError::EmptyEdit);
        }
        Ok(edit)
    }

    /// Applies the present fields to `habit`.
    #[must_use]
    pub fn apply(&self, habit: &Habit) -> Habit {
        Habit {
            title: self.title.clone().unwrap_or_else(|| habit.title.clone()),
            icon: self.icon.clone().unwrap_or_else(|| habit.icon.clone()),
            color: self.color.clone().unwrap_or_else(|| habit.color.clone()),
            ..habit.clone()
        }
    }
}

// =============================================================================
// ReminderUpdate
// =============================================================================

/// Request to change reminder scheduling of a habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderUpdate {
    /// Target habit.
    pub habit_id: HabitId,
    /// Owner of the habit.
    #[serde(rename = "telegram_id")]
    pub owner_id: OwnerId,
    /// Whether reminders are on.
    pub reminder_enabled: bool,
    /// Reminder time; `None` falls back to the owner's default.
    pub reminder_time: Option<ReminderTime>,
}

impl ReminderUpdate {
    /// Applies the reminder fields to `habit`.
    #[must_use]
    pub fn apply(&self, habit: &Habit) -> Habit {
        Habit {
            reminder_enabled: self.reminder_enabled,
            reminder_time: self.reminder_time,
            ..habit.clone()
        }
    }
}

// =============================================================================
// UpsertUser
// =============================================================================

/// Request to create or refresh the owner's user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertUser {
    /// Platform id.
    #[serde(rename = "telegram_id")]
    pub owner_id: OwnerId,
    /// Profile fields to store.
    #[serde(flatten)]
    pub profile: UserProfile,
}

impl UpsertUser {
    /// Creates a request with an empty profile.
    #[must_use]
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            profile: UserProfile::default(),
        }
    }
}
