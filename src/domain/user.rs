//! The user entity: owner of habits and holder of the point balance.

use serde::{Deserialize, Serialize};

use super::{OwnerId, ReminderTime};

/// Profile fields of a user. None of them affect points or streaks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    /// Platform username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// First name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Last name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// IANA timezone name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Whether reminders are delivered at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications_enabled: Option<bool>,
    /// Reminder time for habits without their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_reminder_time: Option<ReminderTime>,
}

impl UserProfile {
    /// Returns this profile with every field present in `update` replaced.
    ///
    /// Absent fields keep their current value, so a request carrying only
    /// the identity changes nothing.
    #[must_use]
    pub fn merged(&self, update: &Self) -> Self {
        Self {
            username: update.username.clone().or_else(|| self.username.clone()),
            first_name: update.first_name.clone().or_else(|| self.first_name.clone()),
            last_name: update.last_name.clone().or_else(|| self.last_name.clone()),
            photo_url: update.photo_url.clone().or_else(|| self.photo_url.clone()),
            timezone: update.timezone.clone().or_else(|| self.timezone.clone()),
            notifications_enabled: update.notifications_enabled.or(self.notifications_enabled),
            default_reminder_time: update.default_reminder_time.or(self.default_reminder_time),
        }
    }
}

/// The owner of habits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Platform-assigned id.
    #[serde(rename = "telegram_id")]
    pub id: OwnerId,
    /// Point balance, never negative.
    #[serde(default)]
    pub total_points: u32,
    /// Profile fields.
    #[serde(flatten)]
    pub profile: UserProfile,
}

impl User {
    /// Creates a user with no points and an empty profile.
    #[must_use]
    pub fn new(id: OwnerId) -> Self {
        Self {
            id,
            total_points: 0,
            profile: UserProfile::default(),
        }
    }

    /// Applies a signed point change, flooring the balance at zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use habit_sync::{OwnerId, User};
    ///
    /// let user = User::new(OwnerId::new(1)).with_points_delta(5);
    /// assert_eq!(user.with_points_delta(-12).total_points, 0);
    /// ```
    #[must_use]
    pub fn with_points_delta(self, delta: i64) -> Self {
        let total = (i64::from(self.total_points) + delta).max(0);
        Self {
            total_points: u32::try_from(total).unwrap_or(u32::MAX),
            ..self
        }
    }
}
