//! Calendar day value object.
//!
//! A [`Day`] is a date without time or timezone, written on the wire as
//! `YYYY-MM-DD`. Owner-local timezones are not enforced: the client and the
//! server both treat the string as the authoritative calendar day.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Error returned when a string is not a `YYYY-MM-DD` calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid calendar day '{input}': expected YYYY-MM-DD")]
pub struct DayParseError {
    /// The rejected input.
    pub input: String,
}

/// A calendar day.
///
/// Ordering follows the calendar, so the most recent day is the greatest.
///
/// # Examples
///
/// ```rust
/// use habit_sync::Day;
///
/// let day: Day = "2025-01-07".parse().unwrap();
/// assert_eq!(day.previous().to_string(), "2025-01-06");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Day(NaiveDate);

impl Day {
    /// Wraps an existing date.
    #[must_use]
    pub const fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Builds a day from its components, `None` if the date does not exist.
    #[must_use]
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Parses a `YYYY-MM-DD` string.
    ///
    /// # Errors
    ///
    /// Returns [`DayParseError`] if the input is not a valid calendar day.
    pub fn parse(input: &str) -> Result<Self, DayParseError> {
        NaiveDate::parse_from_str(input.trim(), DAY_FORMAT)
            .map(Self)
            .map_err(|_| DayParseError {
                input: input.to_string(),
            })
    }

    /// Returns the underlying date.
    #[must_use]
    pub const fn date(self) -> NaiveDate {
        self.0
    }

    /// Returns the day before this one.
    ///
    /// Saturates at the earliest representable date.
    #[must_use]
    pub fn previous(self) -> Self {
        self.0.pred_opt().map_or(self, Self)
    }

    /// Returns the day `count` days earlier, saturating at the earliest date.
    #[must_use]
    pub fn days_before(self, count: u32) -> Self {
        (0..count).fold(self, |day, _| day.previous())
    }
}

impl fmt::Display for Day {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0.format(DAY_FORMAT))
    }
}

impl FromStr for Day {
    type Err = DayParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl TryFrom<String> for Day {
    type Error = DayParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Day> for String {
    fn from(day: Day) -> Self {
        day.to_string()
    }
}

impl From<NaiveDate> for Day {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}
