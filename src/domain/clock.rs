//! Injectable source of the current day.
//!
//! Streaks depend on `today`, so every component that derives one asks a
//! [`Clock`] instead of reading the system time directly.

use chrono::{DateTime, Local, NaiveTime, Utc};
use parking_lot::Mutex;

use super::Day;

/// Source of the current day and instant.
pub trait Clock: Send + Sync {
    /// The current calendar day.
    fn today(&self) -> Day;

    /// The current instant, used for creation timestamps.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time; `today` uses the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> Day {
        Day::from_date(Local::now().date_naive())
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a given day, for tests and replays.
///
/// `now` returns midnight UTC of the pinned day.
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<Day>,
}

impl FixedClock {
    /// Creates a clock pinned to `today`.
    #[must_use]
    pub fn new(today: Day) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    /// Moves the clock to another day.
    pub fn set_today(&self, today: Day) {
        *self.today.lock() = today;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> Day {
        *self.today.lock()
    }

    fn now(&self) -> DateTime<Utc> {
        self.today().date().and_time(NaiveTime::MIN).and_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn fixed_clock_reports_pinned_day() {
        let clock = FixedClock::new(Day::from_ymd(2025, 1, 7).unwrap());

        assert_eq!(clock.today(), Day::from_ymd(2025, 1, 7).unwrap());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-07T00:00:00+00:00");

        clock.set_today(Day::from_ymd(2025, 1, 8).unwrap());
        assert_eq!(clock.today(), Day::from_ymd(2025, 1, 8).unwrap());
    }
}
