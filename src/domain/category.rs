//! Habit categories and their point weights.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The category of a habit.
///
/// Every completion toggled on awards the category's weight in points and
/// every completion toggled off takes it back. Unknown category keys
/// received from the server fall back to [`Category::Other`].
///
/// | Category    | Points |
/// |-------------|--------|
/// | `sport`     | 10     |
/// | `nutrition` | 8      |
/// | `regime`    | 12     |
/// | `other`     | 5      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// Physical activity.
    Sport,
    /// Eating habits.
    Nutrition,
    /// Daily routine and sleep.
    Regime,
    /// Anything else; also the fallback for unknown keys.
    #[default]
    Other,
}

impl Category {
    /// All categories, in display order.
    pub const ALL: [Self; 4] = [Self::Sport, Self::Nutrition, Self::Regime, Self::Other];

    /// Points awarded for one completion.
    #[must_use]
    pub const fn weight(self) -> u32 {
        match self {
            Self::Sport => 10,
            Self::Nutrition => 8,
            Self::Regime => 12,
            Self::Other => 5,
        }
    }

    /// Signed point change for toggling a completion.
    ///
    /// Removing a completion (`was_completed == true`) takes the weight back.
    #[must_use]
    pub fn toggle_delta(self, was_completed: bool) -> i64 {
        let weight = i64::from(self.weight());
        if was_completed { -weight } else { weight }
    }

    /// The wire key of this category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sport => "sport",
            Self::Nutrition => "nutrition",
            Self::Regime => "regime",
            Self::Other => "other",
        }
    }

    /// Looks up a category by wire key, falling back to [`Category::Other`].
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "sport" => Self::Sport,
            "nutrition" => Self::Nutrition,
            "regime" => Self::Regime,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(key: String) -> Self {
        Self::from_key(&key)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Category::Sport, 10)]
    #[case(Category::Nutrition, 8)]
    #[case(Category::Regime, 12)]
    #[case(Category::Other, 5)]
    fn weights_match_point_table(#[case] category: Category, #[case] expected: u32) {
        assert_eq!(category.weight(), expected);
    }

    #[rstest]
    fn toggle_delta_is_signed_by_previous_state() {
        assert_eq!(Category::Regime.toggle_delta(false), 12);
        assert_eq!(Category::Regime.toggle_delta(true), -12);
    }

    #[rstest]
    #[case("sport", Category::Sport)]
    #[case("regime", Category::Regime)]
    #[case("meditation", Category::Other)]
    #[case("", Category::Other)]
    fn from_key_falls_back_to_other(#[case] key: &str, #[case] expected: Category) {
        assert_eq!(Category::from_key(key), expected);
    }

    #[rstest]
    fn serde_round_trips_known_keys_and_absorbs_unknown_ones() {
        for category in Category::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }

        let unknown: Category = serde_json::from_str("\"yoga\"").unwrap();
        assert_eq!(unknown, Category::Other);
    }
}
