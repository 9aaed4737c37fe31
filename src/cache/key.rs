//! Cache keys.

use std::fmt;

use crate::domain::OwnerId;

/// Kind of entity stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// The full habit list of an owner.
    HabitList,
    /// The owner's user record.
    User,
}

/// Logical key of a cache entry: entity kind plus owner.
///
/// Owners are isolated from each other only through this namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Habit list of an owner.
    HabitList(OwnerId),
    /// User record of an owner.
    User(OwnerId),
}

impl CacheKey {
    /// Both keys belonging to `owner`.
    #[must_use]
    pub const fn for_owner(owner: OwnerId) -> [Self; 2] {
        [Self::HabitList(owner), Self::User(owner)]
    }

    /// The entity kind.
    #[must_use]
    pub const fn kind(self) -> EntityKind {
        match self {
            Self::HabitList(_) => EntityKind::HabitList,
            Self::User(_) => EntityKind::User,
        }
    }

    /// The owner.
    #[must_use]
    pub const fn owner(self) -> OwnerId {
        match self {
            Self::HabitList(owner) | Self::User(owner) => owner,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HabitList(owner) => write!(formatter, "habits:{owner}"),
            Self::User(owner) => write!(formatter, "user:{owner}"),
        }
    }
}
