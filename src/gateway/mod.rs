//! Request/response interface to the remote service.
//!
//! [`ServerGateway`] is the only suspension point of a mutation. Two
//! implementations are provided:
//!
//! - [`HttpGateway`]: JSON over HTTP (feature `http`)
//! - [`InMemoryGateway`]: an authoritative server kept in process memory

#[cfg(feature = "http")]
mod http;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    Habit, HabitEdit, HabitId, NewHabit, OwnerId, ReminderUpdate, ToggleCompletion,
    ToggleResponse, UpsertUser, User,
};

#[cfg(feature = "http")]
pub use http::HttpGateway;
pub use memory::{InMemoryGateway, Operation};

/// Failure of a gateway call. Every variant requires a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The request never produced a response.
    #[error("network error: {message}")]
    Network {
        /// Transport error description.
        message: String,
    },
    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// The `error` field of the body, or the raw body.
        message: String,
    },
    /// A success response could not be decoded.
    #[error("malformed response: {message}")]
    Decode {
        /// Decoder error description.
        message: String,
    },
}

impl GatewayError {
    /// Builds a [`GatewayError::Server`].
    #[must_use]
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Returns the HTTP status for server errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::Network { .. } | Self::Decode { .. } => None,
        }
    }
}

/// Remote service operations.
///
/// Each method maps to one HTTP route:
///
/// | Method | Route |
/// |---|---|
/// | `list_habits` | `GET /api/habits?telegram_id=` |
/// | `create_habit` | `POST /api/habits` |
/// | `toggle_completion` | `PATCH /api/habits` |
/// | `edit_habit` | `PUT /api/habits` |
/// | `update_reminder` | `PATCH /api/habits/reminder` |
/// | `delete_habit` | `DELETE /api/habits?habit_id=` |
/// | `upsert_user` | `POST /api/user` |
#[async_trait]
pub trait ServerGateway: Send + Sync {
    /// Lists the habits of `owner`, newest first.
    async fn list_habits(&self, owner: OwnerId) -> Result<Vec<Habit>, GatewayError>;

    /// Creates a habit and returns it with its server id.
    async fn create_habit(&self, draft: &NewHabit) -> Result<Habit, GatewayError>;

    /// Flips the completion of a day; the server adjusts the owner's points.
    async fn toggle_completion(
        &self,
        request: &ToggleCompletion,
    ) -> Result<ToggleResponse, GatewayError>;

    /// Changes display metadata.
    async fn edit_habit(&self, edit: &HabitEdit) -> Result<Habit, GatewayError>;

    /// Changes reminder settings.
    async fn update_reminder(&self, update: &ReminderUpdate) -> Result<Habit, GatewayError>;

    /// Deletes a habit.
    async fn delete_habit(&self, habit_id: &HabitId) -> Result<(), GatewayError>;

    /// Creates or refreshes the user record and returns it.
    async fn upsert_user(&self, request: &UpsertUser) -> Result<User, GatewayError>;
}
