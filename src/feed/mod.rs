//! Push change feed.
//!
//! The server announces that rows of the `habits` or `users` table changed
//! for an owner. Payloads are never trusted: a message only says *that*
//! something changed, and the reconciliation listener refetches.
//!
//! Implementations:
//! - [`MemoryChangeFeed`]: in-process, tokio broadcast channels

mod memory;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::OwnerId;

pub use memory::MemoryChangeFeed;

/// Table named by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    /// The habit table.
    Habits,
    /// The user table.
    Users,
}

impl fmt::Display for Table {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Habits => "habits",
            Self::Users => "users",
        })
    }
}

/// Kind of row change. Sent upper-case; lower-case is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// A row was inserted.
    #[serde(alias = "insert")]
    Insert,
    /// A row was updated.
    #[serde(alias = "update")]
    Update,
    /// A row was deleted.
    #[serde(alias = "delete")]
    Delete,
}

/// A change notification as sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Changed table.
    pub table: Table,
    /// Kind of change.
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
}

impl ChangeEvent {
    /// Creates an event.
    #[must_use]
    pub const fn new(table: Table, event_type: ChangeKind) -> Self {
        Self { table, event_type }
    }
}

/// One item of a feed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMessage {
    /// A row changed.
    Change(ChangeEvent),
    /// The connection was re-established; changes may have been missed.
    Reconnected,
}

/// Stream of feed messages for one owner.
pub type FeedStream = Pin<Box<dyn Stream<Item = FeedMessage> + Send>>;

/// Error type for feed operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The feed backend could not be reached.
    #[error("change feed unavailable: {message}")]
    Unavailable {
        /// Reason reported by the backend.
        message: String,
    },
}

/// Per-owner push channel.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a stream of change notifications for `owner`.
    ///
    /// The stream ends when the feed shuts down; dropping it unsubscribes.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Unavailable`] when the backend refuses the
    /// subscription.
    async fn subscribe(&self, owner: OwnerId) -> Result<FeedStream, FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn change_events_use_wire_names() {
        let event: ChangeEvent =
            serde_json::from_str(r#"{"table": "habits", "eventType": "UPDATE"}"#).unwrap();

        assert_eq!(event, ChangeEvent::new(Table::Habits, ChangeKind::Update));
    }
}
