//! In-memory change feed using tokio broadcast channels.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use super::{ChangeEvent, ChangeFeed, FeedError, FeedMessage, FeedStream};
use crate::domain::OwnerId;

// Tokio rounds broadcast capacities up to a power of two.
const CHANNEL_CAPACITY: usize = 128;

/// Change feed living in the current process.
///
/// A subscriber that falls behind the channel capacity receives
/// [`FeedMessage::Reconnected`] in place of the missed messages, which makes
/// the listener refetch everything.
#[derive(Debug, Default)]
pub struct MemoryChangeFeed {
    channels: Mutex<HashMap<OwnerId, broadcast::Sender<FeedMessage>>>,
}

impl MemoryChangeFeed {
    /// Creates a feed with no channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, owner: OwnerId) -> broadcast::Sender<FeedMessage> {
        self.channels
            .lock()
            .entry(owner)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Announces a change to every subscriber of `owner`.
    pub fn publish(&self, owner: OwnerId, event: ChangeEvent) {
        // No subscribers is fine.
        let _ = self.channel(owner).send(FeedMessage::Change(event));
    }

    /// Simulates a reconnect of every subscriber of `owner`.
    pub fn reconnect(&self, owner: OwnerId) {
        let _ = self.channel(owner).send(FeedMessage::Reconnected);
    }

    /// Number of open streams for `owner`.
    #[must_use]
    pub fn subscriber_count(&self, owner: OwnerId) -> usize {
        self.channels
            .lock()
            .get(&owner)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn subscribe(&self, owner: OwnerId) -> Result<FeedStream, FeedError> {
        let receiver = self.channel(owner).subscribe();
        let stream = BroadcastStream::new(receiver)
            .map(|result| result.unwrap_or(FeedMessage::Reconnected));
        Ok(Box::pin(stream))
    }
}
