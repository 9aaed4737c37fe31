//! # habit-sync
//!
//! Client-side cache, optimistic mutation and reconciliation engine for a
//! personal habit tracker.
//!
//! ## Overview
//!
//! A client keeps a cache of habits and user points that has three sources of
//! truth: local actions applied before the server confirms them, the server's
//! authoritative responses, and push notifications about changes made from
//! other sessions. This crate keeps them consistent:
//!
//! - **Streak Calculator** ([`streak`]): pure derivation of the current streak,
//!   shared by the client and the server
//! - **Cache Store** ([`cache`]): keyed in-memory table with snapshot, restore
//!   and invalidation
//! - **Server Gateway** ([`gateway`]): request/response contract of the remote
//!   service
//! - **Mutation Engine** ([`engine`]): snapshot, optimistic write, request,
//!   commit or roll back
//! - **Reconciliation Listener** ([`reconcile`]): push-driven refetch that
//!   always supersedes optimistic state
//!
//! ## Feature Flags
//!
//! - `http`: [`gateway::HttpGateway`], a `reqwest` based gateway (default)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use habit_sync::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = Arc::new(FixedClock::new(Day::from_ymd(2025, 1, 7).unwrap()));
//! let gateway = Arc::new(InMemoryGateway::new(clock.clone()));
//! let store = Arc::new(CacheStore::new());
//! let engine = MutationEngine::new(store.clone(), gateway, clock);
//!
//! let owner = OwnerId::new(42);
//! let habit = engine
//!     .create_habit(NewHabit::new(owner, "Morning run", Category::Sport))
//!     .await?;
//!
//! let receipt = engine
//!     .toggle_completion(&habit.id, Day::from_ymd(2025, 1, 7).unwrap(), owner)
//!     .await?;
//! assert_eq!(receipt.points_delta, 10);
//! assert_eq!(store.habit(owner, &habit.id).unwrap().streak, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports the types needed to wire an engine and a listener together.
///
/// # Usage
///
/// ```rust
/// use habit_sync::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cache::{
        CacheChange, CacheEvent, CacheKey, CacheStore, CacheValue, LocalMirror, LocalStorage,
        MemoryStorage, Snapshot,
    };
    pub use crate::config::EngineConfig;
    pub use crate::domain::*;
    pub use crate::engine::{MutationEngine, MutationError, MutationState, ToggleReceipt};
    pub use crate::engine::refresh::{ReconciliationFetchError, RefreshOutcome, Refresher};
    pub use crate::feed::{
        ChangeEvent, ChangeFeed, ChangeKind, FeedMessage, MemoryChangeFeed, Table,
    };
    pub use crate::gateway::{GatewayError, InMemoryGateway, Operation, ServerGateway};
    pub use crate::reconcile::{ListenerConfig, ReconciliationListener, Subscription};
    pub use crate::stats::{Achievement, HabitStats};
    pub use crate::streak::compute_streak;
}

pub mod cache;
pub mod config;
pub mod domain;
pub mod engine;
pub mod feed;
pub mod gateway;
pub mod reconcile;
pub mod stats;
pub mod streak;

pub use cache::{CacheKey, CacheStore, CacheValue};
pub use domain::{Category, Day, Habit, HabitId, OwnerId, User};
pub use engine::{MutationEngine, MutationError};
pub use reconcile::{ReconciliationListener, Subscription};
pub use streak::compute_streak;
