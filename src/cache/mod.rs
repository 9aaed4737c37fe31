//! Client-side cache of habits and users.
//!
//! - [`CacheStore`]: the keyed table with snapshot/restore and invalidation
//! - [`CacheKey`]: entity kind plus owner
//! - [`LocalMirror`]: warm start from device storage

mod key;
pub mod mirror;
mod store;

pub use key::{CacheKey, EntityKind};
pub use mirror::{LocalMirror, LocalStorage, MemoryStorage, MirrorError};
pub use store::{CacheChange, CacheEvent, CacheStore, CacheValue, Snapshot};
