//! Offline-first synchronization with the remote document store.
//!
//! Writes go through the repositories in this module: they update the local
//! cache optimistically and append a pending operation. The [`SyncEngine`]
//! replays pending operations against a [`RemoteStore`](crate::remote::RemoteStore)
//! and [`AutoSync`] decides when to do that.

pub mod auto_sync;
pub mod engine;
pub mod meal_sync;
pub mod remote_only;
pub mod shopping_sync;
pub mod status;

pub use auto_sync::{try_auto_sync, AutoSync, Backoff};
pub use engine::{SyncEngine, SyncError, SyncFailure, SyncSummary};
pub use meal_sync::{SyncMealError, SyncMealRepository};
pub use remote_only::RemoteOnly;
pub use shopping_sync::{SyncShoppingError, SyncShoppingRepository};
pub use status::SyncIndicator;
