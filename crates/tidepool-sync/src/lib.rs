//! Synchronization layer between collection consumers and a repository.
//!
//! ## Features
//!
//! - **Cache**: process-wide keyed snapshot store with TTL reads
//! - **Subscriptions**: one upstream live stream per key, fanned out to any
//!   number of consumers
//! - **Collection views**: fetch-through-cache consumers with live updates
//!   and a liveness flag that discards late results

pub mod cache;
pub mod collection;
mod config;
pub mod subscription;

pub use cache::{CacheEntryStats, CacheStats, CacheStore};
pub use collection::{CollectionState, CollectionView};
pub use config::{DEFAULT_CACHE_TTL, SyncConfig};
pub use subscription::{FailureCallback, SnapshotCallback, Subscription, SubscriptionManager};
