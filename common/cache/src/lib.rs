//! Cache engine shared by services that front a relational store with Redis
//!
//! - [`ReadThroughCache`]: pass-through caching with an absent-record sentinel, an optional
//!   in-process [`NegativeCache`], and a mutex-guarded variant for expensive loads
//! - [`LogicalExpireCache`]: stale-while-rebuild reads over [`SnapshotEnvelope`]s for
//!   pre-warmed hot keys, rebuilt on a bounded [`RebuildDispatcher`]
//! - [`KeyedMutexLock`]: the `SET NX EX` lock both of the above use
//!
//! Every read reports a [`CacheSource`] alongside the value so callers and metrics can tell
//! hits, sentinels, loads and stale reads apart.

pub mod dispatcher;
pub mod envelope;
pub mod lock;
pub mod logical_expire;
pub mod metrics;
pub mod negative_cache;
pub mod read_through;
pub mod types;

pub use dispatcher::{RebuildDispatcher, RebuildSlot};
pub use envelope::SnapshotEnvelope;
pub use lock::KeyedMutexLock;
pub use logical_expire::LogicalExpireCache;
pub use metrics::RebuildOutcome;
pub use negative_cache::NegativeCache;
pub use read_through::ReadThroughCache;
pub use types::{CacheConfig, CacheError, CacheResult, CacheSource, LogicalExpireConfig};
