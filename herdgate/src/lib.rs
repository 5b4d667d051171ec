//! herdgate - coordination primitives over a shared key-value store.
//!
//! Two independent consumers of the same [`KeyValueStore`]:
//!
//! - [`RateLimiter`]: admit/reject decisions per key within a time window,
//!   in sliding-window (sorted set) and fixed-window (counter) variants.
//! - [`CacheCoordinator`]: get-or-compute memoization with an advisory lock
//!   that keeps concurrent callers from recomputing the same value, plus the
//!   [`CachedFunction`] wrapper that derives deterministic cache keys from a
//!   function identity and its arguments and exposes targeted and bulk
//!   invalidation.
//!
//! Neither component holds state outside the store: concurrency comes
//! entirely from independent callers racing on the same keys, and every
//! coordination decision is a store round-trip.
//!
//! [`KeyValueStore`]: herdgate_store::KeyValueStore

pub mod cache;
pub mod cached_fn;
pub mod key;
pub mod limiter;

pub use cache::{CacheConfig, CacheCoordinator};
pub use cached_fn::{CachedFunction, CachedFunctionBuilder};
pub use key::{CacheKeyBuilder, KeySegments, MixedArgs, NamedArgs};
pub use limiter::{RateDecision, RateLimiter, Window};

// Re-export the foundation so consumers depend on one crate.
pub use herdgate_core::{BoxError, HerdgateError, HerdgateResult, StoreError, ValidationError};
pub use herdgate_store::{KeyValueStore, MemoryStore, Pipeline, Reply, SetOptions};
