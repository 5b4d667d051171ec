//! Store capability trait.
//!
//! The coordination layer consumes exactly this surface. Implementations are
//! assumed reliable within a single call but may fail with
//! [`StoreError::Connectivity`]; how that propagates is the caller's policy,
//! not the store's.

use std::time::Duration;

use async_trait::async_trait;
use herdgate_core::StoreError;

use crate::pipeline::{Pipeline, Reply, SetOptions};

/// Minimal capability set over a TTL-capable key-value store.
///
/// Every method is a potential suspend point; nothing here spins or sleeps.
/// Implementations must be safe for concurrent use from many tasks.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value for a key, or `None` if absent (or expired).
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, honoring TTL and NX/XX conditions.
    ///
    /// Returns whether the write took effect (a conditional write against the
    /// wrong key state returns `false`, not an error).
    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<bool, StoreError>;

    /// Delete keys, returning how many were actually removed.
    async fn delete(&self, keys: &[&str]) -> Result<u64, StoreError>;

    /// Whether a key currently exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Increment an integer key by `by`, creating it at `by` if absent.
    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError>;

    /// Set or refresh a key's expiry. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining time to live, or `None` if the key is absent or persistent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Add a member to a sorted set with the given score.
    ///
    /// Returns 1 if the member was newly added, 0 if its score was updated.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<u64, StoreError>;

    /// Cardinality of a sorted set (0 for an absent key).
    async fn zcard(&self, key: &str) -> Result<u64, StoreError>;

    /// Remove sorted-set members with scores in `[min, max]`, returning the
    /// number removed.
    async fn zrem_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<u64, StoreError>;

    /// List keys matching a `*` glob pattern.
    ///
    /// Used only by bulk invalidation; not expected to be cheap.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Execute a batch of commands atomically.
    ///
    /// The store guarantees no interleaving of another client's commands
    /// within the batch, and returns one reply per command in submission
    /// order.
    async fn pipeline(&self, pipeline: Pipeline) -> Result<Vec<Reply>, StoreError>;
}
