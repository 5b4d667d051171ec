//! Get-or-compute caching with an advisory lock.
//!
//! The coordinator implements cache-aside: read first, compute on miss,
//! write back. A TTL'd `<key>:lock` sentinel, acquired with
//! set-if-not-exists, serializes concurrent computation for the same key.
//! A caller that loses the lock race re-reads once and then computes anyway
//! rather than waiting - worst-case latency stays bounded at one compute,
//! at the cost of occasional duplicate work under heavy contention.
//!
//! Error policy is asymmetric on purpose: store failures on the read and
//! write paths degrade to compute-and-return (the cache must never be the
//! reason a correct computation fails), while compute failures always
//! propagate (a caching failure must never hide an incorrect computation).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use herdgate_core::{BoxError, HerdgateError, HerdgateResult, ValidationError};
use herdgate_store::{KeyValueStore, SetOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Value stored under the lock key. The content is never inspected; only
/// the key's existence matters.
const LOCK_SENTINEL: &str = "1";

/// Configuration for the cache coordinator.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lock TTL used when a get-or-compute call specifies no entry TTL.
    /// The lock is never created without an expiry; this is the leak
    /// safety net if cleanup is skipped by a crash.
    pub default_lock_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_lock_ttl: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback lock TTL.
    pub fn with_default_lock_ttl(mut self, ttl: Duration) -> Self {
        self.default_lock_ttl = ttl;
        self
    }
}

/// Cache-aside coordinator over a shared key-value store.
///
/// Holds no state of its own - all coordination lives in the store, so any
/// number of processes pointing at the same store cooperate.
pub struct CacheCoordinator<S> {
    store: Arc<S>,
    config: CacheConfig,
}

impl<S: KeyValueStore> CacheCoordinator<S> {
    /// Create a coordinator with default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, CacheConfig::default())
    }

    /// Create a coordinator with explicit configuration.
    pub fn with_config(store: Arc<S>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// Access the underlying store handle.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Access the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached value under `key`, or compute, cache, and return it.
    ///
    /// On a miss the advisory lock is taken for the duration of the compute;
    /// see the module docs for the race and failure semantics. `ttl` applies
    /// to both the cached entry and the lock; when `None`, the entry is
    /// persistent and the lock falls back to the configured default TTL.
    ///
    /// The compute closure's error propagates verbatim as
    /// [`HerdgateError::Compute`]; nothing is cached in that case.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        compute: F,
        ttl: Option<Duration>,
    ) -> HerdgateResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        self.fill(key, compute, ttl, true, None).await
    }

    /// Delete the entry under `key`, returning how many keys were removed.
    pub async fn invalidate(&self, key: &str) -> HerdgateResult<u64> {
        let deleted = self.store.delete(&[key]).await?;
        tracing::debug!(key, deleted, "invalidated cache entry");
        Ok(deleted)
    }

    /// Shared fill path behind [`get_or_compute`] and [`CachedFunction`].
    ///
    /// `use_lock` toggles the advisory-lock protocol; `skip_cache_if` lets a
    /// wrapper veto the write-back after inspecting the computed value.
    ///
    /// [`get_or_compute`]: CacheCoordinator::get_or_compute
    /// [`CachedFunction`]: crate::CachedFunction
    pub(crate) async fn fill<T, F, Fut>(
        &self,
        key: &str,
        compute: F,
        ttl: Option<Duration>,
        use_lock: bool,
        skip_cache_if: Option<&(dyn Fn(&T) -> bool + Send + Sync)>,
    ) -> HerdgateResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        if key.is_empty() {
            return Err(ValidationError::invalid("key", "must not be empty").into());
        }

        if let Some(value) = self.read_entry::<T>(key).await {
            return Ok(value);
        }

        let lock_key = format!("{key}:lock");
        if use_lock {
            let lock_ttl = ttl.unwrap_or(self.config.default_lock_ttl);
            let lock_options = SetOptions::new().with_ttl(lock_ttl).if_not_exists();
            match self.store.set(&lock_key, LOCK_SENTINEL, lock_options).await {
                Ok(true) => {
                    tracing::debug!(key, "acquired compute lock");
                }
                Ok(false) => {
                    // Someone else is computing; one immediate retry, then
                    // compute anyway rather than blocking.
                    tracing::debug!(key, "compute lock held elsewhere, retrying read");
                    if let Some(value) = self.read_entry::<T>(key).await {
                        return Ok(value);
                    }
                }
                Err(err) => {
                    tracing::warn!(key, error = %err, "lock acquisition failed, computing unlocked");
                }
            }
        }

        let value = match compute().await {
            Ok(value) => value,
            Err(err) => {
                if use_lock {
                    self.release_lock(&lock_key).await;
                }
                return Err(HerdgateError::Compute(err));
            }
        };

        if skip_cache_if.is_some_and(|skip| skip(&value)) {
            tracing::debug!(key, "result vetoed by skip condition, not cached");
        } else {
            self.write_entry(key, &value, ttl).await;
        }

        if use_lock {
            self.release_lock(&lock_key).await;
        }
        Ok(value)
    }

    /// Read and deserialize an entry. Store and deserialize failures both
    /// degrade to a miss so a dead store or one corrupt entry cannot wedge
    /// the caller.
    async fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    tracing::debug!(key, "cache hit");
                    Some(value)
                }
                Err(err) => {
                    tracing::warn!(key, error = %err, "cached value failed to deserialize, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Serialize and write an entry. Failures are logged and swallowed; the
    /// computed value is still returned to the caller.
    async fn write_entry<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to serialize result, not cached");
                return;
            }
        };
        match self
            .store
            .set(key, &json, SetOptions::new().with_ttl_opt(ttl))
            .await
        {
            Ok(_) => tracing::debug!(key, ?ttl, "cached computed value"),
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to cache result");
            }
        }
    }

    /// Best-effort lock cleanup. A failure here is survivable: the lock's
    /// own TTL reclaims it.
    async fn release_lock(&self, lock_key: &str) {
        if let Err(err) = self.store.delete(&[lock_key]).await {
            tracing::warn!(lock_key, error = %err, "failed to release compute lock, TTL will reclaim it");
        }
    }
}

impl<S> Clone for CacheCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}
