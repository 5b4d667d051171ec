//! Function-level caching.
//!
//! [`CachedFunction`] wraps an async callable with the cache-aside protocol:
//! calls derive a deterministic key from the function identity and its
//! arguments, and the handle exposes targeted and bulk invalidation built
//! over the same key derivation. This is the builder-object rendition of a
//! memoization decorator: configuration and the wrapped callable live in one
//! struct instead of closures stitched onto a function object.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use herdgate_core::{BoxError, HerdgateResult};
use herdgate_store::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CacheCoordinator;
use crate::key::{CacheKeyBuilder, KeySegments};

/// A cached async function plus its invalidation handles.
///
/// Built via [`CachedFunctionBuilder`]. The wrapped callable takes its
/// arguments by value ([`KeySegments`] covers tuples of serializable values
/// and named-argument maps) and returns `Result<T, BoxError>`.
pub struct CachedFunction<S, A, T, F, Fut> {
    coordinator: CacheCoordinator<S>,
    func: F,
    name: String,
    namespace: Option<String>,
    key_prefix: Option<String>,
    ttl: Option<Duration>,
    skip_cache_if: Option<Box<dyn Fn(&T) -> bool + Send + Sync>>,
    prevent_thundering_herd: bool,
    _args: PhantomData<fn(A) -> Fut>,
}

impl<S, A, T, F, Fut> CachedFunction<S, A, T, F, Fut>
where
    S: KeyValueStore,
    A: KeySegments,
    T: Serialize + DeserializeOwned,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, BoxError>>,
{
    /// Invoke the function through the cache.
    ///
    /// A hit returns the stored value without calling the wrapped function.
    /// A miss computes, optionally under the advisory lock (herd protection),
    /// consults the skip predicate, writes back, and returns the value.
    pub async fn call(&self, args: A) -> HerdgateResult<T> {
        let key = self.derive_key(&args);
        let func = &self.func;
        self.coordinator
            .fill(
                &key,
                move || func(args),
                self.ttl,
                self.prevent_thundering_herd,
                self.skip_cache_if.as_deref(),
            )
            .await
    }

    /// Delete the cached entry for exactly these arguments.
    ///
    /// Returns the number of keys removed (0 or 1).
    pub async fn invalidate(&self, args: &A) -> HerdgateResult<u64> {
        let key = self.derive_key(args);
        self.coordinator.invalidate(&key).await
    }

    /// Delete every cached entry this function has produced, whatever the
    /// arguments. Scans for `namespace:prefix:name*` and deletes the matches
    /// in one batch. Returns the number of keys removed.
    pub async fn invalidate_all(&self) -> HerdgateResult<u64> {
        let pattern = CacheKeyBuilder::invalidation_pattern(
            self.namespace.as_deref(),
            self.key_prefix.as_deref(),
            &self.name,
        );
        let keys = self.coordinator.store().scan_keys(&pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let deleted = self.coordinator.store().delete(&refs).await?;
        tracing::debug!(pattern, deleted, "invalidated all cached entries");
        Ok(deleted)
    }

    /// The key this function derives for the given arguments.
    pub fn derive_key(&self, args: &A) -> String {
        let mut builder = CacheKeyBuilder::new(self.name.clone());
        if let Some(namespace) = &self.namespace {
            builder = builder.with_namespace(namespace.clone());
        }
        if let Some(prefix) = &self.key_prefix {
            builder = builder.with_prefix(prefix.clone());
        }
        args.append_to(&mut builder);
        builder.build()
    }
}

/// Builder for [`CachedFunction`].
pub struct CachedFunctionBuilder<S, A, T, F, Fut> {
    coordinator: CacheCoordinator<S>,
    func: F,
    name: String,
    namespace: Option<String>,
    key_prefix: Option<String>,
    ttl: Option<Duration>,
    skip_cache_if: Option<Box<dyn Fn(&T) -> bool + Send + Sync>>,
    prevent_thundering_herd: bool,
    _args: PhantomData<fn(A) -> Fut>,
}

impl<S, A, T, F, Fut> CachedFunctionBuilder<S, A, T, F, Fut>
where
    S: KeyValueStore,
    A: KeySegments,
    T: Serialize + DeserializeOwned,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, BoxError>>,
{
    /// Start building a cached function. `name` is the function identity
    /// used in key derivation; it must be stable across processes.
    pub fn new(coordinator: CacheCoordinator<S>, name: impl Into<String>, func: F) -> Self {
        Self {
            coordinator,
            func,
            name: name.into(),
            namespace: None,
            key_prefix: None,
            ttl: None,
            skip_cache_if: None,
            prevent_thundering_herd: false,
            _args: PhantomData,
        }
    }

    /// Time-to-live for cached entries (and the herd lock, when enabled).
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Leading namespace segment for derived keys.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Prefix segment between namespace and function name.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Veto caching after a successful compute: if the predicate returns
    /// true the result is returned to the caller but never written to the
    /// store. Useful for empty or error-shaped sentinel results.
    pub fn skip_cache_if(
        mut self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.skip_cache_if = Some(Box::new(predicate));
        self
    }

    /// Serialize concurrent misses for the same key through the advisory
    /// lock. Off by default: a cheap idempotent computation does not need
    /// the extra lock round-trips.
    pub fn prevent_thundering_herd(mut self, enabled: bool) -> Self {
        self.prevent_thundering_herd = enabled;
        self
    }

    /// Finish building.
    pub fn build(self) -> CachedFunction<S, A, T, F, Fut> {
        CachedFunction {
            coordinator: self.coordinator,
            func: self.func,
            name: self.name,
            namespace: self.namespace,
            key_prefix: self.key_prefix,
            ttl: self.ttl,
            skip_cache_if: self.skip_cache_if,
            prevent_thundering_herd: self.prevent_thundering_herd,
            _args: PhantomData,
        }
    }
}
