//! End-to-end coordination scenarios over a shared store: rate limiting
//! across window boundaries, cache fills observed by independent
//! coordinators, and degradation when the store misbehaves.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use herdgate::{
    BoxError, CacheCoordinator, CachedFunctionBuilder, HerdgateError, KeyValueStore, MemoryStore,
    Pipeline, RateLimiter, Reply, SetOptions, StoreError, Window,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Test store: delegates to MemoryStore, with failure toggles and the ability
// to script `get` responses.
// ============================================================================

#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_gets: AtomicBool,
    fail_sets: AtomicBool,
    fail_pipelines: AtomicBool,
    scripted_gets: Mutex<VecDeque<Option<String>>>,
}

impl FlakyStore {
    fn new() -> Self {
        Self::default()
    }

    fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    fn fail_pipelines(&self, fail: bool) {
        self.fail_pipelines.store(fail, Ordering::SeqCst);
    }

    /// Queue responses that `get` returns before falling back to the real
    /// store.
    fn script_gets(&self, responses: impl IntoIterator<Item = Option<String>>) {
        self.scripted_gets.lock().unwrap().extend(responses);
    }

    fn connectivity() -> StoreError {
        StoreError::Connectivity {
            reason: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(Self::connectivity());
        }
        if let Some(scripted) = self.scripted_gets.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<bool, StoreError> {
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(Self::connectivity());
        }
        self.inner.set(key, value, options).await
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64, StoreError> {
        self.inner.delete(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        if self.fail_pipelines.load(Ordering::SeqCst) {
            return Err(Self::connectivity());
        }
        self.inner.incr(key, by).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.inner.ttl(key).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<u64, StoreError> {
        self.inner.zadd(key, member, score).await
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        self.inner.zcard(key).await
    }

    async fn zrem_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<u64, StoreError> {
        self.inner.zrem_range_by_score(key, min, max).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.inner.scan_keys(pattern).await
    }

    async fn pipeline(&self, pipeline: Pipeline) -> Result<Vec<Reply>, StoreError> {
        if self.fail_pipelines.load(Ordering::SeqCst) {
            return Err(Self::connectivity());
        }
        self.inner.pipeline(pipeline).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    result: String,
}

fn payload(result: &str) -> Payload {
    Payload {
        result: result.to_string(),
    }
}

// ============================================================================
// Rate limiting across the window boundary
// ============================================================================

#[tokio::test]
async fn test_sliding_window_recovers_after_window_elapses() {
    let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));

    for expected_remaining in (0..5).rev() {
        let decision = limiter
            .check("user:42:api", 5, 2, Window::Sliding)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, expected_remaining);
    }

    let sixth = limiter
        .check("user:42:api", 5, 2, Window::Sliding)
        .await
        .unwrap();
    assert!(!sixth.allowed);
    assert_eq!(sixth.remaining, 0);

    // All recorded timestamps (the rejected one included) age out of the
    // 2-second window, so the budget is whole again.
    tokio::time::sleep(Duration::from_millis(2100)).await;
    let decision = limiter
        .check("user:42:api", 5, 2, Window::Sliding)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 4);
}

#[tokio::test]
async fn test_fixed_window_counter_expires_with_window() {
    let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));

    for _ in 0..2 {
        limiter.check("ip:10.0.0.1", 2, 1, Window::Fixed).await.unwrap();
    }
    let rejected = limiter.check("ip:10.0.0.1", 2, 1, Window::Fixed).await.unwrap();
    assert!(!rejected.allowed);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let fresh = limiter.check("ip:10.0.0.1", 2, 1, Window::Fixed).await.unwrap();
    assert!(fresh.allowed);
    assert_eq!(fresh.current, 1);
}

#[tokio::test]
async fn test_limiter_propagates_store_failure() {
    let store = Arc::new(FlakyStore::new());
    let limiter = RateLimiter::new(Arc::clone(&store));
    store.fail_pipelines(true);

    for window in [Window::Sliding, Window::Fixed] {
        let err = limiter.check("k", 5, 60, window).await.unwrap_err();
        assert!(matches!(err, HerdgateError::Store(_)));
    }
}

// ============================================================================
// Cache fills observed across independent coordinators
// ============================================================================

#[tokio::test]
async fn test_fill_visible_to_second_coordinator() {
    let store = Arc::new(MemoryStore::new());
    let first = CacheCoordinator::new(Arc::clone(&store));
    let second = CacheCoordinator::new(Arc::clone(&store));

    let value: Payload = first
        .get_or_compute(
            "k",
            || async { Ok(payload("v")) },
            Some(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    assert_eq!(value, payload("v"));

    // The entry is plain JSON under the bare key; the lock is gone.
    let raw = store.get("k").await.unwrap().unwrap();
    assert_eq!(raw, r#"{"result":"v"}"#);
    assert!(!store.exists("k:lock").await.unwrap());

    // A different coordinator over the same store hits without computing.
    let computed = AtomicUsize::new(0);
    let value: Payload = second
        .get_or_compute(
            "k",
            || async {
                computed.fetch_add(1, Ordering::SeqCst);
                Ok(payload("should not run"))
            },
            Some(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    assert_eq!(value, payload("v"));
    assert_eq!(computed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_read_failure_degrades_to_compute() {
    let store = Arc::new(FlakyStore::new());
    let coordinator = CacheCoordinator::new(Arc::clone(&store));
    store.fail_gets(true);

    let value: Payload = coordinator
        .get_or_compute(
            "k",
            || async { Ok(payload("fresh")) },
            Some(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    assert_eq!(value, payload("fresh"));

    // The write path still worked, so once reads recover the entry is there.
    store.fail_gets(false);
    let computed = AtomicUsize::new(0);
    let value: Payload = coordinator
        .get_or_compute(
            "k",
            || async {
                computed.fetch_add(1, Ordering::SeqCst);
                Ok(payload("recomputed"))
            },
            Some(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    assert_eq!(value, payload("fresh"));
    assert_eq!(computed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_write_failure_returns_value_uncached() {
    let store = Arc::new(FlakyStore::new());
    let coordinator = CacheCoordinator::new(Arc::clone(&store));
    store.fail_sets(true);

    let value: Payload = coordinator
        .get_or_compute(
            "k",
            || async { Ok(payload("v")) },
            Some(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    assert_eq!(value, payload("v"));

    // Nothing was cached, so the next call computes again.
    store.fail_sets(false);
    let computed = AtomicUsize::new(0);
    let _: Payload = coordinator
        .get_or_compute(
            "k",
            || async {
                computed.fetch_add(1, Ordering::SeqCst);
                Ok(payload("second"))
            },
            Some(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    assert_eq!(computed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_held_lock_reread_returns_other_caller_result() {
    let store = Arc::new(FlakyStore::new());
    let coordinator = CacheCoordinator::new(Arc::clone(&store));

    // Another process holds the lock and finishes its write between our
    // first read (miss) and the post-lock re-read (hit).
    store
        .inner
        .set(
            "k:lock",
            "1",
            SetOptions::new().with_ttl(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    store.script_gets([None, Some(r#"{"result":"from the winner"}"#.to_string())]);

    let computed = AtomicUsize::new(0);
    let value: Payload = coordinator
        .get_or_compute(
            "k",
            || async {
                computed.fetch_add(1, Ordering::SeqCst);
                Ok(payload("should not run"))
            },
            Some(Duration::from_secs(60)),
        )
        .await
        .unwrap();

    assert_eq!(value, payload("from the winner"));
    assert_eq!(computed.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Cached functions over a shared store
// ============================================================================

#[tokio::test]
async fn test_cached_function_shared_across_instances() {
    let store = Arc::new(MemoryStore::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let make = |calls: Arc<AtomicUsize>, store: Arc<MemoryStore>| {
        CachedFunctionBuilder::new(
            CacheCoordinator::new(store),
            "get_profile",
            move |args: (String,)| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(payload(&args.0))
                }
            },
        )
        .namespace("app")
        .key_prefix("profiles")
        .ttl(Duration::from_secs(60))
        .build()
    };

    let a = make(Arc::clone(&calls), Arc::clone(&store));
    let b = make(Arc::clone(&calls), Arc::clone(&store));

    // Identical configuration derives identical keys, so instance `b`
    // hits what instance `a` computed.
    let first = a.call(("alice".to_string(),)).await.unwrap();
    let second = b.call(("alice".to_string(),)).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(store.exists("app:profiles:get_profile:alice").await.unwrap());

    // Bulk invalidation through either instance clears the shared entry.
    assert_eq!(b.invalidate_all().await.unwrap(), 1);
    a.call(("alice".to_string(),)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
