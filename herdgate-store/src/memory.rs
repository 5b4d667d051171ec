//! In-memory store backend.
//!
//! Reference implementation of [`KeyValueStore`] with real TTL semantics,
//! used by tests and by embedded single-process deployments. Expiry is lazy:
//! an expired entry is dropped the next time any operation touches its key.
//!
//! Atomicity comes from holding one write guard for the whole batch, which
//! is exactly the contract networked backends provide via MULTI/EXEC.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use herdgate_core::StoreError;

use crate::pipeline::{Command, Pipeline, Reply, SetOptions};
use crate::store::KeyValueStore;

/// What a key holds. Operations against the wrong kind fail the way a
/// networked store would answer WRONGTYPE.
#[derive(Debug, Clone)]
enum ValueKind {
    Text(String),
    SortedSet(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: ValueKind,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory key-value store with TTL, sorted sets, and atomic pipelines.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all stored data.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries.write().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Drop the entry for `key` if it has expired.
fn purge(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
}

fn cmd_get(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Result<Reply, StoreError> {
    purge(entries, key, now);
    match entries.get(key) {
        None => Ok(Reply::Value(None)),
        Some(Entry {
            value: ValueKind::Text(s),
            ..
        }) => Ok(Reply::Value(Some(s.clone()))),
        Some(_) => Err(StoreError::WrongKind {
            key: key.to_string(),
            expected: "text",
        }),
    }
}

fn cmd_set(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    value: &str,
    options: &SetOptions,
    now: Instant,
) -> Result<Reply, StoreError> {
    purge(entries, key, now);
    let exists = entries.contains_key(key);
    if (options.if_not_exists && exists) || (options.if_exists && !exists) {
        return Ok(Reply::Bool(false));
    }
    entries.insert(
        key.to_string(),
        Entry {
            value: ValueKind::Text(value.to_string()),
            expires_at: options.ttl.map(|ttl| now + ttl),
        },
    );
    Ok(Reply::Bool(true))
}

fn cmd_delete(
    entries: &mut HashMap<String, Entry>,
    keys: &[&str],
    now: Instant,
) -> Result<Reply, StoreError> {
    let mut removed = 0u64;
    for key in keys {
        purge(entries, key, now);
        if entries.remove(*key).is_some() {
            removed += 1;
        }
    }
    Ok(Reply::Count(removed))
}

fn cmd_incr(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    by: i64,
    now: Instant,
) -> Result<Reply, StoreError> {
    purge(entries, key, now);
    match entries.get_mut(key) {
        None => {
            entries.insert(
                key.to_string(),
                Entry {
                    value: ValueKind::Text(by.to_string()),
                    expires_at: None,
                },
            );
            Ok(Reply::Int(by))
        }
        Some(Entry {
            value: ValueKind::Text(s),
            ..
        }) => {
            let current: i64 = s.parse().map_err(|_| StoreError::WrongKind {
                key: key.to_string(),
                expected: "integer",
            })?;
            let next = current + by;
            *s = next.to_string();
            Ok(Reply::Int(next))
        }
        Some(_) => Err(StoreError::WrongKind {
            key: key.to_string(),
            expected: "integer",
        }),
    }
}

fn cmd_expire(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    ttl: Duration,
    now: Instant,
) -> Result<Reply, StoreError> {
    purge(entries, key, now);
    match entries.get_mut(key) {
        None => Ok(Reply::Bool(false)),
        Some(entry) => {
            entry.expires_at = Some(now + ttl);
            Ok(Reply::Bool(true))
        }
    }
}

fn cmd_zadd(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    member: &str,
    score: f64,
    now: Instant,
) -> Result<Reply, StoreError> {
    purge(entries, key, now);
    match entries.get_mut(key) {
        None => {
            let mut members = HashMap::new();
            members.insert(member.to_string(), score);
            entries.insert(
                key.to_string(),
                Entry {
                    value: ValueKind::SortedSet(members),
                    expires_at: None,
                },
            );
            Ok(Reply::Count(1))
        }
        Some(Entry {
            value: ValueKind::SortedSet(members),
            ..
        }) => {
            let added = members.insert(member.to_string(), score).is_none();
            Ok(Reply::Count(u64::from(added)))
        }
        Some(_) => Err(StoreError::WrongKind {
            key: key.to_string(),
            expected: "sorted set",
        }),
    }
}

fn cmd_zcard(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Result<Reply, StoreError> {
    purge(entries, key, now);
    match entries.get(key) {
        None => Ok(Reply::Count(0)),
        Some(Entry {
            value: ValueKind::SortedSet(members),
            ..
        }) => Ok(Reply::Count(members.len() as u64)),
        Some(_) => Err(StoreError::WrongKind {
            key: key.to_string(),
            expected: "sorted set",
        }),
    }
}

fn cmd_zrem_range_by_score(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    min: f64,
    max: f64,
    now: Instant,
) -> Result<Reply, StoreError> {
    purge(entries, key, now);
    match entries.get_mut(key) {
        None => Ok(Reply::Count(0)),
        Some(Entry {
            value: ValueKind::SortedSet(members),
            ..
        }) => {
            let before = members.len();
            members.retain(|_, score| *score < min || *score > max);
            let removed = (before - members.len()) as u64;
            // An emptied set disappears, as it does in Redis.
            if members.is_empty() {
                entries.remove(key);
            }
            Ok(Reply::Count(removed))
        }
        Some(_) => Err(StoreError::WrongKind {
            key: key.to_string(),
            expected: "sorted set",
        }),
    }
}

fn apply(
    entries: &mut HashMap<String, Entry>,
    command: &Command,
    now: Instant,
) -> Result<Reply, StoreError> {
    match command {
        Command::Get { key } => cmd_get(entries, key, now),
        Command::Set {
            key,
            value,
            options,
        } => cmd_set(entries, key, value, options, now),
        Command::Delete { keys } => {
            let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            cmd_delete(entries, &refs, now)
        }
        Command::Incr { key, by } => cmd_incr(entries, key, *by, now),
        Command::Expire { key, ttl } => cmd_expire(entries, key, *ttl, now),
        Command::ZAdd { key, member, score } => cmd_zadd(entries, key, member, *score, now),
        Command::ZCard { key } => cmd_zcard(entries, key, now),
        Command::ZRemRangeByScore { key, min, max } => {
            cmd_zrem_range_by_score(entries, key, *min, *max, now)
        }
    }
}

/// Match `input` against a pattern where `*` matches any run of characters.
fn glob_match(pattern: &str, input: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    let Some(mut rest) = input.strip_prefix(first) else {
        return false;
    };
    let remaining: Vec<&str> = parts.collect();
    if remaining.is_empty() {
        // No wildcard at all: exact match only.
        return rest.is_empty();
    }
    let last_index = remaining.len() - 1;
    for (i, part) in remaining.iter().enumerate() {
        if part.is_empty() {
            // Trailing or doubled '*' matches anything.
            continue;
        }
        if i == last_index {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.write()?;
        cmd_get(&mut entries, key, Instant::now())?.into_value()
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<bool, StoreError> {
        let mut entries = self.write()?;
        cmd_set(&mut entries, key, value, &options, Instant::now())?.as_bool()
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64, StoreError> {
        let mut entries = self.write()?;
        cmd_delete(&mut entries, keys, Instant::now())?.as_count()
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.write()?;
        let now = Instant::now();
        purge(&mut entries, key, now);
        Ok(entries.contains_key(key))
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let mut entries = self.write()?;
        cmd_incr(&mut entries, key, by, Instant::now())?.as_int()
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut entries = self.write()?;
        cmd_expire(&mut entries, key, ttl, Instant::now())?.as_bool()
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut entries = self.write()?;
        let now = Instant::now();
        purge(&mut entries, key, now);
        Ok(entries
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<u64, StoreError> {
        let mut entries = self.write()?;
        cmd_zadd(&mut entries, key, member, score, Instant::now())?.as_count()
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.write()?;
        cmd_zcard(&mut entries, key, Instant::now())?.as_count()
    }

    async fn zrem_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<u64, StoreError> {
        let mut entries = self.write()?;
        cmd_zrem_range_by_score(&mut entries, key, min, max, Instant::now())?.as_count()
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.write()?;
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        let keys: Vec<String> = entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        tracing::debug!(pattern, matched = keys.len(), "scanned keys");
        Ok(keys)
    }

    async fn pipeline(&self, pipeline: Pipeline) -> Result<Vec<Reply>, StoreError> {
        // One guard for the whole batch: nothing interleaves.
        let mut entries = self.write()?;
        let now = Instant::now();
        let commands = pipeline.into_commands();
        let mut replies = Vec::with_capacity(commands.len());
        for command in &commands {
            replies.push(apply(&mut entries, command, now)?);
        }
        tracing::debug!(commands = commands.len(), "executed pipeline");
        Ok(replies)
    }
}
