//! Pipeline command and reply model.
//!
//! A [`Pipeline`] is an ordered list of store commands that a backend
//! executes as one atomic batch: no other client's commands interleave, and
//! one [`Reply`] comes back per command in submission order. This is what
//! makes prune-count-add sequences race-free for accounting purposes.

use std::time::Duration;

use herdgate_core::StoreError;

/// Options for a conditional, TTL-capable set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Expiry applied to the key on a successful write.
    pub ttl: Option<Duration>,
    /// Only write if the key does not already exist (NX).
    pub if_not_exists: bool,
    /// Only write if the key already exists (XX).
    pub if_exists: bool,
}

impl SetOptions {
    /// Create empty options: unconditional write, no expiry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an expiry to the written key.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Apply an optional expiry to the written key.
    pub fn with_ttl_opt(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Only write if the key is absent.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Only write if the key is present.
    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }
}

/// A single store command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
        options: SetOptions,
    },
    Delete {
        keys: Vec<String>,
    },
    Incr {
        key: String,
        by: i64,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    ZCard {
        key: String,
    },
    ZRemRangeByScore {
        key: String,
        min: f64,
        max: f64,
    },
}

/// Typed reply to a single pipelined command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Reply to `Get`: the value, or `None` if the key was absent.
    Value(Option<String>),
    /// Reply to `Set` or `Expire`: whether the operation took effect.
    Bool(bool),
    /// Reply to `Incr`: the value after the increment.
    Int(i64),
    /// Reply to `Delete`, `ZAdd`, `ZCard`, `ZRemRangeByScore`: a count.
    Count(u64),
}

impl Reply {
    /// Interpret this reply as a count, failing on a shape mismatch.
    pub fn as_count(&self) -> Result<u64, StoreError> {
        match self {
            Reply::Count(n) => Ok(*n),
            _ => Err(StoreError::UnexpectedReply { expected: "count" }),
        }
    }

    /// Interpret this reply as an increment result.
    pub fn as_int(&self) -> Result<i64, StoreError> {
        match self {
            Reply::Int(n) => Ok(*n),
            _ => Err(StoreError::UnexpectedReply { expected: "integer" }),
        }
    }

    /// Interpret this reply as a boolean outcome.
    pub fn as_bool(&self) -> Result<bool, StoreError> {
        match self {
            Reply::Bool(b) => Ok(*b),
            _ => Err(StoreError::UnexpectedReply { expected: "boolean" }),
        }
    }

    /// Interpret this reply as an optional value.
    pub fn into_value(self) -> Result<Option<String>, StoreError> {
        match self {
            Reply::Value(v) => Ok(v),
            _ => Err(StoreError::UnexpectedReply { expected: "value" }),
        }
    }
}

/// An ordered batch of commands executed atomically by the store.
///
/// Built with the same vocabulary as the direct [`KeyValueStore`] calls:
///
/// ```ignore
/// let mut pipe = Pipeline::new();
/// pipe.zrem_range_by_score("window", 0.0, cutoff);
/// pipe.zcard("window");
/// pipe.zadd("window", member, now);
/// pipe.expire("window", Duration::from_secs(60));
/// let replies = store.pipeline(pipe).await?;
/// ```
///
/// [`KeyValueStore`]: crate::KeyValueStore
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a read.
    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Get { key: key.into() });
        self
    }

    /// Queue a conditional, TTL-capable write.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        options: SetOptions,
    ) -> &mut Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value: value.into(),
            options,
        });
        self
    }

    /// Queue a multi-key delete.
    pub fn delete(&mut self, keys: Vec<String>) -> &mut Self {
        self.commands.push(Command::Delete { keys });
        self
    }

    /// Queue an increment.
    pub fn incr(&mut self, key: impl Into<String>, by: i64) -> &mut Self {
        self.commands.push(Command::Incr {
            key: key.into(),
            by,
        });
        self
    }

    /// Queue an expiry refresh.
    pub fn expire(&mut self, key: impl Into<String>, ttl: Duration) -> &mut Self {
        self.commands.push(Command::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    /// Queue a sorted-set insert.
    pub fn zadd(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        score: f64,
    ) -> &mut Self {
        self.commands.push(Command::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        });
        self
    }

    /// Queue a sorted-set cardinality read.
    pub fn zcard(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::ZCard { key: key.into() });
        self
    }

    /// Queue a sorted-set prune by score range (inclusive on both ends).
    pub fn zrem_range_by_score(
        &mut self,
        key: impl Into<String>,
        min: f64,
        max: f64,
    ) -> &mut Self {
        self.commands.push(Command::ZRemRangeByScore {
            key: key.into(),
            min,
            max,
        });
        self
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the pipeline holds no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// View the queued commands.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Consume the pipeline, yielding the queued commands.
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}
