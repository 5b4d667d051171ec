//! herdgate store - the key-value capability the coordination layer rides on.
//!
//! This crate defines the narrow [`KeyValueStore`] trait (get, conditional
//! set, delete, increment, expire, sorted-set primitives, key scanning) plus
//! an atomic [`Pipeline`] batch executor, and ships an in-memory reference
//! backend with real TTL semantics.
//!
//! Backends for networked stores (Redis and friends) implement the same
//! trait; the coordination layer never sees anything wider than it.

pub mod memory;
pub mod pipeline;
pub mod store;

pub use memory::MemoryStore;
pub use pipeline::{Command, Pipeline, Reply, SetOptions};
pub use store::KeyValueStore;
