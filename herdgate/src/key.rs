//! Deterministic cache-key derivation.
//!
//! A cache key is `namespace:prefix:function:arg...:name=value...` - the
//! optional namespace and prefix, the function identity, one segment per
//! positional argument in call order, then named arguments sorted by name.
//! Equal logical arguments must always produce the same key, so composite
//! values are encoded as canonical key-sorted JSON and named arguments are
//! kept in a sorted map regardless of insertion order.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Encode one argument as a key segment.
///
/// Strings encode as themselves, numbers and booleans as their canonical
/// text, and composites as compact JSON with sorted object keys (the
/// default `serde_json` map is ordered, which is what makes this canonical).
pub fn canonical_segment<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        Ok(Value::Number(n)) => n.to_string(),
        Ok(Value::Bool(b)) => b.to_string(),
        Ok(Value::Null) => "null".to_string(),
        Ok(composite) => composite.to_string(),
        // Serialization of a key argument failing is a caller bug; encode it
        // visibly rather than silently colliding.
        Err(_) => "<unserializable>".to_string(),
    }
}

/// Builder for derived cache keys.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyBuilder {
    namespace: Option<String>,
    prefix: Option<String>,
    name: String,
    positional: Vec<String>,
    named: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Start a key for the given function identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the leading namespace segment.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the prefix segment between namespace and function name.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Append a positional argument segment.
    pub fn arg<T: Serialize>(&mut self, value: &T) -> &mut Self {
        self.positional.push(canonical_segment(value));
        self
    }

    /// Record a named argument. Named segments always sort by name in the
    /// final key, so call order here does not matter.
    pub fn named_arg<T: Serialize>(&mut self, name: &str, value: &T) -> &mut Self {
        self.named.insert(name.to_string(), canonical_segment(value));
        self
    }

    /// Produce the final key.
    pub fn build(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(namespace) = &self.namespace {
            parts.push(namespace.clone());
        }
        if let Some(prefix) = &self.prefix {
            parts.push(prefix.clone());
        }
        parts.push(self.name.clone());
        parts.extend(self.positional.iter().cloned());
        for (name, value) in &self.named {
            parts.push(format!("{name}={value}"));
        }
        parts.join(":")
    }

    /// The scan pattern covering every key this function can produce,
    /// regardless of arguments. Used by bulk invalidation.
    pub fn invalidation_pattern(
        namespace: Option<&str>,
        prefix: Option<&str>,
        name: &str,
    ) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(namespace) = namespace {
            parts.push(namespace);
        }
        if let Some(prefix) = prefix {
            parts.push(prefix);
        }
        parts.push(name);
        format!("{}*", parts.join(":"))
    }
}

/// Arguments that know how to append themselves to a key.
///
/// Implemented for tuples of serializable values (positional arguments),
/// for [`NamedArgs`] (named arguments), and for [`MixedArgs`] combining
/// the two.
pub trait KeySegments {
    /// Append this argument set to the builder.
    fn append_to(&self, builder: &mut CacheKeyBuilder);
}

impl KeySegments for () {
    fn append_to(&self, _builder: &mut CacheKeyBuilder) {}
}

macro_rules! impl_key_segments_for_tuple {
    ($($idx:tt : $ty:ident),+) => {
        impl<$($ty: Serialize),+> KeySegments for ($($ty,)+) {
            fn append_to(&self, builder: &mut CacheKeyBuilder) {
                $(builder.arg(&self.$idx);)+
            }
        }
    };
}

impl_key_segments_for_tuple!(0: A);
impl_key_segments_for_tuple!(0: A, 1: B);
impl_key_segments_for_tuple!(0: A, 1: B, 2: C);
impl_key_segments_for_tuple!(0: A, 1: B, 2: C, 3: D);
impl_key_segments_for_tuple!(0: A, 1: B, 2: C, 3: D, 4: E);
impl_key_segments_for_tuple!(0: A, 1: B, 2: C, 3: D, 4: E, 5: F);

/// Named arguments, sorted by name. Insertion order is irrelevant by
/// construction, which is what makes derived keys deterministic.
#[derive(Debug, Clone, Default)]
pub struct NamedArgs(BTreeMap<String, Value>);

impl NamedArgs {
    /// Create an empty set of named arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named argument.
    pub fn set<T: Serialize>(mut self, name: impl Into<String>, value: T) -> Self {
        let encoded = serde_json::to_value(&value).unwrap_or(Value::Null);
        self.0.insert(name.into(), encoded);
        self
    }

    /// Whether no named arguments were recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl KeySegments for NamedArgs {
    fn append_to(&self, builder: &mut CacheKeyBuilder) {
        for (name, value) in &self.0 {
            builder.named_arg(name, value);
        }
    }
}

/// Positional arguments followed by named arguments.
#[derive(Debug, Clone)]
pub struct MixedArgs<P: KeySegments>(pub P, pub NamedArgs);

impl<P: KeySegments> KeySegments for MixedArgs<P> {
    fn append_to(&self, builder: &mut CacheKeyBuilder) {
        self.0.append_to(builder);
        self.1.append_to(builder);
    }
}
