//! Error types for herdgate operations

use thiserror::Error;

/// Boxed error type for caller-supplied compute functions.
///
/// Compute errors are carried as-is so the caller gets back exactly the
/// failure their closure produced, never a cached or rewritten version.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Key-value store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unreachable: {reason}")]
    Connectivity { reason: String },

    #[error("Bad value under key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Wrong value kind for key {key}: expected {expected}")]
    WrongKind { key: String, expected: &'static str },

    #[error("Unexpected pipeline reply: expected {expected}")]
    UnexpectedReply { expected: &'static str },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Caller parameter validation errors.
///
/// These are raised before any store round-trip is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    /// Shorthand for the common invalid-parameter case.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Master error type for all herdgate operations.
#[derive(Debug, Error)]
pub enum HerdgateError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Compute failed: {0}")]
    Compute(#[source] BoxError),
}

impl HerdgateError {
    /// Wrap a caller-supplied compute failure.
    pub fn compute(err: BoxError) -> Self {
        HerdgateError::Compute(err)
    }

    /// Returns true if this error came from the backing store.
    pub fn is_store(&self) -> bool {
        matches!(self, HerdgateError::Store(_))
    }

    /// Returns true if this error came from a caller-supplied compute function.
    pub fn is_compute(&self) -> bool {
        matches!(self, HerdgateError::Compute(_))
    }
}

/// Result type alias for herdgate operations.
pub type HerdgateResult<T> = Result<T, HerdgateError>;

// =============================================================================
// TESTS
// =============================================================================
