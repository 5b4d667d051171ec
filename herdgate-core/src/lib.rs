//! herdgate core - shared error taxonomy and result types.
//!
//! Every crate in the workspace speaks in terms of [`HerdgateError`] and
//! [`HerdgateResult`]. The store crate produces [`StoreError`]s; the
//! coordination crate adds validation and compute failures on top.

pub mod error;

pub use error::{
    BoxError, HerdgateError, HerdgateResult, StoreError, ValidationError,
};
