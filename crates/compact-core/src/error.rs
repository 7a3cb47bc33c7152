//! # Error Types
//!
//! Errors raised while constructing foundational values. Higher crates wrap
//! these in their own `thiserror` enums rather than re-exporting them.

use thiserror::Error;

/// Top-level error type for `compact-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// An identifier failed validation.
    #[error("invalid {kind} {value:?}: {reason}")]
    InvalidIdentifier {
        /// Which identifier namespace was being constructed.
        kind: &'static str,
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A timestamp failed validation.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Canonical serialization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    /// The license-type registry could not be loaded.
    #[error("license type registry error: {0}")]
    Registry(String),
}

impl CoreError {
    pub(crate) fn invalid(kind: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            kind,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
