//! # Canonical Change Digests
//!
//! Privilege-update audit rows are keyed by creation time plus a digest of
//! the change they record. Two serializations of the same change must hash
//! identically, so the digest is computed over RFC 8785 (JCS) bytes: sorted
//! keys, compact separators.
//!
//! `CanonicalBytes` has a private inner field and a single constructor, so
//! nothing can hash a non-canonical serialization by accident.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Bytes produced exclusively by JCS canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Result<Self, CoreError> {
        serde_jcs::to_vec(value)
            .map(Self)
            .map_err(|e| CoreError::Canonicalization(e.to_string()))
    }

    /// Borrow the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex SHA-256 of the canonical bytes.
    pub fn sha256_hex(&self) -> String {
        Sha256::digest(&self.0)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Compute the hex digest that identifies a change in audit-record keys.
pub fn change_digest<T: Serialize + ?Sized>(value: &T) -> Result<String, CoreError> {
    Ok(CanonicalBytes::new(value)?.sha256_hex())
}
