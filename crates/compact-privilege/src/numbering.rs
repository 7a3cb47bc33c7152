//! Privilege numbering service.
//!
//! One counter row per compact, advanced by the store's atomic increment.
//! A claimed number is never returned to the pool: if the issuance that
//! claimed it fails, the number is simply skipped.

use std::sync::Arc;

use compact_core::keys::privilege_counter_key;
use compact_core::CompactCode;
use compact_store::{RecordStore, StoreError};

/// Attribute on the counter row holding the last issued number.
pub const PRIVILEGE_COUNT_ATTRIBUTE: &str = "privilege_count";

/// Issues unique, increasing privilege numbers per compact.
#[derive(Clone)]
pub struct PrivilegeNumberService {
    store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for PrivilegeNumberService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegeNumberService").finish_non_exhaustive()
    }
}

impl PrivilegeNumberService {
    /// Wrap a store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Claim the next number for `compact`. The first claim returns 1.
    ///
    /// Store errors propagate unchanged.
    pub fn claim_number(&self, compact: &CompactCode) -> Result<u64, StoreError> {
        let number = self
            .store
            .increment_counter(&privilege_counter_key(compact), PRIVILEGE_COUNT_ATTRIBUTE)?;
        tracing::debug!(%compact, number, "claimed privilege number");
        Ok(number)
    }
}
