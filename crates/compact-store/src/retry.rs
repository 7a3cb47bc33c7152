//! Caller-side retry for batch reads.
//!
//! A batch read may return some keys unprocessed when the store is under
//! load. Those keys are requested again with exponential backoff. This is
//! the only place the engine retries locally: the read is idempotent and
//! single-item, so repeating it cannot disturb consistency.

use std::time::Duration;

use compact_core::ItemKey;

use crate::error::StoreError;
use crate::item::Item;
use crate::store::RecordStore;

/// Backoff schedule for unprocessed batch-read keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first call.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// No sleeping between attempts. For tests and single-process tools.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    /// 3 retries, 100ms doubling, capped at 5s.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Read every key, re-requesting unprocessed keys with backoff.
///
/// Store errors are returned immediately; only unprocessed keys are retried.
///
/// # Errors
///
/// [`StoreError::UnprocessedKeys`] when keys remain after the last retry.
pub fn batch_get_with_retry(
    store: &dyn RecordStore,
    keys: &[ItemKey],
    policy: &RetryPolicy,
) -> Result<Vec<Item>, StoreError> {
    let mut items = Vec::with_capacity(keys.len());
    let mut pending = keys.to_vec();
    let mut attempt: u32 = 0;
    loop {
        let out = store.batch_get_item(&pending)?;
        items.extend(out.items);
        if out.unprocessed.is_empty() {
            return Ok(items);
        }
        if attempt >= policy.max_retries {
            tracing::warn!(
                remaining = out.unprocessed.len(),
                attempts = attempt + 1,
                "batch read gave up with unprocessed keys"
            );
            return Err(StoreError::UnprocessedKeys {
                remaining: out.unprocessed.len(),
                attempts: attempt + 1,
            });
        }
        let delay = policy.delay_for(attempt);
        tracing::debug!(
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            remaining = out.unprocessed.len(),
            "batch read returned unprocessed keys, retrying in {delay:?}"
        );
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        pending = out.unprocessed;
        attempt += 1;
    }
}
