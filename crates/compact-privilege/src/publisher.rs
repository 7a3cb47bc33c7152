//! Outbound event publishing.
//!
//! [`EventPublisher`] is the seam to the event bus. [`EventBatchWriter`]
//! splits an arbitrary number of events into bus-sized batches.
//! [`InMemoryEventBus`] records every batch and can be told to fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use compact_state::PrivilegeEvent;
use parking_lot::Mutex;

use crate::error::PublishError;

/// Event bus adapter.
pub trait EventPublisher: Send + Sync {
    /// Publish one batch. The whole batch succeeds or the call fails.
    fn publish_batch(&self, events: &[PrivilegeEvent]) -> Result<(), PublishError>;
}

/// Splits events into batches of at most `batch_size` and publishes them in
/// order. Stops at the first failing batch.
#[derive(Clone)]
pub struct EventBatchWriter {
    publisher: Arc<dyn EventPublisher>,
    batch_size: usize,
}

impl std::fmt::Debug for EventBatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBatchWriter")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl EventBatchWriter {
    /// Wrap a publisher.
    pub fn new(publisher: Arc<dyn EventPublisher>, batch_size: usize) -> Self {
        Self {
            publisher,
            batch_size: batch_size.max(1),
        }
    }

    /// Publish every event. Returns how many were published.
    pub fn write_all(&self, events: &[PrivilegeEvent]) -> Result<usize, PublishError> {
        let mut published = 0;
        for batch in events.chunks(self.batch_size) {
            if let Err(e) = self.publisher.publish_batch(batch) {
                tracing::warn!(
                    published,
                    remaining = events.len() - published,
                    error = %e,
                    "event batch publish failed"
                );
                return Err(e);
            }
            published += batch.len();
        }
        Ok(published)
    }
}

/// Event bus double that keeps every published batch.
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    batches: Mutex<Vec<Vec<PrivilegeEvent>>>,
    failures_remaining: AtomicUsize,
}

impl InMemoryEventBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` publish calls.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Every published event, in order.
    pub fn events(&self) -> Vec<PrivilegeEvent> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Every published batch.
    pub fn batches(&self) -> Vec<Vec<PrivilegeEvent>> {
        self.batches.lock().clone()
    }
}

impl EventPublisher for InMemoryEventBus {
    fn publish_batch(&self, events: &[PrivilegeEvent]) -> Result<(), PublishError> {
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PublishError::Unavailable(
                "injected event bus failure".to_string(),
            ));
        }
        self.batches.lock().push(events.to_vec());
        Ok(())
    }
}
