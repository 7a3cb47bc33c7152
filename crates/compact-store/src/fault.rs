//! Fault-injecting store wrapper.
//!
//! Wraps another [`RecordStore`] and makes chosen calls fail the way a
//! managed store fails under network or throughput trouble. Transaction
//! calls are counted from 1 across the wrapper's lifetime.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use compact_core::ItemKey;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::item::{BatchGetOutput, Item, Mutation, PutCondition, PutOutcome};
use crate::store::RecordStore;

/// A [`RecordStore`] that fails on demand.
#[derive(Debug)]
pub struct FaultInjectingStore<S> {
    inner: S,
    failing_transactions: Mutex<BTreeSet<usize>>,
    fail_transactions_from: Mutex<Option<usize>>,
    deferred_batch_get_rounds: AtomicUsize,
    transaction_calls: AtomicUsize,
    batch_get_calls: AtomicUsize,
}

impl<S: RecordStore> FaultInjectingStore<S> {
    /// Wrap a store with no faults armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_transactions: Mutex::new(BTreeSet::new()),
            fail_transactions_from: Mutex::new(None),
            deferred_batch_get_rounds: AtomicUsize::new(0),
            transaction_calls: AtomicUsize::new(0),
            batch_get_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the `n`th `transact_write` call (1-based).
    pub fn fail_transaction(self, n: usize) -> Self {
        self.failing_transactions.lock().insert(n);
        self
    }

    /// Fail every `transact_write` call from the `n`th onwards (1-based).
    pub fn fail_transactions_from(self, n: usize) -> Self {
        *self.fail_transactions_from.lock() = Some(n);
        self
    }

    /// Return every requested key unprocessed for the next `rounds`
    /// `batch_get_item` calls.
    pub fn defer_batch_gets(self, rounds: usize) -> Self {
        self.deferred_batch_get_rounds.store(rounds, Ordering::SeqCst);
        self
    }

    /// Clear every armed fault.
    pub fn heal(&self) {
        self.failing_transactions.lock().clear();
        *self.fail_transactions_from.lock() = None;
        self.deferred_batch_get_rounds.store(0, Ordering::SeqCst);
    }

    /// `transact_write` calls seen so far, failed ones included.
    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }

    /// `batch_get_item` calls seen so far.
    pub fn batch_get_calls(&self) -> usize {
        self.batch_get_calls.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn transaction_should_fail(&self, call: usize) -> bool {
        if self.failing_transactions.lock().contains(&call) {
            return true;
        }
        matches!(*self.fail_transactions_from.lock(), Some(from) if call >= from)
    }
}

impl<S: RecordStore> RecordStore for FaultInjectingStore<S> {
    fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        self.inner.get_item(key)
    }

    fn put_item(&self, item: Item, condition: PutCondition) -> Result<PutOutcome, StoreError> {
        self.inner.put_item(item, condition)
    }

    fn delete_item(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        self.inner.delete_item(key)
    }

    fn query(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Item>, StoreError> {
        self.inner.query(pk, sk_prefix)
    }

    fn transact_write(&self, mutations: &[Mutation]) -> Result<(), StoreError> {
        let call = self.transaction_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.transaction_should_fail(call) {
            tracing::debug!(call, items = mutations.len(), "injecting transaction failure");
            return Err(StoreError::Unavailable(format!(
                "injected failure on transaction call {call}"
            )));
        }
        self.inner.transact_write(mutations)
    }

    fn batch_get_item(&self, keys: &[ItemKey]) -> Result<BatchGetOutput, StoreError> {
        self.batch_get_calls.fetch_add(1, Ordering::SeqCst);
        let deferred = self
            .deferred_batch_get_rounds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if deferred {
            return Ok(BatchGetOutput {
                items: Vec::new(),
                unprocessed: keys.to_vec(),
            });
        }
        self.inner.batch_get_item(keys)
    }

    fn increment_counter(&self, key: &ItemKey, attribute: &str) -> Result<u64, StoreError> {
        self.inner.increment_counter(key, attribute)
    }

    fn max_transaction_items(&self) -> usize {
        self.inner.max_transaction_items()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRecordStore;
    use serde_json::json;

    fn put(n: usize) -> Vec<Mutation> {
        vec![Mutation::Put(Item::new(
            ItemKey::new("p", n.to_string()),
            json!({}),
        ))]
    }

    #[test]
    fn fails_only_the_chosen_call() {
        let store = FaultInjectingStore::new(InMemoryRecordStore::new()).fail_transaction(2);
        assert!(store.transact_write(&put(1)).is_ok());
        assert!(store.transact_write(&put(2)).is_err());
        assert!(store.transact_write(&put(3)).is_ok());
        assert_eq!(store.transaction_calls(), 3);
        assert_eq!(store.inner().len(), 2);
    }

    #[test]
    fn fails_everything_from_a_call() {
        let store = FaultInjectingStore::new(InMemoryRecordStore::new()).fail_transactions_from(2);
        assert!(store.transact_write(&put(1)).is_ok());
        assert!(store.transact_write(&put(2)).is_err());
        assert!(store.transact_write(&put(3)).is_err());
        store.heal();
        assert!(store.transact_write(&put(4)).is_ok());
    }

    #[test]
    fn deferred_batch_gets_run_out() {
        let store = FaultInjectingStore::new(InMemoryRecordStore::new()).defer_batch_gets(1);
        let keys = vec![ItemKey::new("p", "1")];
        assert_eq!(store.batch_get_item(&keys).unwrap().unprocessed, keys);
        assert!(store.batch_get_item(&keys).unwrap().unprocessed.is_empty());
        assert_eq!(store.batch_get_calls(), 2);
    }
}
