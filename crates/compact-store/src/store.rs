//! The store adapter trait and the conditional-create helper.

use compact_core::ItemKey;

use crate::error::StoreError;
use crate::item::{BatchGetOutput, Item, Mutation, PutCondition, PutOutcome};
use crate::MAX_TRANSACTION_ITEMS;

/// Partitioned key-value store consumed by the engine.
///
/// All calls are synchronous from the caller's point of view. The trait is
/// object-safe and `Send + Sync` so one store can be shared behind an `Arc`
/// by every component of an engine instance.
pub trait RecordStore: Send + Sync {
    /// Read one item.
    fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, StoreError>;

    /// Write one item, optionally only if absent.
    fn put_item(&self, item: Item, condition: PutCondition) -> Result<PutOutcome, StoreError>;

    /// Remove one item, returning what was there.
    fn delete_item(&self, key: &ItemKey) -> Result<Option<Item>, StoreError>;

    /// All items in partition `pk` whose sort key starts with `sk_prefix`,
    /// ordered by sort key.
    fn query(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Item>, StoreError>;

    /// Apply every mutation atomically, or none of them.
    ///
    /// Rejects more than [`RecordStore::max_transaction_items`] mutations
    /// and any key appearing twice.
    fn transact_write(&self, mutations: &[Mutation]) -> Result<(), StoreError>;

    /// Read many items. Some keys may come back unprocessed.
    fn batch_get_item(&self, keys: &[ItemKey]) -> Result<BatchGetOutput, StoreError>;

    /// Atomically add one to a numeric attribute, creating the item at 1 if
    /// absent. Returns the new value.
    fn increment_counter(&self, key: &ItemKey, attribute: &str) -> Result<u64, StoreError>;

    /// Largest transaction this store accepts.
    fn max_transaction_items(&self) -> usize {
        MAX_TRANSACTION_ITEMS
    }
}

/// Create `item` unless something already exists under its key.
///
/// Returns the item now stored and whether this call created it. Losing the
/// race is the normal path under concurrency, not an error.
pub fn create_if_absent(store: &dyn RecordStore, item: Item) -> Result<(Item, bool), StoreError> {
    match store.put_item(item.clone(), PutCondition::IfAbsent)? {
        PutOutcome::Written => Ok((item, true)),
        PutOutcome::AlreadyExists(existing) => {
            tracing::debug!(key = %existing.key, "conditional create lost; item already exists");
            Ok((existing, false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRecordStore;
    use serde_json::json;

    #[test]
    fn create_if_absent_reports_creation_once() {
        let store = InMemoryRecordStore::new();
        let key = ItemKey::new("p", "s");
        let (first, created) =
            create_if_absent(&store, Item::new(key.clone(), json!({"v": 1}))).unwrap();
        assert!(created);
        assert_eq!(first.body, json!({"v": 1}));

        let (second, created) =
            create_if_absent(&store, Item::new(key.clone(), json!({"v": 2}))).unwrap();
        assert!(!created);
        assert_eq!(second.body, json!({"v": 1}));
        assert_eq!(store.get_item(&key).unwrap().unwrap().body, json!({"v": 1}));
    }
}
