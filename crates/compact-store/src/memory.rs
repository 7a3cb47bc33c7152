//! In-memory record store.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use compact_core::ItemKey;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::StoreError;
use crate::item::{BatchGetOutput, Item, Mutation, PutCondition, PutOutcome};
use crate::store::RecordStore;
use crate::{MAX_BATCH_GET_KEYS, MAX_TRANSACTION_ITEMS};

/// Thread-safe, cloneable in-memory record store.
///
/// Clones share the same data. `parking_lot::RwLock` is non-poisoning and
/// is never held across calls back into user code.
#[derive(Debug, Clone)]
pub struct InMemoryRecordStore {
    data: Arc<RwLock<BTreeMap<ItemKey, Value>>>,
    max_transaction_items: usize,
    max_batch_get_keys: usize,
}

impl InMemoryRecordStore {
    /// Create an empty store with the default limits.
    pub fn new() -> Self {
        Self::with_limits(MAX_TRANSACTION_ITEMS, MAX_BATCH_GET_KEYS)
    }

    /// Create an empty store with custom transaction and batch-read limits.
    pub fn with_limits(max_transaction_items: usize, max_batch_get_keys: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            max_transaction_items: max_transaction_items.max(1),
            max_batch_get_keys: max_batch_get_keys.max(1),
        }
    }

    /// Every item currently stored, in key order.
    pub fn dump(&self) -> Vec<Item> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| Item::new(k.clone(), v.clone()))
            .collect()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        Ok(self
            .data
            .read()
            .get(key)
            .map(|body| Item::new(key.clone(), body.clone())))
    }

    fn put_item(&self, item: Item, condition: PutCondition) -> Result<PutOutcome, StoreError> {
        let mut guard = self.data.write();
        if condition == PutCondition::IfAbsent {
            if let Some(existing) = guard.get(&item.key) {
                return Ok(PutOutcome::AlreadyExists(Item::new(
                    item.key.clone(),
                    existing.clone(),
                )));
            }
        }
        guard.insert(item.key, item.body);
        Ok(PutOutcome::Written)
    }

    fn delete_item(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        Ok(self
            .data
            .write()
            .remove(key)
            .map(|body| Item::new(key.clone(), body)))
    }

    fn query(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Item>, StoreError> {
        let start = ItemKey::new(pk, sk_prefix);
        let guard = self.data.read();
        Ok(guard
            .range((Bound::Included(start), Bound::Unbounded))
            .take_while(|(k, _)| k.pk == pk && k.sk.starts_with(sk_prefix))
            .map(|(k, v)| Item::new(k.clone(), v.clone()))
            .collect())
    }

    fn transact_write(&self, mutations: &[Mutation]) -> Result<(), StoreError> {
        if mutations.len() > self.max_transaction_items {
            return Err(StoreError::TransactionTooLarge {
                items: mutations.len(),
                max: self.max_transaction_items,
            });
        }
        let mut seen = HashSet::with_capacity(mutations.len());
        for m in mutations {
            if !seen.insert(m.key()) {
                return Err(StoreError::DuplicateKeyInTransaction(m.key().clone()));
            }
        }

        let mut guard = self.data.write();

        // Compute every new body before writing any of them.
        let mut staged: Vec<(ItemKey, Option<Value>)> = Vec::with_capacity(mutations.len());
        for m in mutations {
            match m {
                Mutation::Put(item) => staged.push((item.key.clone(), Some(item.body.clone()))),
                Mutation::Delete(key) => staged.push((key.clone(), None)),
                Mutation::AddToSet {
                    key,
                    attribute,
                    values,
                } => {
                    let current = guard.get(key).ok_or_else(|| StoreError::TransactionCanceled {
                        key: key.clone(),
                        reason: "set update targets a missing item".to_string(),
                    })?;
                    let updated = union_into(current, attribute, values).map_err(|reason| {
                        StoreError::TransactionCanceled {
                            key: key.clone(),
                            reason,
                        }
                    })?;
                    staged.push((key.clone(), Some(updated)));
                }
            }
        }

        for (key, body) in staged {
            match body {
                Some(body) => {
                    guard.insert(key, body);
                }
                None => {
                    guard.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn batch_get_item(&self, keys: &[ItemKey]) -> Result<BatchGetOutput, StoreError> {
        let guard = self.data.read();
        let served = keys.len().min(self.max_batch_get_keys);
        let items = keys[..served]
            .iter()
            .filter_map(|k| guard.get(k).map(|v| Item::new(k.clone(), v.clone())))
            .collect();
        Ok(BatchGetOutput {
            items,
            unprocessed: keys[served..].to_vec(),
        })
    }

    fn increment_counter(&self, key: &ItemKey, attribute: &str) -> Result<u64, StoreError> {
        let mut guard = self.data.write();
        let body = guard
            .entry(key.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        let obj = body.as_object_mut().ok_or_else(|| StoreError::Serialization {
            key: key.clone(),
            detail: "counter item is not an object".to_string(),
        })?;
        let current = match obj.get(attribute) {
            None => 0,
            Some(v) => v.as_u64().ok_or_else(|| StoreError::Serialization {
                key: key.clone(),
                detail: format!("counter attribute {attribute} is not an unsigned integer"),
            })?,
        };
        let next = current + 1;
        obj.insert(attribute.to_string(), Value::from(next));
        Ok(next)
    }

    fn max_transaction_items(&self) -> usize {
        self.max_transaction_items
    }
}

fn union_into(current: &Value, attribute: &str, values: &[String]) -> Result<Value, String> {
    let mut body = current.clone();
    let obj = body
        .as_object_mut()
        .ok_or_else(|| "item body is not an object".to_string())?;
    let mut set = BTreeSet::new();
    match obj.get(attribute) {
        None | Some(Value::Null) => {}
        Some(Value::Array(existing)) => {
            for v in existing {
                let s = v
                    .as_str()
                    .ok_or_else(|| format!("attribute {attribute} holds a non-string value"))?;
                set.insert(s.to_string());
            }
        }
        Some(_) => return Err(format!("attribute {attribute} is not a set")),
    }
    set.extend(values.iter().cloned());
    obj.insert(
        attribute.to_string(),
        Value::Array(set.into_iter().map(Value::String).collect()),
    );
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(pk: &str, sk: &str) -> ItemKey {
        ItemKey::new(pk, sk)
    }

    #[test]
    fn query_respects_partition_and_prefix() {
        let store = InMemoryRecordStore::new();
        for (pk, sk) in [("a", "x#1"), ("a", "x#2"), ("a", "y#1"), ("b", "x#1")] {
            store
                .put_item(Item::new(key(pk, sk), json!({})), PutCondition::Always)
                .unwrap();
        }
        let found = store.query("a", "x#").unwrap();
        let sks: Vec<_> = found.iter().map(|i| i.key.sk.as_str()).collect();
        assert_eq!(sks, vec!["x#1", "x#2"]);
    }

    #[test]
    fn transaction_is_all_or_nothing() {
        let store = InMemoryRecordStore::new();
        let ops = vec![
            Mutation::Put(Item::new(key("a", "1"), json!({"v": 1}))),
            Mutation::AddToSet {
                key: key("a", "missing"),
                attribute: "s".to_string(),
                values: vec!["x".to_string()],
            },
        ];
        let err = store.transact_write(&ops).unwrap_err();
        assert!(matches!(err, StoreError::TransactionCanceled { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn transaction_rejects_duplicates_and_oversize() {
        let store = InMemoryRecordStore::with_limits(2, 100);
        let dup = vec![
            Mutation::Put(Item::new(key("a", "1"), json!({}))),
            Mutation::Delete(key("a", "1")),
        ];
        assert!(matches!(
            store.transact_write(&dup),
            Err(StoreError::DuplicateKeyInTransaction(_))
        ));
        let big: Vec<_> = (0..3)
            .map(|i| Mutation::Put(Item::new(key("a", &i.to_string()), json!({}))))
            .collect();
        assert!(matches!(
            store.transact_write(&big),
            Err(StoreError::TransactionTooLarge { items: 3, max: 2 })
        ));
    }

    #[test]
    fn add_to_set_is_sorted_and_idempotent() {
        let store = InMemoryRecordStore::new();
        store
            .put_item(
                Item::new(key("a", "p"), json!({"set": ["oh"]})),
                PutCondition::Always,
            )
            .unwrap();
        let op = Mutation::AddToSet {
            key: key("a", "p"),
            attribute: "set".to_string(),
            values: vec!["ky".to_string(), "oh".to_string()],
        };
        store.transact_write(std::slice::from_ref(&op)).unwrap();
        let once = store.get_item(&key("a", "p")).unwrap().unwrap();
        store.transact_write(std::slice::from_ref(&op)).unwrap();
        let twice = store.get_item(&key("a", "p")).unwrap().unwrap();
        assert_eq!(once.body, json!({"set": ["ky", "oh"]}));
        assert_eq!(once, twice);
    }

    #[test]
    fn counter_starts_at_one_and_increments() {
        let store = InMemoryRecordStore::new();
        let k = key("c", "c");
        assert_eq!(store.increment_counter(&k, "n").unwrap(), 1);
        assert_eq!(store.increment_counter(&k, "n").unwrap(), 2);
        assert_eq!(store.increment_counter(&k, "n").unwrap(), 3);
    }

    #[test]
    fn batch_get_defers_keys_over_limit() {
        let store = InMemoryRecordStore::with_limits(100, 2);
        for i in 0..3 {
            store
                .put_item(Item::new(key("a", &i.to_string()), json!({})), PutCondition::Always)
                .unwrap();
        }
        let keys: Vec<_> = (0..3).map(|i| key("a", &i.to_string())).collect();
        let out = store.batch_get_item(&keys).unwrap();
        assert_eq!(out.items.len(), 2);
        assert_eq!(out.unprocessed, vec![key("a", "2")]);
    }

    #[test]
    fn conditional_put_returns_existing() {
        let store = InMemoryRecordStore::new();
        let item = Item::new(key("a", "1"), json!({"v": 1}));
        assert_eq!(
            store.put_item(item.clone(), PutCondition::IfAbsent).unwrap(),
            PutOutcome::Written
        );
        let again = store
            .put_item(Item::new(key("a", "1"), json!({"v": 2})), PutCondition::IfAbsent)
            .unwrap();
        assert_eq!(again, PutOutcome::AlreadyExists(item));
    }
}
