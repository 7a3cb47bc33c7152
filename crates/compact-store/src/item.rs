//! Item and mutation model.

use compact_core::ItemKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

/// A stored item: its key plus a JSON document body.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Primary key.
    pub key: ItemKey,
    /// Document body.
    pub body: Value,
}

impl Item {
    /// Build an item from raw parts.
    pub fn new(key: ItemKey, body: Value) -> Self {
        Self { key, body }
    }

    /// Serialize a record into an item body.
    pub fn encode<T: Serialize>(key: ItemKey, record: &T) -> Result<Self, StoreError> {
        let body = serde_json::to_value(record).map_err(|e| StoreError::Serialization {
            key: key.clone(),
            detail: e.to_string(),
        })?;
        Ok(Self { key, body })
    }

    /// Deserialize the body into a record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        T::deserialize(&self.body).map_err(|e| StoreError::Serialization {
            key: self.key.clone(),
            detail: e.to_string(),
        })
    }
}

/// Condition attached to a single-item put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// Overwrite unconditionally.
    Always,
    /// Write only when no item exists under the key.
    IfAbsent,
}

/// Result of a single-item put.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The item was written.
    Written,
    /// `PutCondition::IfAbsent` lost: an item already exists. Carries it.
    AlreadyExists(Item),
}

/// One write inside an atomic transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create or replace an item.
    Put(Item),
    /// Remove an item. Deleting an absent item is not an error.
    Delete(ItemKey),
    /// Union string values into a set-valued attribute of an existing item.
    ///
    /// Idempotent under replay. The set is kept sorted so repeated unions
    /// produce identical bodies.
    AddToSet {
        /// Target item, which must already exist.
        key: ItemKey,
        /// Attribute holding the set.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
}

impl Mutation {
    /// The key this mutation touches.
    pub fn key(&self) -> &ItemKey {
        match self {
            Self::Put(item) => &item.key,
            Self::Delete(key) => key,
            Self::AddToSet { key, .. } => key,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Put(_) => "put",
            Self::Delete(_) => "delete",
            Self::AddToSet { .. } => "add_to_set",
        }
    }
}

/// Result of one `batch_get_item` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    /// Items found. Missing keys are simply absent.
    pub items: Vec<Item>,
    /// Keys the store did not get to; the caller should ask again.
    pub unprocessed: Vec<ItemKey>,
}
