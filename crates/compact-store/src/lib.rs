//! # compact-store — Record Store Adapter
//!
//! Thin interface over a partitioned key-value store. The engine needs only
//! a handful of primitives, all expressed by [`RecordStore`]:
//!
//! - `get_item` / `put_item` (optionally conditional) / `delete_item`
//! - `query` by partition key and sort-key prefix
//! - `transact_write`: an atomic multi-item write bounded to
//!   [`MAX_TRANSACTION_ITEMS`] items
//! - `batch_get_item`, which may hand back unprocessed keys
//! - `increment_counter`, an atomic single-item add
//!
//! Higher-level helpers built on those primitives live here too:
//! [`create_if_absent`] (the "ask forgiveness" conditional create) and
//! [`batch_get_with_retry`] (caller-side backoff on unprocessed keys).
//!
//! ## Implementations
//!
//! - [`InMemoryRecordStore`]: `parking_lot`-guarded ordered map. The lock is
//!   never held across calls, and every transaction validates fully before
//!   touching state, so it is all-or-nothing.
//! - [`FaultInjectingStore`]: wraps any store and fails chosen transaction
//!   calls or defers batch reads. Used by the integration tests and the CLI
//!   `--fail-transaction` switch.

pub mod error;
pub mod fault;
pub mod item;
pub mod memory;
pub mod retry;
pub mod store;

pub use error::StoreError;
pub use fault::FaultInjectingStore;
pub use item::{BatchGetOutput, Item, Mutation, PutCondition, PutOutcome};
pub use memory::InMemoryRecordStore;
pub use retry::{batch_get_with_retry, RetryPolicy};
pub use store::{create_if_absent, RecordStore};

/// Upper bound on items in one atomic transaction.
pub const MAX_TRANSACTION_ITEMS: usize = 100;

/// Upper bound on keys served by one batch read.
pub const MAX_BATCH_GET_KEYS: usize = 100;
