//! Record store error types.

use compact_core::ItemKey;
use thiserror::Error;

/// Errors raised by a [`crate::RecordStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or failed mid-request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the request for exceeding provisioned throughput.
    #[error("store throttled: {0}")]
    Throttled(String),

    /// A transaction carried more items than the store allows.
    #[error("transaction of {items} items exceeds the limit of {max}")]
    TransactionTooLarge {
        /// Items submitted.
        items: usize,
        /// Store limit.
        max: usize,
    },

    /// A transaction touched the same item twice.
    #[error("transaction touches {0} more than once")]
    DuplicateKeyInTransaction(ItemKey),

    /// A transaction was cancelled because one of its items could not be
    /// applied. Nothing from the transaction was written.
    #[error("transaction cancelled at {key}: {reason}")]
    TransactionCanceled {
        /// The item that blocked the transaction.
        key: ItemKey,
        /// Why it could not be applied.
        reason: String,
    },

    /// Batch read keys still unprocessed after all retries.
    #[error("{remaining} keys still unprocessed after {attempts} batch-get attempts")]
    UnprocessedKeys {
        /// Keys left unread.
        remaining: usize,
        /// Calls made, including the first.
        attempts: u32,
    },

    /// A stored body could not be encoded or decoded.
    #[error("serialization error for {key}: {detail}")]
    Serialization {
        /// The item involved.
        key: ItemKey,
        /// Underlying serde message.
        detail: String,
    },
}

impl StoreError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Throttled(_))
    }
}
