//! # Engine Error Types
//!
//! One enum per engine surface. Each maps onto a class of failure:
//!
//! | Class | Where |
//! |---|---|
//! | Validation | [`PurchaseError`] variants other than `Store`/`Issuance` |
//! | Transient store fault | `StoreError` wrapped by every enum |
//! | Failed issuance, fully rolled back | [`IssuanceError::TransactionFailed`] |
//! | Rollback failure (fatal) | [`IssuanceError::RollbackFailed`] |
//! | Missing invariant data | [`CascadeHandlerError::Cascade`] |
//!
//! Conditional-write conflicts are not errors; see
//! [`compact_store::create_if_absent`].

use compact_core::{ItemKey, Jurisdiction, LicenseTypeAbbreviation};
use compact_state::{CascadeError, DerivationError, SnapshotError};
use compact_store::StoreError;
use thiserror::Error;

/// Errors from the issuance transaction manager.
#[derive(Error, Debug)]
pub enum IssuanceError {
    /// The request cannot be turned into a consistent set of mutations.
    #[error("invalid issuance request: {0}")]
    InvalidRequest(String),

    /// A store call failed before any batch was committed (number claim,
    /// record encoding). Nothing needs undoing.
    #[error("issuance aborted before commit: {0}")]
    Store(#[from] StoreError),

    /// Batch `batch` of `batches` failed to commit. Every earlier batch was
    /// compensated; the aggregate is as it was before the call.
    #[error("issuance batch {batch} of {batches} failed and was rolled back: {source}")]
    TransactionFailed {
        /// 1-based index of the failed batch.
        batch: usize,
        /// Total batches in the operation.
        batches: usize,
        /// The commit failure.
        #[source]
        source: StoreError,
    },

    /// A compensating write failed. The aggregate is partially applied and
    /// needs manual reconciliation.
    #[error(
        "rollback failed after batch {batch} failed ({cause}); {} keys not restored: {source}",
        .unrestored.len()
    )]
    RollbackFailed {
        /// 1-based index of the batch whose failure triggered rollback.
        batch: usize,
        /// The original commit failure.
        cause: StoreError,
        /// The compensation failure.
        #[source]
        source: StoreError,
        /// Keys whose compensation did not commit.
        unrestored: Vec<ItemKey>,
    },
}

impl IssuanceError {
    /// Whether the aggregate is known to be inconsistent.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackFailed { .. })
    }
}

/// Reasons a privilege purchase is refused, plus the failures of the
/// issuance it triggers.
#[derive(Error, Debug)]
pub enum PurchaseError {
    /// No jurisdictions were requested.
    #[error("no jurisdictions selected")]
    NoJurisdictions,

    /// The license type is not defined for the compact.
    #[error("license type {0} is not part of this compact")]
    UnknownLicenseType(LicenseTypeAbbreviation),

    /// The provider row does not exist.
    #[error("provider is not registered")]
    ProviderNotFound,

    /// No license of the requested type.
    #[error(transparent)]
    NoLicense(#[from] DerivationError),

    /// The governing license is not active.
    #[error("license in {0} is not active")]
    LicenseInactive(Jurisdiction),

    /// The governing license is not compact-eligible.
    #[error("license in {0} is not eligible for compact privileges")]
    LicenseIneligible(Jurisdiction),

    /// The governing license is encumbered.
    #[error("license in {0} is encumbered")]
    LicenseEncumbered(Jurisdiction),

    /// A privilege was requested in the license's own jurisdiction.
    #[error("cannot purchase a privilege in home jurisdiction {0}")]
    HomeJurisdiction(Jurisdiction),

    /// A jurisdiction appears more than once in the request.
    #[error("jurisdiction {0} selected more than once")]
    DuplicateJurisdiction(Jurisdiction),

    /// Renewal of an encumbered privilege.
    #[error("privilege in {0} is encumbered and cannot be renewed")]
    PrivilegeEncumbered(Jurisdiction),

    /// Reading the provider's records failed.
    #[error("failed to load provider records: {0}")]
    Store(#[from] StoreError),

    /// A stored record could not be decoded.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Issuance failed after validation.
    #[error(transparent)]
    Issuance(#[from] IssuanceError),
}

/// Errors publishing outbound events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The event bus rejected or did not acknowledge the batch.
    #[error("event bus unavailable: {0}")]
    Unavailable(String),

    /// Some entries in the batch were rejected.
    #[error("{failed} of {total} events rejected by the event bus")]
    PartialFailure {
        /// Rejected entries.
        failed: usize,
        /// Entries in the batch.
        total: usize,
    },
}

/// Errors from the encumbrance cascade handlers.
#[derive(Error, Debug)]
pub enum CascadeHandlerError {
    /// Reading or writing the aggregate failed. Safe to redeliver.
    #[error("store failure during cascade: {0}")]
    Store(#[from] StoreError),

    /// The provider partition could not be assembled.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The state machine refused the event.
    #[error(transparent)]
    Cascade(#[from] CascadeError),

    /// Records were written but the announcement failed. Redelivery
    /// re-publishes without re-writing.
    #[error("cascade applied but event publish failed: {0}")]
    Publish(#[from] PublishError),
}

/// Errors from the notification tracker and dispatcher.
#[derive(Error, Debug)]
pub enum NotificationError {
    /// Ledger read or write failed.
    #[error("notification ledger store failure: {0}")]
    Store(#[from] StoreError),

    /// The external sender refused a message.
    #[error("notification to {recipient} failed: {reason}")]
    Send {
        /// Recipient label.
        recipient: String,
        /// Sender's reason.
        reason: String,
    },

    /// Some recipients were not reached. Redelivery retries only those.
    #[error("{failed} of {attempted} notifications failed")]
    DeliveryFailed {
        /// Failed sends.
        failed: usize,
        /// Sends attempted in this pass.
        attempted: usize,
    },
}

/// Errors from the [`crate::engine::PrivilegeEngine`] façade.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Purchase refused or issuance failed.
    #[error(transparent)]
    Purchase(#[from] PurchaseError),

    /// Cascade handling failed.
    #[error(transparent)]
    Cascade(#[from] CascadeHandlerError),

    /// Some stakeholders were not notified.
    #[error(transparent)]
    Notification(#[from] NotificationError),

    /// Direct store access failed.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}
