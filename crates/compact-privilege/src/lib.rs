//! # compact-privilege — Privilege Lifecycle Engine
//!
//! The I/O side of the engine. Everything here talks to a
//! [`compact_store::RecordStore`], an [`EventPublisher`] or a
//! [`NotificationSender`]; the state transitions themselves live in
//! `compact-state`.
//!
//! ## Modules
//!
//! - [`numbering`]: monotonically increasing privilege numbers per compact.
//! - [`commit`]: [`Operation`] and the batched commit with compensating
//!   rollback.
//! - [`issuance`]: plans and commits privilege issuance and renewal.
//! - [`purchase`]: provider registration, purchase validation, and the
//!   purchase flow.
//! - [`handlers`]: encumbrance cascade against the store and the bus.
//! - [`publisher`]: event bus seam and batch writer.
//! - [`notification`]: at-most-once stakeholder notifications.
//! - [`engine`]: [`PrivilegeEngine`], one handle over all of the above.
//! - [`config`]: [`EngineConfig`] from the environment.

pub mod commit;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod issuance;
pub mod notification;
pub mod numbering;
pub mod publisher;
pub mod purchase;

pub use commit::{commit_with_rollback, CommitReport, Operation, Step};
pub use config::{ConfigError, EngineConfig};
pub use engine::{LicenseEventReport, PrivilegeEngine};
pub use error::{
    CascadeHandlerError, EngineError, IssuanceError, NotificationError, PublishError,
    PurchaseError,
};
pub use handlers::{load_snapshot, CascadeHandler, CascadeReport};
pub use issuance::{
    plan_issuance, IssuanceManager, IssuancePlan, IssuanceReceipt, PrivilegeIssuanceRequest,
};
pub use notification::{
    DeliveryKey, DeliveryStatus, DispatchReport, LedgerEntry, NotificationDispatcher,
    NotificationMessage, NotificationSender, NotificationTracker, Recipient,
    RecordingNotificationSender,
};
pub use numbering::{PrivilegeNumberService, PRIVILEGE_COUNT_ATTRIBUTE};
pub use publisher::{EventBatchWriter, EventPublisher, InMemoryEventBus};
pub use purchase::{register_provider, validate_purchase, PurchaseRequest, PurchaseService};
