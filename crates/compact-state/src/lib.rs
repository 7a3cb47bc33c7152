//! # compact-state — Provider Aggregate and Encumbrance State Machine
//!
//! The pure domain layer of the privilege engine. Everything here is a
//! function of its inputs: no store handles, no publishers, no clocks.
//!
//! ## Modules
//!
//! - [`records`]: the rows stored in a provider partition and the tagged
//!   [`ProviderRecord`] envelope.
//! - [`snapshot`]: [`ProviderSnapshot`], the whole partition as one value.
//! - [`derivation`]: best-license selection, adverse action and
//!   investigation filters, latest effective lift date.
//! - [`events`]: validated inbound encumbrance events and outbound
//!   privilege events.
//! - [`cascade`]: `(aggregate, event) -> (aggregate, writes, events)`
//!   transitions between `UNENCUMBERED` and `ENCUMBERED`.

pub mod cascade;
pub mod derivation;
pub mod error;
pub mod events;
pub mod records;
pub mod snapshot;

pub use cascade::{
    apply_license_encumbrance, apply_privilege_encumbrance, cascade_adverse_action_id,
    deactivate_privilege, lift_license_encumbrance, lift_privilege_encumbrance, CascadeOutcome,
    PrivilegeWrite,
};
pub use derivation::{
    filter_adverse_actions, filter_investigations, find_best_license, find_best_license_of_type,
    latest_effective_lift_date, RecordState, SubjectFilter,
};
pub use error::{CascadeError, DerivationError, EventValidationError, SnapshotError};
pub use events::{EncumbranceEvent, LicenseEventKind, PrivilegeEvent, PrivilegeEventKind};
pub use records::{
    privilege_id, AdministratorStatus, AdverseAction, Attestation, CompactEligibility,
    EncumberedStatus, Investigation, License, LicenseStatus, Privilege, PrivilegeUpdate,
    PrivilegeUpdateType, Provider, ProviderRecord, PRIVILEGE_JURISDICTIONS_ATTRIBUTE,
};
pub use snapshot::ProviderSnapshot;
