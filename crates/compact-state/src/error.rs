//! # Error Types
//!
//! Errors raised by the pure domain layer. None of these involve I/O; a
//! handler that sees one knows the aggregate or the event itself is at fault.

use compact_core::{AdverseActionId, Jurisdiction, LicenseTypeAbbreviation, ProviderId};
use thiserror::Error;

/// Errors assembling a [`crate::ProviderSnapshot`] from stored records.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// No provider row was found among the records.
    #[error("provider {provider_id} has no provider record")]
    MissingProvider {
        /// The provider queried.
        provider_id: ProviderId,
    },

    /// More than one provider row was found.
    #[error("provider {provider_id} has {count} provider records")]
    DuplicateProvider {
        /// The provider queried.
        provider_id: ProviderId,
        /// How many provider rows were found.
        count: usize,
    },

    /// A stored item could not be decoded as a provider record.
    #[error("undecodable provider record: {0}")]
    Decode(String),
}

/// Errors from the license/privilege derivation queries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    /// The candidate set was empty.
    #[error("no candidate licenses")]
    NoCandidateLicenses,

    /// The provider holds no license of the requested type.
    #[error("no license of type {license_type}")]
    NoLicenseOfType {
        /// The license type searched for.
        license_type: LicenseTypeAbbreviation,
    },
}

/// Errors from the encumbrance cascade state machine.
#[derive(Error, Debug)]
pub enum CascadeError {
    /// A privilege-scoped event named a privilege the provider does not hold.
    #[error("provider {provider_id} holds no {license_type} privilege in {jurisdiction}")]
    PrivilegeNotFound {
        /// The provider.
        provider_id: ProviderId,
        /// The privilege jurisdiction.
        jurisdiction: Jurisdiction,
        /// The license type.
        license_type: LicenseTypeAbbreviation,
    },

    /// A lift event named an adverse action that does not exist.
    #[error("adverse action {adverse_action_id} not found for provider {provider_id}")]
    AdverseActionNotFound {
        /// The provider.
        provider_id: ProviderId,
        /// The missing adverse action.
        adverse_action_id: AdverseActionId,
    },

    /// A privilege became unencumbered but none of its adverse actions
    /// carries a lift date. The aggregate is internally inconsistent.
    #[error("privilege {privilege_id} has no effective lift date on any adverse action")]
    MissingLiftDate {
        /// The privilege being lifted.
        privilege_id: String,
    },

    /// The aggregate contradicts itself, e.g. a cascade link whose
    /// privilege row is missing.
    #[error("inconsistent provider aggregate: {0}")]
    InconsistentAggregate(String),

    /// An audit record could not be built.
    #[error("failed to build privilege update record: {0}")]
    UpdateRecord(String),
}

/// Errors validating an inbound event envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventValidationError {
    /// The payload is not a JSON object of the expected shape.
    #[error("malformed event payload: {0}")]
    Malformed(String),

    /// A required field is absent or empty.
    #[error("missing required field {0}")]
    MissingField(&'static str),

    /// A field is present but fails validation.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field name as it appears on the wire.
        field: &'static str,
        /// Validation failure.
        reason: String,
    },
}
