//! # compact-core — Foundational Types for the Privilege Engine
//!
//! Leaf crate of the workspace. Every other crate depends on `compact-core`;
//! it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain identifiers.** `CompactCode`,
//!    `Jurisdiction`, `LicenseTypeAbbreviation`, `ProviderId`,
//!    `AdverseActionId` are validated at construction and on deserialization.
//!    No bare strings for identifiers.
//!
//! 2. **One key layout.** Every partition and sort key the engine reads or
//!    writes is produced by [`keys`]. Callers never format key strings by hand.
//!
//! 3. **UTC-only timestamps.** [`Timestamp`] rejects non-`Z` inputs and
//!    truncates to seconds, so event times compare and serialize identically
//!    wherever they appear (ledger keys, audit records, outbound events).
//!
//! 4. **Canonical change digests.** Audit-record sort keys embed a SHA-256 over
//!    the JCS form of the change, produced only through [`CanonicalBytes`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `compact-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod identity;
pub mod keys;
pub mod license_type;
pub mod temporal;

pub use digest::{change_digest, CanonicalBytes};
pub use error::CoreError;
pub use identity::{
    AdverseActionId, CompactCode, CompactTransactionId, InvestigationId, Jurisdiction,
    LicenseTypeAbbreviation, ProviderId,
};
pub use keys::{ItemKey, SubjectType};
pub use license_type::{LicenseTypeEntry, LicenseTypeRegistry};
pub use temporal::Timestamp;
