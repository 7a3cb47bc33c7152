//! # Provider Partition Records
//!
//! Every row stored under a provider's partition, and the tagged
//! [`ProviderRecord`] envelope used to read a partition back in one query.
//!
//! ## Ownership
//!
//! - Licenses arrive from jurisdiction data ingestion; this crate never
//!   creates them.
//! - Privileges are created only by the issuance transaction manager.
//! - A privilege's `encumbered_status` is flipped as a side effect of a
//!   license event only by the cascade state machine.
//! - Privilege updates are write-once audit rows.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use compact_core::keys::{
    adverse_action_key, investigation_key, license_key, privilege_key, privilege_update_key,
    provider_key,
};
use compact_core::{
    change_digest, AdverseActionId, CompactCode, CompactTransactionId, InvestigationId, ItemKey,
    Jurisdiction, LicenseTypeAbbreviation, ProviderId, SubjectType, Timestamp,
};
use compact_store::{Item, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CascadeError;

/// Provider attribute holding the set of privilege jurisdictions.
pub const PRIVILEGE_JURISDICTIONS_ATTRIBUTE: &str = "privilege_jurisdictions";

// ─── Status enums ────────────────────────────────────────────────────

/// Whether a license or privilege carries an open adverse action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncumberedStatus {
    /// No open adverse action.
    Unencumbered,
    /// At least one open adverse action, from any source.
    Encumbered,
}

impl EncumberedStatus {
    /// Canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unencumbered => "UNENCUMBERED",
            Self::Encumbered => "ENCUMBERED",
        }
    }
}

impl std::fmt::Display for EncumberedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Jurisdiction-reported status of a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseStatus {
    /// Currently active.
    Active,
    /// Lapsed, surrendered, or otherwise inactive.
    Inactive,
}

/// Whether a license qualifies its holder for compact privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompactEligibility {
    /// Eligible.
    Eligible,
    /// Not eligible.
    Ineligible,
}

/// Status of a privilege as set by a compact administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdministratorStatus {
    /// Active.
    Active,
    /// Deactivated by an administrator.
    Inactive,
}

// ─── Provider ────────────────────────────────────────────────────────

/// One licensee within one compact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee identifier.
    pub provider_id: ProviderId,
    /// Given name.
    pub given_name: String,
    /// Family name.
    pub family_name: String,
    /// Licensee contact address for notifications, if registered.
    pub email_address: Option<String>,
    /// Home (license) jurisdiction.
    pub license_jurisdiction: Jurisdiction,
    /// Jurisdictions in which the licensee holds privileges.
    pub privilege_jurisdictions: BTreeSet<Jurisdiction>,
    /// Last profile update.
    pub date_of_update: Timestamp,
}

impl Provider {
    /// Store key of this row.
    pub fn key(&self) -> ItemKey {
        provider_key(&self.compact, &self.provider_id)
    }

    /// Display name used in notification templates.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name)
    }
}

// ─── License ─────────────────────────────────────────────────────────

/// A home-jurisdiction license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee.
    pub provider_id: ProviderId,
    /// Issuing jurisdiction.
    pub jurisdiction: Jurisdiction,
    /// License type.
    pub license_type: LicenseTypeAbbreviation,
    /// Jurisdiction-assigned license number.
    pub license_number: Option<String>,
    /// Original issuance date.
    pub date_of_issuance: NaiveDate,
    /// Most recent renewal date.
    pub date_of_renewal: Option<NaiveDate>,
    /// Expiration date.
    pub date_of_expiration: NaiveDate,
    /// Jurisdiction-reported status.
    pub license_status: LicenseStatus,
    /// Compact eligibility.
    pub compact_eligibility: CompactEligibility,
    /// Encumbrance state.
    pub encumbered_status: EncumberedStatus,
}

impl License {
    /// Store key of this row.
    pub fn key(&self) -> ItemKey {
        license_key(
            &self.compact,
            &self.provider_id,
            &self.jurisdiction,
            &self.license_type,
        )
    }

    /// Renewal date if present, else issuance date.
    pub fn effective_date(&self) -> NaiveDate {
        self.date_of_renewal.unwrap_or(self.date_of_issuance)
    }
}

// ─── Privilege ───────────────────────────────────────────────────────

/// An attestation the licensee accepted at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Attestation identifier.
    pub attestation_id: String,
    /// Version accepted.
    pub version: String,
}

/// The right to practice in a jurisdiction other than the home license's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privilege {
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee.
    pub provider_id: ProviderId,
    /// Jurisdiction the privilege grants practice in.
    pub jurisdiction: Jurisdiction,
    /// Jurisdiction of the governing license.
    pub license_jurisdiction: Jurisdiction,
    /// License type.
    pub license_type: LicenseTypeAbbreviation,
    /// Compact-wide sequence number claimed at creation.
    pub privilege_number: u64,
    /// `{ABBR}-{JURISDICTION}-{number}`.
    pub privilege_id: String,
    /// First issuance; preserved across renewals.
    pub date_of_issuance: Timestamp,
    /// Most recent purchase.
    pub date_of_renewal: Timestamp,
    /// Mirrors the governing license's expiration at purchase time.
    pub date_of_expiration: NaiveDate,
    /// Purchase transaction that paid for the current term.
    pub compact_transaction_id: CompactTransactionId,
    /// Attestations accepted for the current term.
    pub attestations: Vec<Attestation>,
    /// Administrator-set status.
    pub administrator_set_status: AdministratorStatus,
    /// Encumbrance state.
    pub encumbered_status: EncumberedStatus,
}

impl Privilege {
    /// Store key of this row.
    pub fn key(&self) -> ItemKey {
        privilege_key(
            &self.compact,
            &self.provider_id,
            &self.jurisdiction,
            &self.license_type,
        )
    }

    /// Whether the privilege is currently encumbered.
    pub fn is_encumbered(&self) -> bool {
        self.encumbered_status == EncumberedStatus::Encumbered
    }
}

/// Render a privilege identifier.
pub fn privilege_id(
    license_type: &LicenseTypeAbbreviation,
    jurisdiction: &Jurisdiction,
    number: u64,
) -> String {
    format!(
        "{}-{}-{number}",
        license_type.as_str().to_ascii_uppercase(),
        jurisdiction.as_str().to_ascii_uppercase()
    )
}

// ─── Privilege Update ────────────────────────────────────────────────

/// What kind of change a privilege update records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeUpdateType {
    /// The privilege was purchased again.
    Renewal,
    /// The privilege became encumbered.
    Encumbrance,
    /// The privilege's last open encumbrance was lifted.
    LiftingEncumbrance,
    /// An administrator deactivated the privilege.
    Deactivation,
}

/// Write-once audit row: a prior privilege snapshot plus the delta applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeUpdate {
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee.
    pub provider_id: ProviderId,
    /// Privilege jurisdiction.
    pub jurisdiction: Jurisdiction,
    /// License type.
    pub license_type: LicenseTypeAbbreviation,
    /// Kind of change.
    pub update_type: PrivilegeUpdateType,
    /// The privilege as it was before the change.
    pub previous: Privilege,
    /// The changed fields and their new values.
    pub updated_values: Value,
    /// When the change was recorded.
    pub create_date: Timestamp,
    /// When the change takes effect, where that differs from `create_date`.
    pub effective_date: Option<NaiveDate>,
    /// Digest of the change; part of the sort key.
    pub change_hash: String,
}

impl PrivilegeUpdate {
    /// Build an audit row for a change to `previous`.
    pub fn new(
        update_type: PrivilegeUpdateType,
        previous: &Privilege,
        updated_values: Value,
        create_date: Timestamp,
        effective_date: Option<NaiveDate>,
    ) -> Result<Self, CascadeError> {
        let change_hash = change_digest(&serde_json::json!({
            "update_type": update_type,
            "privilege_id": previous.privilege_id,
            "previous": previous,
            "updated_values": updated_values,
            "create_date": create_date,
        }))
        .map_err(|e| CascadeError::UpdateRecord(e.to_string()))?;
        Ok(Self {
            compact: previous.compact.clone(),
            provider_id: previous.provider_id,
            jurisdiction: previous.jurisdiction.clone(),
            license_type: previous.license_type.clone(),
            update_type,
            previous: previous.clone(),
            updated_values,
            create_date,
            effective_date,
            change_hash,
        })
    }

    /// Store key of this row.
    pub fn key(&self) -> ItemKey {
        privilege_update_key(
            &self.compact,
            &self.provider_id,
            &self.jurisdiction,
            &self.license_type,
            &self.create_date,
            &self.change_hash,
        )
    }
}

// ─── Adverse Action ──────────────────────────────────────────────────

/// A disciplinary action against a license or privilege.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdverseAction {
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee.
    pub provider_id: ProviderId,
    /// Identifier of this action.
    pub adverse_action_id: AdverseActionId,
    /// Whether the action is scoped to a license or a privilege.
    pub action_against: SubjectType,
    /// Jurisdiction of the license or privilege.
    pub jurisdiction: Jurisdiction,
    /// License type of the license or privilege.
    pub license_type: LicenseTypeAbbreviation,
    /// Category reported by the regulator (e.g. `suspension`).
    pub encumbrance_type: Option<String>,
    /// When the restriction starts.
    pub effective_start_date: NaiveDate,
    /// When the restriction ends; `None` while open.
    pub effective_lift_date: Option<NaiveDate>,
    /// For a privilege action cascaded from a license action, the license
    /// action it mirrors.
    pub source_adverse_action_id: Option<AdverseActionId>,
    /// When the row was written.
    pub creation_date: Timestamp,
}

impl AdverseAction {
    /// Store key of this row.
    pub fn key(&self) -> ItemKey {
        adverse_action_key(
            &self.compact,
            &self.provider_id,
            self.action_against,
            &self.jurisdiction,
            &self.license_type,
            &self.adverse_action_id,
        )
    }

    /// Whether the action has not been lifted.
    pub fn is_open(&self) -> bool {
        self.effective_lift_date.is_none()
    }
}

// ─── Investigation ───────────────────────────────────────────────────

/// An investigation against a license or privilege.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investigation {
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee.
    pub provider_id: ProviderId,
    /// Identifier of this investigation.
    pub investigation_id: InvestigationId,
    /// Whether it targets a license or a privilege.
    pub investigation_against: SubjectType,
    /// Jurisdiction of the license or privilege.
    pub jurisdiction: Jurisdiction,
    /// License type of the license or privilege.
    pub license_type: LicenseTypeAbbreviation,
    /// When the investigation was opened.
    pub creation_date: Timestamp,
    /// When it was closed; `None` while open.
    pub close_date: Option<NaiveDate>,
}

impl Investigation {
    /// Store key of this row.
    pub fn key(&self) -> ItemKey {
        investigation_key(
            &self.compact,
            &self.provider_id,
            self.investigation_against,
            &self.jurisdiction,
            &self.license_type,
            &self.investigation_id,
        )
    }

    /// Whether the investigation is still open.
    pub fn is_open(&self) -> bool {
        self.close_date.is_none()
    }
}

// ─── Tagged envelope ─────────────────────────────────────────────────

/// Any row stored in a provider partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderRecord {
    /// Provider row.
    Provider(Provider),
    /// License row.
    License(License),
    /// Privilege row.
    Privilege(Privilege),
    /// Privilege update audit row.
    PrivilegeUpdate(PrivilegeUpdate),
    /// Adverse action row.
    AdverseAction(AdverseAction),
    /// Investigation row.
    Investigation(Investigation),
}

impl ProviderRecord {
    /// Store key of the wrapped row.
    pub fn key(&self) -> ItemKey {
        match self {
            Self::Provider(r) => r.key(),
            Self::License(r) => r.key(),
            Self::Privilege(r) => r.key(),
            Self::PrivilegeUpdate(r) => r.key(),
            Self::AdverseAction(r) => r.key(),
            Self::Investigation(r) => r.key(),
        }
    }

    /// Encode as a store item.
    pub fn to_item(&self) -> Result<Item, StoreError> {
        Item::encode(self.key(), self)
    }

    /// Decode a store item.
    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        item.decode()
    }
}

macro_rules! record_from {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for ProviderRecord {
                fn from(r: $variant) -> Self {
                    Self::$variant(r)
                }
            }
        )*
    };
}

record_from!(Provider, License, Privilege, PrivilegeUpdate, AdverseAction, Investigation);

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared record builders for unit tests in this crate.

    use super::*;

    pub fn compact() -> CompactCode {
        CompactCode::new("octp").unwrap()
    }

    pub fn provider_id() -> ProviderId {
        ProviderId::parse("89a6377e-c3a5-40e5-bca5-317ec854c570").unwrap()
    }

    pub fn jur(s: &str) -> Jurisdiction {
        Jurisdiction::new(s).unwrap()
    }

    pub fn ot() -> LicenseTypeAbbreviation {
        LicenseTypeAbbreviation::new("ot").unwrap()
    }

    pub fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    pub fn provider(home: &str, privileges: &[&str]) -> Provider {
        Provider {
            compact: compact(),
            provider_id: provider_id(),
            given_name: "Jordan".to_string(),
            family_name: "Reyes".to_string(),
            email_address: Some("jordan@example.org".to_string()),
            license_jurisdiction: jur(home),
            privilege_jurisdictions: privileges.iter().map(|j| jur(j)).collect(),
            date_of_update: ts("2024-01-01T00:00:00Z"),
        }
    }

    pub fn license(jurisdiction: &str, issued: &str, renewed: Option<&str>) -> License {
        License {
            compact: compact(),
            provider_id: provider_id(),
            jurisdiction: jur(jurisdiction),
            license_type: ot(),
            license_number: Some("A-1".to_string()),
            date_of_issuance: date(issued),
            date_of_renewal: renewed.map(date),
            date_of_expiration: date("2026-04-04"),
            license_status: LicenseStatus::Active,
            compact_eligibility: CompactEligibility::Eligible,
            encumbered_status: EncumberedStatus::Unencumbered,
        }
    }

    pub fn privilege(jurisdiction: &str, license_jurisdiction: &str, number: u64) -> Privilege {
        Privilege {
            compact: compact(),
            provider_id: provider_id(),
            jurisdiction: jur(jurisdiction),
            license_jurisdiction: jur(license_jurisdiction),
            license_type: ot(),
            privilege_number: number,
            privilege_id: privilege_id(&ot(), &jur(jurisdiction), number),
            date_of_issuance: ts("2024-02-01T10:00:00Z"),
            date_of_renewal: ts("2024-02-01T10:00:00Z"),
            date_of_expiration: date("2026-04-04"),
            compact_transaction_id: CompactTransactionId::new("txn-1").unwrap(),
            attestations: vec![],
            administrator_set_status: AdministratorStatus::Active,
            encumbered_status: EncumberedStatus::Unencumbered,
        }
    }

    pub fn adverse_action(
        against: SubjectType,
        jurisdiction: &str,
        start: &str,
        lift: Option<&str>,
    ) -> AdverseAction {
        AdverseAction {
            compact: compact(),
            provider_id: provider_id(),
            adverse_action_id: AdverseActionId::new(),
            action_against: against,
            jurisdiction: jur(jurisdiction),
            license_type: ot(),
            encumbrance_type: Some("suspension".to_string()),
            effective_start_date: date(start),
            effective_lift_date: lift.map(date),
            source_adverse_action_id: None,
            creation_date: ts("2024-01-01T00:00:00Z"),
        }
    }
}
