//! # Record Key Layout
//!
//! Every item lives under a partition key and a sort key. All records that
//! belong to one licensee share the partition
//! `{compact}#PROVIDER#{provider_id}`, which is what lets the store commit a
//! provider's privileges, audit rows and jurisdiction set in one atomic
//! multi-item transaction.
//!
//! ```text
//! {compact}#PROVIDER                                          provider
//! {compact}#PROVIDER#license/{jur}/{abbr}#                    license
//! {compact}#PROVIDER#privilege/{jur}/{abbr}#                  privilege
//! {compact}#PROVIDER#privilege/{jur}/{abbr}#UPDATE#{t}/{d}    privilege update
//! {compact}#PROVIDER#{subject}/{jur}/{abbr}#ADVERSE_ACTION#{id}
//! {compact}#PROVIDER#{subject}/{jur}/{abbr}#INVESTIGATION#{id}
//! ```

use serde::{Deserialize, Serialize};

use crate::identity::{
    AdverseActionId, CompactCode, InvestigationId, Jurisdiction, LicenseTypeAbbreviation,
    ProviderId,
};
use crate::temporal::Timestamp;

/// Composite primary key of a stored item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    /// Partition key.
    pub pk: String,
    /// Sort key.
    pub sk: String,
}

impl ItemKey {
    /// Build a key from raw parts.
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} | {}", self.pk, self.sk)
    }
}

/// Which kind of record an adverse action or investigation is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    /// Scoped to a home-jurisdiction license.
    License,
    /// Scoped to a privilege.
    Privilege,
}

impl SubjectType {
    /// The lowercase label used in sort keys and wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::License => "license",
            Self::Privilege => "privilege",
        }
    }
}

impl std::fmt::Display for SubjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partition key shared by every record of one provider.
pub fn provider_partition(compact: &CompactCode, provider_id: &ProviderId) -> String {
    format!("{compact}#PROVIDER#{provider_id}")
}

/// Sort-key prefix that matches every record in a provider partition.
pub fn provider_records_prefix(compact: &CompactCode) -> String {
    format!("{compact}#PROVIDER")
}

/// Key of the provider row itself.
pub fn provider_key(compact: &CompactCode, provider_id: &ProviderId) -> ItemKey {
    ItemKey::new(
        provider_partition(compact, provider_id),
        provider_records_prefix(compact),
    )
}

/// Sort-key prefix matching every license or every privilege-scoped record
/// (privileges, their updates, adverse actions and investigations).
pub fn subject_records_prefix(compact: &CompactCode, subject: SubjectType) -> String {
    format!("{compact}#PROVIDER#{subject}/")
}

fn subject_prefix(
    compact: &CompactCode,
    subject: SubjectType,
    jurisdiction: &Jurisdiction,
    license_type: &LicenseTypeAbbreviation,
) -> String {
    format!("{compact}#PROVIDER#{subject}/{jurisdiction}/{license_type}#")
}

/// Key of a license row.
pub fn license_key(
    compact: &CompactCode,
    provider_id: &ProviderId,
    jurisdiction: &Jurisdiction,
    license_type: &LicenseTypeAbbreviation,
) -> ItemKey {
    ItemKey::new(
        provider_partition(compact, provider_id),
        subject_prefix(compact, SubjectType::License, jurisdiction, license_type),
    )
}

/// Key of a privilege row.
pub fn privilege_key(
    compact: &CompactCode,
    provider_id: &ProviderId,
    jurisdiction: &Jurisdiction,
    license_type: &LicenseTypeAbbreviation,
) -> ItemKey {
    ItemKey::new(
        provider_partition(compact, provider_id),
        subject_prefix(compact, SubjectType::Privilege, jurisdiction, license_type),
    )
}

/// Key of a privilege-update audit row.
///
/// `change_digest` disambiguates updates that land in the same second.
pub fn privilege_update_key(
    compact: &CompactCode,
    provider_id: &ProviderId,
    jurisdiction: &Jurisdiction,
    license_type: &LicenseTypeAbbreviation,
    created_at: &Timestamp,
    change_digest: &str,
) -> ItemKey {
    ItemKey::new(
        provider_partition(compact, provider_id),
        format!(
            "{}UPDATE#{}/{}",
            subject_prefix(compact, SubjectType::Privilege, jurisdiction, license_type),
            created_at.epoch_secs(),
            change_digest
        ),
    )
}

/// Key of an adverse-action row.
pub fn adverse_action_key(
    compact: &CompactCode,
    provider_id: &ProviderId,
    subject: SubjectType,
    jurisdiction: &Jurisdiction,
    license_type: &LicenseTypeAbbreviation,
    adverse_action_id: &AdverseActionId,
) -> ItemKey {
    ItemKey::new(
        provider_partition(compact, provider_id),
        format!(
            "{}ADVERSE_ACTION#{adverse_action_id}",
            subject_prefix(compact, subject, jurisdiction, license_type)
        ),
    )
}

/// Key of an investigation row.
pub fn investigation_key(
    compact: &CompactCode,
    provider_id: &ProviderId,
    subject: SubjectType,
    jurisdiction: &Jurisdiction,
    license_type: &LicenseTypeAbbreviation,
    investigation_id: &InvestigationId,
) -> ItemKey {
    ItemKey::new(
        provider_partition(compact, provider_id),
        format!(
            "{}INVESTIGATION#{investigation_id}",
            subject_prefix(compact, subject, jurisdiction, license_type)
        ),
    )
}

/// Key of the per-compact privilege number counter.
pub fn privilege_counter_key(compact: &CompactCode) -> ItemKey {
    let key = format!("{compact}#PRIVILEGE_COUNT");
    ItemKey::new(key.clone(), key)
}

/// Partition of the notification ledger for one provider.
pub fn notification_partition(compact: &CompactCode, provider_id: &ProviderId) -> String {
    format!("{compact}#NOTIFICATION#{provider_id}")
}
