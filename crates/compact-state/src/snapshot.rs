//! # Provider Aggregate Snapshot
//!
//! The full record set of one provider partition, as read by a single
//! prefix query. The cascade state machine takes a snapshot in and hands a
//! new snapshot back; nothing here touches the store.

use compact_core::{
    AdverseActionId, Jurisdiction, LicenseTypeAbbreviation, ProviderId, SubjectType,
};
use compact_store::Item;

use crate::error::SnapshotError;
use crate::records::{
    AdverseAction, Investigation, License, Privilege, PrivilegeUpdate, Provider, ProviderRecord,
};

/// Every record stored under one provider partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSnapshot {
    /// The provider row.
    pub provider: Provider,
    /// Home-jurisdiction licenses.
    pub licenses: Vec<License>,
    /// Privileges.
    pub privileges: Vec<Privilege>,
    /// Privilege audit rows.
    pub privilege_updates: Vec<PrivilegeUpdate>,
    /// Adverse actions against licenses and privileges.
    pub adverse_actions: Vec<AdverseAction>,
    /// Investigations against licenses and privileges.
    pub investigations: Vec<Investigation>,
}

impl ProviderSnapshot {
    /// A snapshot holding only a provider row.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            licenses: Vec::new(),
            privileges: Vec::new(),
            privilege_updates: Vec::new(),
            adverse_actions: Vec::new(),
            investigations: Vec::new(),
        }
    }

    /// Assemble a snapshot from decoded records.
    ///
    /// # Errors
    ///
    /// Exactly one provider row must be present.
    pub fn from_records(
        provider_id: ProviderId,
        records: impl IntoIterator<Item = ProviderRecord>,
    ) -> Result<Self, SnapshotError> {
        let mut providers = Vec::new();
        let mut licenses = Vec::new();
        let mut privileges = Vec::new();
        let mut privilege_updates = Vec::new();
        let mut adverse_actions = Vec::new();
        let mut investigations = Vec::new();
        for record in records {
            match record {
                ProviderRecord::Provider(r) => providers.push(r),
                ProviderRecord::License(r) => licenses.push(r),
                ProviderRecord::Privilege(r) => privileges.push(r),
                ProviderRecord::PrivilegeUpdate(r) => privilege_updates.push(r),
                ProviderRecord::AdverseAction(r) => adverse_actions.push(r),
                ProviderRecord::Investigation(r) => investigations.push(r),
            }
        }
        let count = providers.len();
        let provider = match (providers.pop(), count) {
            (Some(p), 1) => p,
            (None, _) => return Err(SnapshotError::MissingProvider { provider_id }),
            (Some(_), _) => {
                return Err(SnapshotError::DuplicateProvider { provider_id, count })
            }
        };
        Ok(Self {
            provider,
            licenses,
            privileges,
            privilege_updates,
            adverse_actions,
            investigations,
        })
    }

    /// Decode and assemble a snapshot from raw store items.
    pub fn from_items(provider_id: ProviderId, items: &[Item]) -> Result<Self, SnapshotError> {
        let records = items
            .iter()
            .map(|item| {
                ProviderRecord::from_item(item).map_err(|e| SnapshotError::Decode(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_records(provider_id, records)
    }

    /// Flatten back into records.
    pub fn records(&self) -> Vec<ProviderRecord> {
        let mut out = Vec::with_capacity(
            1 + self.licenses.len()
                + self.privileges.len()
                + self.privilege_updates.len()
                + self.adverse_actions.len()
                + self.investigations.len(),
        );
        out.push(ProviderRecord::Provider(self.provider.clone()));
        out.extend(self.licenses.iter().cloned().map(ProviderRecord::License));
        out.extend(self.privileges.iter().cloned().map(ProviderRecord::Privilege));
        out.extend(
            self.privilege_updates
                .iter()
                .cloned()
                .map(ProviderRecord::PrivilegeUpdate),
        );
        out.extend(
            self.adverse_actions
                .iter()
                .cloned()
                .map(ProviderRecord::AdverseAction),
        );
        out.extend(
            self.investigations
                .iter()
                .cloned()
                .map(ProviderRecord::Investigation),
        );
        out
    }

    // ─── Lookups ─────────────────────────────────────────────────────

    /// The privilege in `jurisdiction` for `license_type`, if held.
    pub fn privilege(
        &self,
        jurisdiction: &Jurisdiction,
        license_type: &LicenseTypeAbbreviation,
    ) -> Option<&Privilege> {
        self.privileges
            .iter()
            .find(|p| &p.jurisdiction == jurisdiction && &p.license_type == license_type)
    }

    /// The license in `jurisdiction` for `license_type`, if held.
    pub fn license(
        &self,
        jurisdiction: &Jurisdiction,
        license_type: &LicenseTypeAbbreviation,
    ) -> Option<&License> {
        self.licenses
            .iter()
            .find(|l| &l.jurisdiction == jurisdiction && &l.license_type == license_type)
    }

    /// Licenses of one type.
    pub fn licenses_of_type(&self, license_type: &LicenseTypeAbbreviation) -> Vec<License> {
        self.licenses
            .iter()
            .filter(|l| &l.license_type == license_type)
            .cloned()
            .collect()
    }

    /// Privileges whose governing license is `(license_jurisdiction, license_type)`.
    pub fn privileges_derived_from(
        &self,
        license_jurisdiction: &Jurisdiction,
        license_type: &LicenseTypeAbbreviation,
    ) -> Vec<&Privilege> {
        self.privileges
            .iter()
            .filter(|p| {
                &p.license_jurisdiction == license_jurisdiction && &p.license_type == license_type
            })
            .collect()
    }

    /// An adverse action by identifier.
    pub fn adverse_action(&self, id: &AdverseActionId) -> Option<&AdverseAction> {
        self.adverse_actions
            .iter()
            .find(|a| &a.adverse_action_id == id)
    }

    /// Adverse actions scoped to one privilege.
    pub fn privilege_adverse_actions(
        &self,
        jurisdiction: &Jurisdiction,
        license_type: &LicenseTypeAbbreviation,
    ) -> Vec<&AdverseAction> {
        self.adverse_actions
            .iter()
            .filter(|a| {
                a.action_against == SubjectType::Privilege
                    && &a.jurisdiction == jurisdiction
                    && &a.license_type == license_type
            })
            .collect()
    }

    // ─── Mutation ────────────────────────────────────────────────────

    /// Insert or replace a privilege by `(jurisdiction, license_type)`.
    pub fn upsert_privilege(&mut self, privilege: Privilege) {
        match self.privileges.iter_mut().find(|p| {
            p.jurisdiction == privilege.jurisdiction && p.license_type == privilege.license_type
        }) {
            Some(slot) => *slot = privilege,
            None => self.privileges.push(privilege),
        }
    }

    /// Insert or replace an adverse action by identifier.
    pub fn upsert_adverse_action(&mut self, action: AdverseAction) {
        match self
            .adverse_actions
            .iter_mut()
            .find(|a| a.adverse_action_id == action.adverse_action_id)
        {
            Some(slot) => *slot = action,
            None => self.adverse_actions.push(action),
        }
    }

    /// Append an audit row.
    pub fn push_update(&mut self, update: PrivilegeUpdate) {
        self.privilege_updates.push(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fixtures::*;

    #[test]
    fn requires_exactly_one_provider() {
        let err = ProviderSnapshot::from_records(
            provider_id(),
            vec![ProviderRecord::License(license("oh", "2020-01-01", None))],
        )
        .unwrap_err();
        assert!(matches!(err, SnapshotError::MissingProvider { .. }));

        let err = ProviderSnapshot::from_records(
            provider_id(),
            vec![
                ProviderRecord::Provider(provider("oh", &[])),
                ProviderRecord::Provider(provider("oh", &[])),
            ],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::DuplicateProvider { count: 2, .. }
        ));
    }

    #[test]
    fn round_trips_through_items() {
        let mut snap = ProviderSnapshot::new(provider("oh", &["ky"]));
        snap.licenses.push(license("oh", "2020-01-01", None));
        snap.privileges.push(privilege("ky", "oh", 3));
        let items: Vec<Item> = snap
            .records()
            .iter()
            .map(|r| r.to_item().unwrap())
            .collect();
        let back = ProviderSnapshot::from_items(provider_id(), &items).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn derived_privileges_match_license_jurisdiction_and_type() {
        let mut snap = ProviderSnapshot::new(provider("oh", &["ky", "ne"]));
        snap.privileges.push(privilege("ky", "oh", 1));
        snap.privileges.push(privilege("ne", "co", 2));
        let derived = snap.privileges_derived_from(&jur("oh"), &ot());
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].jurisdiction, jur("ky"));
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut snap = ProviderSnapshot::new(provider("oh", &["ky"]));
        snap.upsert_privilege(privilege("ky", "oh", 1));
        let mut renewed = privilege("ky", "oh", 1);
        renewed.date_of_expiration = date("2027-01-01");
        snap.upsert_privilege(renewed.clone());
        assert_eq!(snap.privileges, vec![renewed]);
    }
}
