//! # Privilege Purchase
//!
//! The path from a captured payment to issued privileges:
//!
//! 1. read the provider row, its licenses, and any existing privileges in
//!    the requested jurisdictions (batch read with backoff);
//! 2. validate the purchase against the best license of the requested type;
//! 3. hand an issuance request to the [`IssuanceManager`].
//!
//! Validation happens before any write. Provider registration lives here
//! as well: it is the conditional create that every purchase depends on.

use std::collections::BTreeSet;
use std::sync::Arc;

use compact_core::keys::{
    privilege_key, provider_key, provider_partition, subject_records_prefix,
};
use compact_core::{
    CompactCode, CompactTransactionId, Jurisdiction, LicenseTypeAbbreviation,
    LicenseTypeRegistry, ProviderId, SubjectType, Timestamp,
};
use compact_state::{
    find_best_license_of_type, Attestation, CompactEligibility, EncumberedStatus, License,
    LicenseStatus, Privilege, Provider, ProviderRecord, SnapshotError,
};
use compact_store::{batch_get_with_retry, create_if_absent, RecordStore, StoreError};

use crate::config::EngineConfig;
use crate::error::PurchaseError;
use crate::issuance::{IssuanceManager, IssuanceReceipt, PrivilegeIssuanceRequest};

/// A licensee's request to purchase or renew privileges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee.
    pub provider_id: ProviderId,
    /// License type the privileges derive from.
    pub license_type: LicenseTypeAbbreviation,
    /// Jurisdictions selected.
    pub jurisdictions: Vec<Jurisdiction>,
    /// Captured payment reference.
    pub compact_transaction_id: CompactTransactionId,
    /// Attestations accepted.
    pub attestations: Vec<Attestation>,
    /// Purchase time.
    pub purchased_at: Timestamp,
}

/// Check a purchase against the provider's records. Returns the governing
/// license.
///
/// `existing` holds the provider's privileges in the requested
/// jurisdictions, if any.
pub fn validate_purchase<'a>(
    request: &PurchaseRequest,
    provider: &Provider,
    licenses: &'a [License],
    existing: &[Privilege],
    registry: &LicenseTypeRegistry,
) -> Result<&'a License, PurchaseError> {
    if request.jurisdictions.is_empty() {
        return Err(PurchaseError::NoJurisdictions);
    }
    if !registry.contains(&request.compact, &request.license_type) {
        return Err(PurchaseError::UnknownLicenseType(
            request.license_type.clone(),
        ));
    }
    let mut seen = BTreeSet::new();
    for j in &request.jurisdictions {
        if !seen.insert(j) {
            return Err(PurchaseError::DuplicateJurisdiction(j.clone()));
        }
    }

    let license = find_best_license_of_type(
        licenses,
        &request.license_type,
        Some(&provider.license_jurisdiction),
    )?;
    if license.license_status != LicenseStatus::Active {
        return Err(PurchaseError::LicenseInactive(license.jurisdiction.clone()));
    }
    if license.compact_eligibility != CompactEligibility::Eligible {
        return Err(PurchaseError::LicenseIneligible(
            license.jurisdiction.clone(),
        ));
    }
    if license.encumbered_status == EncumberedStatus::Encumbered {
        return Err(PurchaseError::LicenseEncumbered(
            license.jurisdiction.clone(),
        ));
    }
    if let Some(home) = request
        .jurisdictions
        .iter()
        .find(|j| **j == license.jurisdiction)
    {
        return Err(PurchaseError::HomeJurisdiction(home.clone()));
    }
    if let Some(encumbered) = existing.iter().find(|p| {
        p.license_type == request.license_type
            && request.jurisdictions.contains(&p.jurisdiction)
            && p.is_encumbered()
    }) {
        return Err(PurchaseError::PrivilegeEncumbered(
            encumbered.jurisdiction.clone(),
        ));
    }
    Ok(license)
}

/// Create the provider row unless it already exists.
///
/// Returns the stored row and whether this call created it. Two concurrent
/// registrations both succeed; the loser gets the winner's row.
pub fn register_provider(
    store: &dyn RecordStore,
    provider: &Provider,
) -> Result<(Provider, bool), StoreError> {
    let item = ProviderRecord::from(provider.clone()).to_item()?;
    let (item, created) = create_if_absent(store, item)?;
    match ProviderRecord::from_item(&item)? {
        ProviderRecord::Provider(p) => Ok((p, created)),
        _ => Err(StoreError::Serialization {
            key: item.key,
            detail: "provider key holds a non-provider record".to_string(),
        }),
    }
}

/// Purchase flow over a store.
#[derive(Clone)]
pub struct PurchaseService {
    store: Arc<dyn RecordStore>,
    issuance: IssuanceManager,
    registry: LicenseTypeRegistry,
    config: EngineConfig,
}

impl std::fmt::Debug for PurchaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PurchaseService {
    /// Build the service.
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: LicenseTypeRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            issuance: IssuanceManager::new(store.clone(), config),
            store,
            registry,
            config,
        }
    }

    /// Validate and issue.
    pub fn purchase_privileges(
        &self,
        request: &PurchaseRequest,
    ) -> Result<IssuanceReceipt, PurchaseError> {
        let provider = self.load_provider(&request.compact, &request.provider_id)?;
        let licenses = self.load_licenses(&request.compact, &request.provider_id)?;
        let existing = self.load_privileges(request)?;

        let license = validate_purchase(request, &provider, &licenses, &existing, &self.registry)
            .map_err(|e| {
                tracing::info!(
                    compact = %request.compact,
                    provider_id = %request.provider_id,
                    reason = %e,
                    "privilege purchase rejected"
                );
                e
            })?;

        let issuance = PrivilegeIssuanceRequest {
            compact: request.compact.clone(),
            provider_id: request.provider_id,
            jurisdictions: request.jurisdictions.clone(),
            license_expiration: license.date_of_expiration,
            compact_transaction_id: request.compact_transaction_id.clone(),
            prior_provider: provider,
            existing_privileges: existing,
            attestations: request.attestations.clone(),
            license_type: request.license_type.clone(),
            purchased_at: request.purchased_at,
        };
        Ok(self.issuance.issue_privileges(&issuance)?)
    }

    fn load_provider(
        &self,
        compact: &CompactCode,
        provider_id: &ProviderId,
    ) -> Result<Provider, PurchaseError> {
        let item = self
            .store
            .get_item(&provider_key(compact, provider_id))?
            .ok_or(PurchaseError::ProviderNotFound)?;
        match ProviderRecord::from_item(&item)? {
            ProviderRecord::Provider(p) => Ok(p),
            _ => Err(PurchaseError::Snapshot(SnapshotError::Decode(format!(
                "{} is not a provider row",
                item.key
            )))),
        }
    }

    fn load_licenses(
        &self,
        compact: &CompactCode,
        provider_id: &ProviderId,
    ) -> Result<Vec<License>, PurchaseError> {
        let prefix = subject_records_prefix(compact, SubjectType::License);
        let items = self
            .store
            .query(&provider_partition(compact, provider_id), &prefix)?;
        let mut licenses = Vec::with_capacity(items.len());
        for item in &items {
            if let ProviderRecord::License(l) = ProviderRecord::from_item(item)? {
                licenses.push(l);
            }
        }
        Ok(licenses)
    }

    fn load_privileges(&self, request: &PurchaseRequest) -> Result<Vec<Privilege>, PurchaseError> {
        let keys: Vec<_> = request
            .jurisdictions
            .iter()
            .map(|j| {
                privilege_key(
                    &request.compact,
                    &request.provider_id,
                    j,
                    &request.license_type,
                )
            })
            .collect();
        let items =
            batch_get_with_retry(self.store.as_ref(), &keys, &self.config.batch_get_retry)?;
        let mut privileges = Vec::with_capacity(items.len());
        for item in &items {
            if let ProviderRecord::Privilege(p) = ProviderRecord::from_item(item)? {
                privileges.push(p);
            }
        }
        Ok(privileges)
    }
}
