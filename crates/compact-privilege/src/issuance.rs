//! # Privilege Issuance Transaction Manager
//!
//! Turns a paid purchase into privilege rows. The write is planned as one
//! [`Operation`]:
//!
//! 1. per jurisdiction, a privilege `Put` (new or renewed), and for a
//!    renewal a `PrivilegeUpdate` audit `Put`;
//! 2. one trailing `AddToSet` of every purchased jurisdiction onto the
//!    provider's privilege-jurisdiction set.
//!
//! The set update goes last so that a partial failure never leaves the
//! provider claiming privileges that were not written. Compensations:
//! an audit `Put` is undone by `Delete`; a privilege `Put` by restoring the
//! prior row or, for a new privilege, `Delete`; and the rollback always ends
//! by restoring the prior provider row.
//!
//! Numbers are claimed only for new privileges. A renewal keeps the
//! privilege number, identifier and original issuance date.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use compact_core::keys::provider_key;
use compact_core::{
    CompactCode, CompactTransactionId, Jurisdiction, LicenseTypeAbbreviation, ProviderId,
    Timestamp,
};
use compact_state::{
    privilege_id, AdministratorStatus, Attestation, EncumberedStatus, Privilege, PrivilegeUpdate,
    PrivilegeUpdateType, Provider, ProviderRecord, PRIVILEGE_JURISDICTIONS_ATTRIBUTE,
};
use compact_store::{Mutation, RecordStore};
use serde_json::{Map, Value};

use crate::commit::{commit_with_rollback, Operation};
use crate::config::EngineConfig;
use crate::error::IssuanceError;
use crate::numbering::PrivilegeNumberService;

/// Everything needed to issue or renew privileges after payment capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeIssuanceRequest {
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee.
    pub provider_id: ProviderId,
    /// Jurisdictions purchased.
    pub jurisdictions: Vec<Jurisdiction>,
    /// Expiration of the governing license; copied onto every privilege.
    pub license_expiration: NaiveDate,
    /// Purchase transaction reference.
    pub compact_transaction_id: CompactTransactionId,
    /// The provider row as read before the purchase.
    pub prior_provider: Provider,
    /// Privileges the provider already holds for this license type.
    pub existing_privileges: Vec<Privilege>,
    /// Attestations accepted with this purchase.
    pub attestations: Vec<Attestation>,
    /// License type purchased.
    pub license_type: LicenseTypeAbbreviation,
    /// Purchase time; becomes the renewal date (and issuance date for new
    /// privileges).
    pub purchased_at: Timestamp,
}

impl PrivilegeIssuanceRequest {
    /// Jurisdictions that have no existing privilege and need a number.
    pub fn new_jurisdictions(&self) -> Vec<Jurisdiction> {
        self.jurisdictions
            .iter()
            .filter(|j| self.existing_for(j).is_none())
            .cloned()
            .collect()
    }

    fn existing_for(&self, jurisdiction: &Jurisdiction) -> Option<&Privilege> {
        self.existing_privileges
            .iter()
            .find(|p| &p.jurisdiction == jurisdiction && p.license_type == self.license_type)
    }

    fn validate(&self) -> Result<(), IssuanceError> {
        if self.jurisdictions.is_empty() {
            return Err(IssuanceError::InvalidRequest(
                "no jurisdictions to issue".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for j in &self.jurisdictions {
            if !seen.insert(j) {
                return Err(IssuanceError::InvalidRequest(format!(
                    "jurisdiction {j} appears more than once"
                )));
            }
        }
        if self.prior_provider.provider_id != self.provider_id
            || self.prior_provider.compact != self.compact
        {
            return Err(IssuanceError::InvalidRequest(
                "prior provider record belongs to a different provider".to_string(),
            ));
        }
        Ok(())
    }
}

/// The planned write plus the privileges it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuancePlan {
    /// Mutations and compensations.
    pub operation: Operation,
    /// Privilege rows as they will be after commit, in request order.
    pub privileges: Vec<Privilege>,
    /// Audit rows for renewals.
    pub updates: Vec<PrivilegeUpdate>,
}

/// Fields of `after` that differ from `before`, as a JSON object.
fn changed_fields(before: &Privilege, after: &Privilege) -> Result<Value, IssuanceError> {
    let encode = |p: &Privilege| {
        serde_json::to_value(p).map_err(|e| IssuanceError::InvalidRequest(e.to_string()))
    };
    let (Value::Object(old), Value::Object(new)) = (encode(before)?, encode(after)?) else {
        return Err(IssuanceError::InvalidRequest(
            "privilege did not encode as an object".to_string(),
        ));
    };
    let delta: Map<String, Value> = new
        .into_iter()
        .filter(|(field, value)| old.get(field) != Some(value))
        .collect();
    Ok(Value::Object(delta))
}

/// Plan the issuance write. `numbers` must hold a claimed number for every
/// jurisdiction in [`PrivilegeIssuanceRequest::new_jurisdictions`].
///
/// Pure: no store access.
pub fn plan_issuance(
    request: &PrivilegeIssuanceRequest,
    numbers: &BTreeMap<Jurisdiction, u64>,
) -> Result<IssuancePlan, IssuanceError> {
    request.validate()?;
    let mut operation = Operation::new();
    let mut privileges = Vec::with_capacity(request.jurisdictions.len());
    let mut updates = Vec::new();
    let license_jurisdiction = request.prior_provider.license_jurisdiction.clone();

    for jurisdiction in &request.jurisdictions {
        match request.existing_for(jurisdiction) {
            Some(original) => {
                let renewed = Privilege {
                    license_jurisdiction: license_jurisdiction.clone(),
                    date_of_renewal: request.purchased_at,
                    date_of_expiration: request.license_expiration,
                    compact_transaction_id: request.compact_transaction_id.clone(),
                    attestations: request.attestations.clone(),
                    administrator_set_status: AdministratorStatus::Active,
                    ..original.clone()
                };
                let update = PrivilegeUpdate::new(
                    PrivilegeUpdateType::Renewal,
                    original,
                    changed_fields(original, &renewed)?,
                    request.purchased_at,
                    None,
                )
                .map_err(|e| IssuanceError::InvalidRequest(e.to_string()))?;

                operation.push(
                    Mutation::Put(ProviderRecord::from(renewed.clone()).to_item()?),
                    Some(Mutation::Put(
                        ProviderRecord::from(original.clone()).to_item()?,
                    )),
                );
                let update_item = ProviderRecord::from(update.clone()).to_item()?;
                let update_key = update_item.key.clone();
                operation.push(
                    Mutation::Put(update_item),
                    Some(Mutation::Delete(update_key)),
                );
                privileges.push(renewed);
                updates.push(update);
            }
            None => {
                let number = *numbers.get(jurisdiction).ok_or_else(|| {
                    IssuanceError::InvalidRequest(format!(
                        "no privilege number claimed for {jurisdiction}"
                    ))
                })?;
                let privilege = Privilege {
                    compact: request.compact.clone(),
                    provider_id: request.provider_id,
                    jurisdiction: jurisdiction.clone(),
                    license_jurisdiction: license_jurisdiction.clone(),
                    license_type: request.license_type.clone(),
                    privilege_number: number,
                    privilege_id: privilege_id(&request.license_type, jurisdiction, number),
                    date_of_issuance: request.purchased_at,
                    date_of_renewal: request.purchased_at,
                    date_of_expiration: request.license_expiration,
                    compact_transaction_id: request.compact_transaction_id.clone(),
                    attestations: request.attestations.clone(),
                    administrator_set_status: AdministratorStatus::Active,
                    encumbered_status: EncumberedStatus::Unencumbered,
                };
                let item = ProviderRecord::from(privilege.clone()).to_item()?;
                let key = item.key.clone();
                operation.push(Mutation::Put(item), Some(Mutation::Delete(key)));
                privileges.push(privilege);
            }
        }
    }

    operation.push(
        Mutation::AddToSet {
            key: provider_key(&request.compact, &request.provider_id),
            attribute: PRIVILEGE_JURISDICTIONS_ATTRIBUTE.to_string(),
            values: request
                .jurisdictions
                .iter()
                .map(|j| j.as_str().to_string())
                .collect(),
        },
        None,
    );
    operation.finally(Mutation::Put(
        ProviderRecord::from(request.prior_provider.clone()).to_item()?,
    ));

    Ok(IssuancePlan {
        operation,
        privileges,
        updates,
    })
}

/// Result of a successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceReceipt {
    /// Privilege rows as committed.
    pub privileges: Vec<Privilege>,
    /// Renewal audit rows committed.
    pub updates: Vec<PrivilegeUpdate>,
    /// Transaction batches used.
    pub batches: usize,
}

/// Issues privileges: claims numbers, plans, and commits with rollback.
#[derive(Clone)]
pub struct IssuanceManager {
    store: Arc<dyn RecordStore>,
    numbering: PrivilegeNumberService,
    config: EngineConfig,
}

impl std::fmt::Debug for IssuanceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuanceManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IssuanceManager {
    /// Build a manager over `store`.
    pub fn new(store: Arc<dyn RecordStore>, config: EngineConfig) -> Self {
        Self {
            numbering: PrivilegeNumberService::new(store.clone()),
            store,
            config,
        }
    }

    /// Issue or renew every requested privilege, or none.
    ///
    /// # Errors
    ///
    /// Any failure leaves the aggregate as it was, except
    /// [`IssuanceError::RollbackFailed`]. Claimed numbers are not returned.
    pub fn issue_privileges(
        &self,
        request: &PrivilegeIssuanceRequest,
    ) -> Result<IssuanceReceipt, IssuanceError> {
        request.validate()?;
        let mut numbers = BTreeMap::new();
        for jurisdiction in request.new_jurisdictions() {
            let number = self.numbering.claim_number(&request.compact)?;
            numbers.insert(jurisdiction, number);
        }

        let plan = plan_issuance(request, &numbers)?;
        let batch_size = self.config.transaction_batch_size;
        tracing::info!(
            compact = %request.compact,
            provider_id = %request.provider_id,
            transaction = %request.compact_transaction_id,
            jurisdictions = request.jurisdictions.len(),
            new = numbers.len(),
            mutations = plan.operation.len(),
            batches = plan.operation.batch_count(batch_size),
            "issuing privileges"
        );

        let report = commit_with_rollback(self.store.as_ref(), &plan.operation, batch_size)
            .map_err(|e| {
                tracing::error!(
                    compact = %request.compact,
                    provider_id = %request.provider_id,
                    transaction = %request.compact_transaction_id,
                    error = %e,
                    "privilege issuance failed"
                );
                e
            })?;

        Ok(IssuanceReceipt {
            privileges: plan.privileges,
            updates: plan.updates,
            batches: report.batches,
        })
    }
}
