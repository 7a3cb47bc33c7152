//! # Encumbrance Cascade Handlers
//!
//! The I/O shell around the pure state machine in `compact_state::cascade`.
//! Each handler:
//!
//! 1. reads the provider partition with one prefix query;
//! 2. runs the transition;
//! 3. commits each privilege's records as one atomic transaction;
//! 4. publishes the resulting events through the [`EventBatchWriter`].
//!
//! A store failure in step 3 is returned as-is; the next delivery of the
//! same event re-reads the partition and writes only what is still
//! missing. A publish failure in step 4 leaves the writes in place and is
//! returned so the queue redelivers; the replay writes nothing and
//! publishes again.

use std::sync::Arc;

use chrono::NaiveDate;
use compact_core::keys::{provider_partition, provider_records_prefix};
use compact_core::{
    AdverseActionId, CompactCode, Jurisdiction, LicenseTypeAbbreviation, ProviderId, Timestamp,
};
use compact_state::{
    apply_license_encumbrance, apply_privilege_encumbrance, deactivate_privilege,
    lift_license_encumbrance, lift_privilege_encumbrance, AdverseAction, CascadeOutcome,
    EncumbranceEvent, ProviderSnapshot,
};
use compact_store::{Mutation, RecordStore, StoreError};

use crate::error::CascadeHandlerError;
use crate::publisher::EventBatchWriter;

/// Read a provider's whole partition.
pub fn load_snapshot(
    store: &dyn RecordStore,
    compact: &CompactCode,
    provider_id: &ProviderId,
) -> Result<ProviderSnapshot, CascadeHandlerError> {
    let items = store.query(
        &provider_partition(compact, provider_id),
        &provider_records_prefix(compact),
    )?;
    Ok(ProviderSnapshot::from_items(*provider_id, &items)?)
}

/// What one handler invocation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Privilege transactions committed.
    pub transactions: usize,
    /// Privileges whose status changed.
    pub transitioned: usize,
    /// Events published.
    pub published: usize,
}

/// Runs cascade transitions against a store and publishes their events.
#[derive(Clone)]
pub struct CascadeHandler {
    store: Arc<dyn RecordStore>,
    writer: EventBatchWriter,
}

impl std::fmt::Debug for CascadeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeHandler")
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl CascadeHandler {
    /// Build a handler.
    pub fn new(store: Arc<dyn RecordStore>, writer: EventBatchWriter) -> Self {
        Self { store, writer }
    }

    /// A license was encumbered.
    pub fn handle_license_encumbrance(
        &self,
        event: &EncumbranceEvent,
    ) -> Result<CascadeReport, CascadeHandlerError> {
        let span = tracing::info_span!(
            "license_encumbrance",
            compact = %event.compact,
            provider_id = %event.provider_id,
            jurisdiction = %event.jurisdiction,
            adverse_action_id = %event.adverse_action_id,
        );
        let _guard = span.enter();
        let snapshot = load_snapshot(self.store.as_ref(), &event.compact, &event.provider_id)?;
        let outcome = apply_license_encumbrance(&snapshot, event)?;
        self.persist_and_publish(outcome)
    }

    /// A license encumbrance was lifted.
    pub fn handle_license_encumbrance_lifted(
        &self,
        event: &EncumbranceEvent,
    ) -> Result<CascadeReport, CascadeHandlerError> {
        let span = tracing::info_span!(
            "license_encumbrance_lifted",
            compact = %event.compact,
            provider_id = %event.provider_id,
            jurisdiction = %event.jurisdiction,
            adverse_action_id = %event.adverse_action_id,
        );
        let _guard = span.enter();
        let snapshot = load_snapshot(self.store.as_ref(), &event.compact, &event.provider_id)?;
        let outcome = lift_license_encumbrance(&snapshot, event)?;
        self.persist_and_publish(outcome)
    }

    /// A direct adverse action against a privilege.
    pub fn handle_privilege_encumbrance(
        &self,
        action: &AdverseAction,
    ) -> Result<CascadeReport, CascadeHandlerError> {
        let snapshot = load_snapshot(self.store.as_ref(), &action.compact, &action.provider_id)?;
        let outcome = apply_privilege_encumbrance(&snapshot, action)?;
        self.persist_and_publish(outcome)
    }

    /// A direct privilege adverse action was lifted.
    pub fn handle_privilege_encumbrance_lifted(
        &self,
        compact: &CompactCode,
        provider_id: &ProviderId,
        adverse_action_id: &AdverseActionId,
        lift_date: NaiveDate,
        event_time: Timestamp,
    ) -> Result<CascadeReport, CascadeHandlerError> {
        let snapshot = load_snapshot(self.store.as_ref(), compact, provider_id)?;
        let outcome =
            lift_privilege_encumbrance(&snapshot, adverse_action_id, lift_date, event_time)?;
        self.persist_and_publish(outcome)
    }

    /// An administrator deactivated a privilege.
    pub fn handle_privilege_deactivation(
        &self,
        compact: &CompactCode,
        provider_id: &ProviderId,
        jurisdiction: &Jurisdiction,
        license_type: &LicenseTypeAbbreviation,
        at: Timestamp,
    ) -> Result<CascadeReport, CascadeHandlerError> {
        let snapshot = load_snapshot(self.store.as_ref(), compact, provider_id)?;
        let outcome = deactivate_privilege(&snapshot, jurisdiction, license_type, at)?;
        self.persist_and_publish(outcome)
    }

    fn persist_and_publish(
        &self,
        outcome: CascadeOutcome,
    ) -> Result<CascadeReport, CascadeHandlerError> {
        let mut report = CascadeReport {
            transitioned: outcome.transitioned(),
            ..CascadeReport::default()
        };
        for write in &outcome.writes {
            let mutations = write
                .records
                .iter()
                .map(|r| r.to_item().map(Mutation::Put))
                .collect::<Result<Vec<_>, StoreError>>()?;
            self.store.transact_write(&mutations).map_err(|e| {
                tracing::warn!(
                    jurisdiction = %write.jurisdiction,
                    license_type = %write.license_type,
                    error = %e,
                    "cascade write failed"
                );
                e
            })?;
            report.transactions += 1;
        }
        report.published = self.writer.write_all(&outcome.events)?;
        tracing::info!(
            transactions = report.transactions,
            transitioned = report.transitioned,
            published = report.published,
            "cascade applied"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::InMemoryEventBus;
    use compact_core::SubjectType;
    use compact_state::{
        privilege_id, AdministratorStatus, CompactEligibility, EncumberedStatus, License,
        LicenseStatus, Privilege, PrivilegeEventKind, Provider, ProviderRecord,
    };
    use compact_store::{FaultInjectingStore, InMemoryRecordStore, PutCondition};

    fn jur(s: &str) -> Jurisdiction {
        Jurisdiction::new(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn compact() -> CompactCode {
        CompactCode::new("aslp").unwrap()
    }

    fn provider_id() -> ProviderId {
        ProviderId::parse("0a8f9e7c-8d0b-4bb4-8f43-5d0f6a3fb0a1").unwrap()
    }

    fn aud() -> LicenseTypeAbbreviation {
        LicenseTypeAbbreviation::new("aud").unwrap()
    }

    fn seed(store: &InMemoryRecordStore, privileges: &[&str]) {
        let ts = Timestamp::parse("2024-01-01T00:00:00Z").unwrap();
        let mut records = vec![
            ProviderRecord::Provider(Provider {
                compact: compact(),
                provider_id: provider_id(),
                given_name: "Sam".to_string(),
                family_name: "Okafor".to_string(),
                email_address: None,
                license_jurisdiction: jur("oh"),
                privilege_jurisdictions: privileges.iter().map(|j| jur(j)).collect(),
                date_of_update: ts,
            }),
            ProviderRecord::License(License {
                compact: compact(),
                provider_id: provider_id(),
                jurisdiction: jur("oh"),
                license_type: aud(),
                license_number: None,
                date_of_issuance: date("2020-01-01"),
                date_of_renewal: None,
                date_of_expiration: date("2026-04-04"),
                license_status: LicenseStatus::Active,
                compact_eligibility: CompactEligibility::Eligible,
                encumbered_status: EncumberedStatus::Encumbered,
            }),
        ];
        for (n, j) in privileges.iter().enumerate() {
            records.push(ProviderRecord::Privilege(Privilege {
                compact: compact(),
                provider_id: provider_id(),
                jurisdiction: jur(j),
                license_jurisdiction: jur("oh"),
                license_type: aud(),
                privilege_number: n as u64 + 1,
                privilege_id: privilege_id(&aud(), &jur(j), n as u64 + 1),
                date_of_issuance: ts,
                date_of_renewal: ts,
                date_of_expiration: date("2026-04-04"),
                compact_transaction_id: compact_core::CompactTransactionId::new("t").unwrap(),
                attestations: vec![],
                administrator_set_status: AdministratorStatus::Active,
                encumbered_status: EncumberedStatus::Unencumbered,
            }));
        }
        for r in records {
            store.put_item(r.to_item().unwrap(), PutCondition::Always).unwrap();
        }
    }

    fn event(id: AdverseActionId, effective: &str) -> EncumbranceEvent {
        EncumbranceEvent {
            compact: compact(),
            provider_id: provider_id(),
            jurisdiction: jur("oh"),
            license_type: aud(),
            adverse_action_id: id,
            effective_date: date(effective),
            event_time: Timestamp::parse("2024-02-01T08:00:00Z").unwrap(),
        }
    }

    #[test]
    fn encumbrance_persists_and_publishes() {
        let store = Arc::new(InMemoryRecordStore::new());
        seed(&store, &["ky", "ne"]);
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = CascadeHandler::new(store.clone(), EventBatchWriter::new(bus.clone(), 10));
        let report = handler
            .handle_license_encumbrance(&event(AdverseActionId::new(), "2024-02-01"))
            .unwrap();
        assert_eq!(report.transactions, 2);
        assert_eq!(report.transitioned, 2);
        assert_eq!(report.published, 2);
        let snapshot = load_snapshot(store.as_ref(), &compact(), &provider_id()).unwrap();
        assert!(snapshot.privileges.iter().all(|p| p.is_encumbered()));
        assert_eq!(snapshot.privilege_updates.len(), 2);
    }

    #[test]
    fn publish_failure_keeps_writes_and_replay_republishes() {
        let store = Arc::new(InMemoryRecordStore::new());
        seed(&store, &["ky"]);
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = CascadeHandler::new(store.clone(), EventBatchWriter::new(bus.clone(), 10));
        let e = event(AdverseActionId::new(), "2024-02-01");

        bus.fail_next(1);
        let err = handler.handle_license_encumbrance(&e).unwrap_err();
        assert!(matches!(err, CascadeHandlerError::Publish(_)));
        let after_first = store.dump();

        let report = handler.handle_license_encumbrance(&e).unwrap();
        assert_eq!(report.transactions, 0);
        assert_eq!(report.published, 1);
        assert_eq!(store.dump(), after_first);
        assert_eq!(bus.events()[0].kind, PrivilegeEventKind::PrivilegeEncumbered);
    }

    #[test]
    fn store_failure_midway_resumes_on_redelivery() {
        let inner = InMemoryRecordStore::new();
        seed(&inner, &["ky", "ne"]);
        let faulty = Arc::new(FaultInjectingStore::new(inner.clone()).fail_transaction(2));
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = CascadeHandler::new(faulty.clone(), EventBatchWriter::new(bus.clone(), 10));
        let e = event(AdverseActionId::new(), "2024-02-01");

        assert!(matches!(
            handler.handle_license_encumbrance(&e),
            Err(CascadeHandlerError::Store(_))
        ));
        assert!(bus.events().is_empty());

        let report = handler.handle_license_encumbrance(&e).unwrap();
        assert_eq!(report.transactions, 1);
        assert_eq!(report.published, 2);
        let snapshot = load_snapshot(&inner, &compact(), &provider_id()).unwrap();
        assert!(snapshot.privileges.iter().all(|p| p.is_encumbered()));
    }

    #[test]
    fn direct_actions_and_deactivation_go_through_the_store() {
        let store = Arc::new(InMemoryRecordStore::new());
        seed(&store, &["ky"]);
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = CascadeHandler::new(store.clone(), EventBatchWriter::new(bus.clone(), 10));
        let action = AdverseAction {
            compact: compact(),
            provider_id: provider_id(),
            adverse_action_id: AdverseActionId::new(),
            action_against: SubjectType::Privilege,
            jurisdiction: jur("ky"),
            license_type: aud(),
            encumbrance_type: Some("probation".to_string()),
            effective_start_date: date("2024-05-01"),
            effective_lift_date: None,
            source_adverse_action_id: None,
            creation_date: Timestamp::parse("2024-05-01T00:00:00Z").unwrap(),
        };
        handler.handle_privilege_encumbrance(&action).unwrap();
        handler
            .handle_privilege_encumbrance_lifted(
                &compact(),
                &provider_id(),
                &action.adverse_action_id,
                date("2024-06-01"),
                Timestamp::parse("2024-06-01T00:00:00Z").unwrap(),
            )
            .unwrap();
        handler
            .handle_privilege_deactivation(
                &compact(),
                &provider_id(),
                &jur("ky"),
                &aud(),
                Timestamp::parse("2024-07-01T00:00:00Z").unwrap(),
            )
            .unwrap();
        let kinds: Vec<_> = bus.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PrivilegeEventKind::PrivilegeEncumbered,
                PrivilegeEventKind::PrivilegeEncumbranceLifted,
                PrivilegeEventKind::PrivilegeDeactivated,
            ]
        );
        let snapshot = load_snapshot(store.as_ref(), &compact(), &provider_id()).unwrap();
        assert_eq!(snapshot.privilege_updates.len(), 3);
    }
}
