//! Shared fixtures for the integration suite.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use compact_core::{
    AdverseActionId, CompactCode, CompactTransactionId, Jurisdiction, LicenseTypeAbbreviation,
    LicenseTypeRegistry, ProviderId, Timestamp,
};
use compact_privilege::{
    EngineConfig, InMemoryEventBus, PrivilegeEngine, PurchaseRequest,
    RecordingNotificationSender,
};
use compact_state::{
    CompactEligibility, EncumberedStatus, EncumbranceEvent, License, LicenseStatus, Provider,
    ProviderRecord,
};
use compact_store::{FaultInjectingStore, InMemoryRecordStore, Item, PutCondition, RecordStore};

pub fn compact() -> CompactCode {
    CompactCode::new("octp").unwrap()
}

pub fn ot() -> LicenseTypeAbbreviation {
    LicenseTypeAbbreviation::new("ot").unwrap()
}

pub fn jur(s: &str) -> Jurisdiction {
    Jurisdiction::new(s).unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn ts(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

pub fn provider_id() -> ProviderId {
    ProviderId::parse("c2b1f4d8-6a0e-4f3b-9d27-8e5a1c0b7f42").unwrap()
}

pub fn provider(home: &str) -> Provider {
    Provider {
        compact: compact(),
        provider_id: provider_id(),
        given_name: "Morgan".to_string(),
        family_name: "Achebe".to_string(),
        email_address: Some("morgan.achebe@example.org".to_string()),
        license_jurisdiction: jur(home),
        privilege_jurisdictions: BTreeSet::new(),
        date_of_update: ts("2024-01-01T00:00:00Z"),
    }
}

pub fn license(
    jurisdiction: &str,
    issued: &str,
    renewed: Option<&str>,
    expires: &str,
) -> License {
    License {
        compact: compact(),
        provider_id: provider_id(),
        jurisdiction: jur(jurisdiction),
        license_type: ot(),
        license_number: Some(format!("{}-1001", jurisdiction.to_uppercase())),
        date_of_issuance: date(issued),
        date_of_renewal: renewed.map(date),
        date_of_expiration: date(expires),
        license_status: LicenseStatus::Active,
        compact_eligibility: CompactEligibility::Eligible,
        encumbered_status: EncumberedStatus::Unencumbered,
    }
}

pub fn purchase(jurisdictions: &[&str], txn: &str, at: &str) -> PurchaseRequest {
    PurchaseRequest {
        compact: compact(),
        provider_id: provider_id(),
        license_type: ot(),
        jurisdictions: jurisdictions.iter().map(|j| jur(j)).collect(),
        compact_transaction_id: CompactTransactionId::new(txn).unwrap(),
        attestations: vec![],
        purchased_at: ts(at),
    }
}

pub fn license_event(
    license_jurisdiction: &str,
    adverse_action_id: AdverseActionId,
    effective: &str,
    at: &str,
) -> EncumbranceEvent {
    EncumbranceEvent {
        compact: compact(),
        provider_id: provider_id(),
        jurisdiction: jur(license_jurisdiction),
        license_type: ot(),
        adverse_action_id,
        effective_date: date(effective),
        event_time: ts(at),
    }
}

/// An engine over in-memory adapters, with the raw store kept for
/// inspection.
pub struct World {
    pub inner: InMemoryRecordStore,
    pub store: Arc<FaultInjectingStore<InMemoryRecordStore>>,
    pub bus: Arc<InMemoryEventBus>,
    pub sender: Arc<RecordingNotificationSender>,
    pub engine: PrivilegeEngine,
}

impl World {
    pub fn new() -> Self {
        Self::with(EngineConfig::immediate(), |s| s)
    }

    pub fn with(
        config: EngineConfig,
        faults: impl FnOnce(
            FaultInjectingStore<InMemoryRecordStore>,
        ) -> FaultInjectingStore<InMemoryRecordStore>,
    ) -> Self {
        let inner = InMemoryRecordStore::new();
        let store = Arc::new(faults(FaultInjectingStore::new(inner.clone())));
        let bus = Arc::new(InMemoryEventBus::new());
        let sender = Arc::new(RecordingNotificationSender::new());
        let engine = PrivilegeEngine::new(
            store.clone(),
            bus.clone(),
            sender.clone(),
            LicenseTypeRegistry::builtin(),
            config,
        );
        Self {
            inner,
            store,
            bus,
            sender,
            engine,
        }
    }

    pub fn seed(&self, records: impl IntoIterator<Item = ProviderRecord>) {
        for record in records {
            self.inner
                .put_item(record.to_item().unwrap(), PutCondition::Always)
                .unwrap();
        }
    }

    /// Every stored item except the privilege counter, which is allowed to
    /// advance across a failed purchase.
    pub fn records(&self) -> Vec<Item> {
        self.inner
            .dump()
            .into_iter()
            .filter(|item| !item.key.pk.ends_with("#PRIVILEGE_COUNT"))
            .collect()
    }

    /// Every stored item in the provider partition.
    pub fn provider_records(&self) -> Vec<Item> {
        self.inner
            .dump()
            .into_iter()
            .filter(|item| item.key.pk.contains("#PROVIDER#"))
            .collect()
    }

    /// Every stored item in the notification ledger.
    pub fn ledger(&self) -> Vec<Item> {
        self.inner
            .dump()
            .into_iter()
            .filter(|item| item.key.pk.contains("#NOTIFICATION#"))
            .collect()
    }
}
