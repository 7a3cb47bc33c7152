//! # Privilege Engine
//!
//! One handle over the store, event bus and notification sender that wires
//! the purchase path, the cascade handlers and the notification dispatcher
//! together the way the event listeners call them:
//!
//! ```text
//! purchase ──► PurchaseService ──► IssuanceManager ──► store
//! license.encumbrance ──► CascadeHandler ──► store, event bus
//!                     └─► NotificationDispatcher ──► ledger, sender
//! privilege.* (from bus) ──► NotificationDispatcher
//! ```
//!
//! Every entry point is safe to call again with the same input.

use std::sync::Arc;

use chrono::NaiveDate;
use compact_core::{
    AdverseActionId, CompactCode, Jurisdiction, LicenseTypeAbbreviation, LicenseTypeRegistry,
    ProviderId, Timestamp,
};
use compact_state::{
    AdverseAction, EncumbranceEvent, LicenseEventKind, PrivilegeEvent, Provider,
    ProviderSnapshot,
};
use compact_store::RecordStore;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::handlers::{load_snapshot, CascadeHandler, CascadeReport};
use crate::issuance::IssuanceReceipt;
use crate::notification::{
    DispatchReport, NotificationDispatcher, NotificationSender, NotificationTracker,
};
use crate::publisher::{EventBatchWriter, EventPublisher};
use crate::purchase::{register_provider, PurchaseRequest, PurchaseService};

/// Result of handling one license event end to end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LicenseEventReport {
    /// Cascade writes and published events.
    pub cascade: CascadeReport,
    /// Stakeholder notifications.
    pub notifications: DispatchReport,
}

/// The engine façade.
#[derive(Clone)]
pub struct PrivilegeEngine {
    store: Arc<dyn RecordStore>,
    purchases: PurchaseService,
    cascade: CascadeHandler,
    notifications: NotificationDispatcher,
}

impl std::fmt::Debug for PrivilegeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegeEngine")
            .field("purchases", &self.purchases)
            .field("cascade", &self.cascade)
            .field("notifications", &self.notifications)
            .finish_non_exhaustive()
    }
}

impl PrivilegeEngine {
    /// Wire an engine over its collaborators.
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: Arc<dyn EventPublisher>,
        sender: Arc<dyn NotificationSender>,
        registry: LicenseTypeRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            purchases: PurchaseService::new(store.clone(), registry.clone(), config),
            cascade: CascadeHandler::new(
                store.clone(),
                EventBatchWriter::new(publisher, config.event_batch_size),
            ),
            notifications: NotificationDispatcher::new(
                NotificationTracker::new(store.clone()),
                sender,
                registry,
            ),
            store,
        }
    }

    /// Create the provider row unless it exists. Returns the stored row and
    /// whether this call created it.
    pub fn register_provider(&self, provider: &Provider) -> Result<(Provider, bool), EngineError> {
        Ok(register_provider(self.store.as_ref(), provider)?)
    }

    /// Validate and issue a purchase.
    pub fn purchase_privileges(
        &self,
        request: &PurchaseRequest,
    ) -> Result<IssuanceReceipt, EngineError> {
        Ok(self.purchases.purchase_privileges(request)?)
    }

    /// Cascade a license encumbrance and notify stakeholders.
    pub fn handle_license_encumbrance(
        &self,
        event: &EncumbranceEvent,
    ) -> Result<LicenseEventReport, EngineError> {
        let cascade = self.cascade.handle_license_encumbrance(event)?;
        self.notify_license(LicenseEventKind::LicenseEncumbrance, event, cascade)
    }

    /// Cascade a license encumbrance lift and notify stakeholders.
    pub fn handle_license_encumbrance_lifted(
        &self,
        event: &EncumbranceEvent,
    ) -> Result<LicenseEventReport, EngineError> {
        let cascade = self.cascade.handle_license_encumbrance_lifted(event)?;
        self.notify_license(LicenseEventKind::LicenseEncumbranceLifted, event, cascade)
    }

    /// Record a direct privilege adverse action.
    pub fn handle_privilege_encumbrance(
        &self,
        action: &AdverseAction,
    ) -> Result<CascadeReport, EngineError> {
        Ok(self.cascade.handle_privilege_encumbrance(action)?)
    }

    /// Lift a direct privilege adverse action.
    pub fn handle_privilege_encumbrance_lifted(
        &self,
        compact: &CompactCode,
        provider_id: &ProviderId,
        adverse_action_id: &AdverseActionId,
        lift_date: NaiveDate,
        event_time: Timestamp,
    ) -> Result<CascadeReport, EngineError> {
        Ok(self.cascade.handle_privilege_encumbrance_lifted(
            compact,
            provider_id,
            adverse_action_id,
            lift_date,
            event_time,
        )?)
    }

    /// Deactivate a privilege.
    pub fn deactivate_privilege(
        &self,
        compact: &CompactCode,
        provider_id: &ProviderId,
        jurisdiction: &Jurisdiction,
        license_type: &LicenseTypeAbbreviation,
        at: Timestamp,
    ) -> Result<CascadeReport, EngineError> {
        Ok(self
            .cascade
            .handle_privilege_deactivation(compact, provider_id, jurisdiction, license_type, at)?)
    }

    /// Notify stakeholders of a privilege event taken off the bus.
    pub fn handle_privilege_event(
        &self,
        event: &PrivilegeEvent,
    ) -> Result<DispatchReport, EngineError> {
        let provider = self.provider(&event.compact, &event.provider_id)?;
        Ok(self.notifications.notify_privilege_event(event, &provider)?)
    }

    /// The provider's whole partition.
    pub fn snapshot(
        &self,
        compact: &CompactCode,
        provider_id: &ProviderId,
    ) -> Result<ProviderSnapshot, EngineError> {
        Ok(load_snapshot(self.store.as_ref(), compact, provider_id)?)
    }

    /// The notification dispatcher.
    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    fn provider(
        &self,
        compact: &CompactCode,
        provider_id: &ProviderId,
    ) -> Result<Provider, EngineError> {
        Ok(self.snapshot(compact, provider_id)?.provider)
    }

    fn notify_license(
        &self,
        kind: LicenseEventKind,
        event: &EncumbranceEvent,
        cascade: CascadeReport,
    ) -> Result<LicenseEventReport, EngineError> {
        let provider = self.provider(&event.compact, &event.provider_id)?;
        let notifications = self
            .notifications
            .notify_license_event(kind, event, &provider)?;
        Ok(LicenseEventReport {
            cascade,
            notifications,
        })
    }
}
