//! # Notification Delivery Tracker
//!
//! Event delivery is at-least-once: the queue redelivers a message until
//! its handler returns success. One license encumbrance fans out to the
//! licensee plus one message per affected jurisdiction, so a redelivery
//! after a partial failure must not re-notify the recipients that were
//! already reached.
//!
//! The ledger lives in its own partition per provider:
//!
//! ```text
//! pk: {compact}#NOTIFICATION#{provider_id}
//! sk: EVENT#{event_type}#{event_time}#RECIPIENT#{class}#{id}
//! ```
//!
//! `event_type` is qualified with the event's subject: the license and
//! adverse action for license events (`license.encumbrance/ne/ot/{id}`),
//! the privilege and, when present, the adverse action for privilege
//! events (`privilege.encumbrance/ky/ot/{id}`). Event times are kept to the
//! second, and one regulator upload or one cascade produces several events
//! sharing a type, a time and the licensee.
//!
//! A `success` row is final and suppresses every later attempt. A `failed`
//! row only counts attempts; it never suppresses a retry and never
//! overwrites a success.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use compact_core::keys::notification_partition;
use compact_core::{
    CompactCode, ItemKey, Jurisdiction, LicenseTypeRegistry, ProviderId, Timestamp,
};
use compact_state::{EncumbranceEvent, LicenseEventKind, PrivilegeEvent, Provider};
use compact_store::{Item, PutCondition, RecordStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::NotificationError;

// ─── Ledger ──────────────────────────────────────────────────────────

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "class", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    /// The licensee, at their registered address.
    Provider(ProviderId),
    /// A member jurisdiction's licensing board.
    Jurisdiction(Jurisdiction),
}

impl Recipient {
    /// Recipient class as it appears in ledger keys.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider",
            Self::Jurisdiction(_) => "jurisdiction",
        }
    }

    /// Recipient identifier as it appears in ledger keys.
    pub fn id(&self) -> String {
        match self {
            Self::Provider(id) => id.to_string(),
            Self::Jurisdiction(j) => j.to_string(),
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.class(), self.id())
    }
}

/// Identity of one notification attempt: which logical event, to whom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryKey {
    /// Owning compact.
    pub compact: CompactCode,
    /// Subject licensee.
    pub provider_id: ProviderId,
    /// Event detail type, e.g. `license.encumbrance`.
    pub event_type: String,
    /// Narrows `event_type` to one subject, e.g. `ky/ot/{adverse_action_id}`.
    pub subject: Option<String>,
    /// Time of the originating event. Stable across redelivery.
    pub event_time: Timestamp,
    /// Addressee.
    pub recipient: Recipient,
}

impl DeliveryKey {
    /// Key for one recipient of a license event.
    pub fn for_license_event(
        kind: LicenseEventKind,
        event: &EncumbranceEvent,
        recipient: Recipient,
    ) -> Self {
        Self {
            compact: event.compact.clone(),
            provider_id: event.provider_id,
            event_type: kind.as_str().to_string(),
            subject: Some(license_event_subject(event)),
            event_time: event.event_time,
            recipient,
        }
    }

    /// Key for one recipient of a privilege event.
    pub fn for_privilege_event(event: &PrivilegeEvent, recipient: Recipient) -> Self {
        Self {
            compact: event.compact.clone(),
            provider_id: event.provider_id,
            event_type: event.kind.as_str().to_string(),
            subject: Some(privilege_event_subject(event)),
            event_time: event.event_time,
            recipient,
        }
    }

    /// Ledger row key.
    pub fn item_key(&self) -> ItemKey {
        let event_type = match &self.subject {
            Some(subject) => format!("{}/{subject}", self.event_type),
            None => self.event_type.clone(),
        };
        ItemKey::new(
            notification_partition(&self.compact, &self.provider_id),
            format!(
                "EVENT#{}#{}#RECIPIENT#{}#{}",
                event_type,
                self.event_time.to_iso8601(),
                self.recipient.class(),
                self.recipient.id()
            ),
        )
    }
}

fn license_event_subject(event: &EncumbranceEvent) -> String {
    format!(
        "{}/{}/{}",
        event.jurisdiction, event.license_type, event.adverse_action_id
    )
}

fn privilege_event_subject(event: &PrivilegeEvent) -> String {
    match &event.adverse_action_id {
        Some(id) => format!("{}/{}/{id}", event.jurisdiction, event.license_type),
        None => format!("{}/{}", event.jurisdiction, event.license_type),
    }
}

/// Outcome recorded for a delivery key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Delivered. Final.
    Success,
    /// Last attempt failed. Retried on redelivery.
    Failed,
}

impl DeliveryStatus {
    /// Ledger string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Event detail type.
    pub event_type: String,
    /// Time of the originating event.
    pub event_time: Timestamp,
    /// Addressee.
    pub recipient: Recipient,
    /// Latest outcome.
    pub status: DeliveryStatus,
    /// Attempts recorded so far.
    pub attempts: u32,
    /// Sender's reason for the latest failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the row was last written.
    pub updated_at: Timestamp,
}

/// Reads and writes the notification ledger.
///
/// Every call is a single-item read or put; there is no transaction.
#[derive(Clone)]
pub struct NotificationTracker {
    store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for NotificationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationTracker").finish_non_exhaustive()
    }
}

impl NotificationTracker {
    /// Tracker over `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// The ledger row for `key`, if any.
    pub fn entry(&self, key: &DeliveryKey) -> Result<Option<LedgerEntry>, NotificationError> {
        Ok(self
            .store
            .get_item(&key.item_key())?
            .map(|item| item.decode::<LedgerEntry>())
            .transpose()?)
    }

    /// False only when a success is already recorded.
    pub fn should_send(&self, key: &DeliveryKey) -> Result<bool, NotificationError> {
        Ok(!matches!(
            self.entry(key)?,
            Some(LedgerEntry {
                status: DeliveryStatus::Success,
                ..
            })
        ))
    }

    /// Record a delivered notification.
    pub fn record_success(&self, key: &DeliveryKey, at: Timestamp) -> Result<(), NotificationError> {
        let attempts = self.entry(key)?.map_or(0, |e| e.attempts);
        self.write(
            key,
            LedgerEntry {
                event_type: key.event_type.clone(),
                event_time: key.event_time,
                recipient: key.recipient.clone(),
                status: DeliveryStatus::Success,
                attempts: attempts + 1,
                last_error: None,
                updated_at: at,
            },
        )
    }

    /// Record a failed attempt. A recorded success is left untouched.
    pub fn record_failure(
        &self,
        key: &DeliveryKey,
        reason: &str,
        at: Timestamp,
    ) -> Result<(), NotificationError> {
        let attempts = match self.entry(key)? {
            Some(existing) if existing.status == DeliveryStatus::Success => {
                tracing::debug!(recipient = %key.recipient, "failure after recorded success ignored");
                return Ok(());
            }
            Some(existing) => existing.attempts,
            None => 0,
        };
        self.write(
            key,
            LedgerEntry {
                event_type: key.event_type.clone(),
                event_time: key.event_time,
                recipient: key.recipient.clone(),
                status: DeliveryStatus::Failed,
                attempts: attempts + 1,
                last_error: Some(reason.to_string()),
                updated_at: at,
            },
        )
    }

    fn write(&self, key: &DeliveryKey, entry: LedgerEntry) -> Result<(), NotificationError> {
        let item = Item::encode(key.item_key(), &entry)?;
        self.store.put_item(item, PutCondition::Always)?;
        Ok(())
    }
}

// ─── Sender ──────────────────────────────────────────────────────────

/// A rendered request to the external notification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    /// Addressee.
    pub recipient: Recipient,
    /// Template name, `{event_type}.{recipient_class}`.
    pub template: String,
    /// Template variables.
    pub variables: BTreeMap<String, String>,
}

/// Notification service adapter.
pub trait NotificationSender: Send + Sync {
    /// Deliver one message.
    fn send(&self, message: &NotificationMessage) -> Result<(), NotificationError>;
}

/// Sender double that records every attempt and fails for chosen
/// recipients.
#[derive(Debug, Default)]
pub struct RecordingNotificationSender {
    attempts: Mutex<Vec<NotificationMessage>>,
    failing: Mutex<BTreeSet<Recipient>>,
}

impl RecordingNotificationSender {
    /// Sender that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every message to `recipient` until [`heal`](Self::heal).
    pub fn fail_for(&self, recipient: Recipient) {
        self.failing.lock().insert(recipient);
    }

    /// Stop refusing.
    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    /// Every attempt, successful or not, in order.
    pub fn attempts(&self) -> Vec<NotificationMessage> {
        self.attempts.lock().clone()
    }

    /// Attempts that were accepted.
    pub fn delivered(&self) -> Vec<NotificationMessage> {
        let failing = self.failing.lock();
        self.attempts
            .lock()
            .iter()
            .filter(|m| !failing.contains(&m.recipient))
            .cloned()
            .collect()
    }
}

impl NotificationSender for RecordingNotificationSender {
    fn send(&self, message: &NotificationMessage) -> Result<(), NotificationError> {
        self.attempts.lock().push(message.clone());
        if self.failing.lock().contains(&message.recipient) {
            return Err(NotificationError::Send {
                recipient: message.recipient.to_string(),
                reason: "injected sender failure".to_string(),
            });
        }
        Ok(())
    }
}

// ─── Dispatcher ──────────────────────────────────────────────────────

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages accepted by the sender.
    pub sent: usize,
    /// Recipients skipped because the ledger already records success.
    pub suppressed: usize,
    /// Recipients the sender refused.
    pub failed: usize,
}

impl DispatchReport {
    /// Sender calls made.
    pub fn attempted(&self) -> usize {
        self.sent + self.failed
    }
}

/// Fans events out to their stakeholders through the tracker.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tracker: NotificationTracker,
    sender: Arc<dyn NotificationSender>,
    registry: LicenseTypeRegistry,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Build a dispatcher.
    pub fn new(
        tracker: NotificationTracker,
        sender: Arc<dyn NotificationSender>,
        registry: LicenseTypeRegistry,
    ) -> Self {
        Self {
            tracker,
            sender,
            registry,
        }
    }

    /// The underlying ledger.
    pub fn tracker(&self) -> &NotificationTracker {
        &self.tracker
    }

    /// Notify the licensee, the license jurisdiction and every jurisdiction
    /// the licensee holds a privilege in.
    ///
    /// # Errors
    ///
    /// [`NotificationError::DeliveryFailed`] when any recipient was not
    /// reached. Successes are already recorded, so redelivery retries only
    /// the failures.
    pub fn notify_license_event(
        &self,
        kind: LicenseEventKind,
        event: &EncumbranceEvent,
        provider: &Provider,
    ) -> Result<DispatchReport, NotificationError> {
        let mut recipients = vec![
            Recipient::Provider(event.provider_id),
            Recipient::Jurisdiction(event.jurisdiction.clone()),
        ];
        recipients.extend(
            provider
                .privilege_jurisdictions
                .iter()
                .filter(|j| **j != event.jurisdiction)
                .cloned()
                .map(Recipient::Jurisdiction),
        );
        let mut variables = self.common_variables(provider, &event.license_type);
        variables.insert("jurisdiction".to_string(), event.jurisdiction.to_string());
        variables.insert(
            "effective_date".to_string(),
            event.effective_date.format("%Y-%m-%d").to_string(),
        );
        variables.insert(
            "adverse_action_id".to_string(),
            event.adverse_action_id.to_string(),
        );
        self.dispatch(
            &event.compact,
            &event.provider_id,
            kind.as_str(),
            Some(license_event_subject(event)),
            event.event_time,
            &recipients,
            &variables,
        )
    }

    /// Notify the licensee and the privilege jurisdiction.
    pub fn notify_privilege_event(
        &self,
        event: &PrivilegeEvent,
        provider: &Provider,
    ) -> Result<DispatchReport, NotificationError> {
        let recipients = [
            Recipient::Provider(event.provider_id),
            Recipient::Jurisdiction(event.jurisdiction.clone()),
        ];
        let mut variables = self.common_variables(provider, &event.license_type);
        variables.insert("jurisdiction".to_string(), event.jurisdiction.to_string());
        variables.insert(
            "license_jurisdiction".to_string(),
            event.license_jurisdiction.to_string(),
        );
        variables.insert(
            "effective_date".to_string(),
            event.effective_date.format("%Y-%m-%d").to_string(),
        );
        self.dispatch(
            &event.compact,
            &event.provider_id,
            event.kind.as_str(),
            Some(privilege_event_subject(event)),
            event.event_time,
            &recipients,
            &variables,
        )
    }

    fn common_variables(
        &self,
        provider: &Provider,
        license_type: &compact_core::LicenseTypeAbbreviation,
    ) -> BTreeMap<String, String> {
        let license_type_name = self
            .registry
            .name_for(&provider.compact, license_type)
            .unwrap_or(license_type.as_str());
        let mut variables = BTreeMap::from([
            ("provider_name".to_string(), provider.full_name()),
            ("license_type".to_string(), license_type_name.to_string()),
        ]);
        if let Some(email) = &provider.email_address {
            variables.insert("provider_email".to_string(), email.clone());
        }
        variables
    }

    fn dispatch(
        &self,
        compact: &CompactCode,
        provider_id: &ProviderId,
        event_type: &str,
        subject: Option<String>,
        event_time: Timestamp,
        recipients: &[Recipient],
        variables: &BTreeMap<String, String>,
    ) -> Result<DispatchReport, NotificationError> {
        let mut report = DispatchReport::default();
        for recipient in recipients {
            let key = DeliveryKey {
                compact: compact.clone(),
                provider_id: *provider_id,
                event_type: event_type.to_string(),
                subject: subject.clone(),
                event_time,
                recipient: recipient.clone(),
            };
            if !self.tracker.should_send(&key)? {
                tracing::debug!(%recipient, event_type, "notification already delivered, suppressed");
                report.suppressed += 1;
                continue;
            }
            let message = NotificationMessage {
                recipient: recipient.clone(),
                template: format!("{event_type}.{}", recipient.class()),
                variables: variables.clone(),
            };
            match self.sender.send(&message) {
                Ok(()) => {
                    self.tracker.record_success(&key, Timestamp::now())?;
                    report.sent += 1;
                }
                Err(e) => {
                    tracing::warn!(%recipient, event_type, error = %e, "notification failed");
                    self.tracker
                        .record_failure(&key, &e.to_string(), Timestamp::now())?;
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            compact = %compact,
            provider_id = %provider_id,
            event_type,
            sent = report.sent,
            suppressed = report.suppressed,
            failed = report.failed,
            "notifications dispatched"
        );
        if report.failed > 0 {
            return Err(NotificationError::DeliveryFailed {
                failed: report.failed,
                attempted: report.attempted(),
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use compact_core::{AdverseActionId, LicenseTypeAbbreviation};
    use compact_state::PrivilegeEventKind;
    use compact_store::InMemoryRecordStore;

    fn jur(s: &str) -> Jurisdiction {
        Jurisdiction::new(s).unwrap()
    }

    fn provider() -> Provider {
        Provider {
            compact: CompactCode::new("octp").unwrap(),
            provider_id: ProviderId::parse("89a6377e-c3a5-40e5-bca5-317ec854c570").unwrap(),
            given_name: "Jordan".to_string(),
            family_name: "Reyes".to_string(),
            email_address: Some("jordan@example.org".to_string()),
            license_jurisdiction: jur("oh"),
            privilege_jurisdictions: ["ky", "ne", "co"].into_iter().map(jur).collect(),
            date_of_update: Timestamp::parse("2024-01-01T00:00:00Z").unwrap(),
        }
    }

    fn event() -> EncumbranceEvent {
        EncumbranceEvent {
            compact: CompactCode::new("octp").unwrap(),
            provider_id: provider().provider_id,
            jurisdiction: jur("oh"),
            license_type: LicenseTypeAbbreviation::new("ot").unwrap(),
            adverse_action_id: AdverseActionId::parse("3f1d9c2a-5b7e-4e08-a6c4-0d2e8b9f1a73")
                .unwrap(),
            effective_date: NaiveDate::from_ymd_opt(2024, 2, 15).unwrap(),
            event_time: Timestamp::parse("2024-02-15T12:00:00Z").unwrap(),
        }
    }

    fn dispatcher() -> (NotificationDispatcher, Arc<RecordingNotificationSender>) {
        let sender = Arc::new(RecordingNotificationSender::new());
        let tracker = NotificationTracker::new(Arc::new(InMemoryRecordStore::new()));
        (
            NotificationDispatcher::new(tracker, sender.clone(), LicenseTypeRegistry::builtin()),
            sender,
        )
    }

    fn key(recipient: Recipient) -> DeliveryKey {
        DeliveryKey::for_license_event(LicenseEventKind::LicenseEncumbrance, &event(), recipient)
    }

    #[test]
    fn ledger_key_layout() {
        let k = key(Recipient::Jurisdiction(jur("ky")));
        let item_key = k.item_key();
        assert_eq!(
            item_key.pk,
            "octp#NOTIFICATION#89a6377e-c3a5-40e5-bca5-317ec854c570"
        );
        assert_eq!(
            item_key.sk,
            "EVENT#license.encumbrance/oh/ot/3f1d9c2a-5b7e-4e08-a6c4-0d2e8b9f1a73\
             #2024-02-15T12:00:00Z#RECIPIENT#jurisdiction#ky"
        );
        let scoped = DeliveryKey {
            subject: Some("ky/ot".to_string()),
            event_type: "privilege.encumbrance".to_string(),
            ..k
        };
        assert_eq!(
            scoped.item_key().sk,
            "EVENT#privilege.encumbrance/ky/ot#2024-02-15T12:00:00Z#RECIPIENT#jurisdiction#ky"
        );
    }

    #[test]
    fn distinct_license_events_in_one_second_are_tracked_apart() {
        let (dispatcher, sender) = dispatcher();
        let first = event();
        let second = EncumbranceEvent {
            license_type: LicenseTypeAbbreviation::new("ota").unwrap(),
            adverse_action_id: AdverseActionId::new(),
            ..event()
        };
        let a = dispatcher
            .notify_license_event(LicenseEventKind::LicenseEncumbrance, &first, &provider())
            .unwrap();
        let b = dispatcher
            .notify_license_event(LicenseEventKind::LicenseEncumbrance, &second, &provider())
            .unwrap();
        assert_eq!((a.sent, b.sent, b.suppressed), (5, 5, 0));
        assert_eq!(sender.delivered().len(), 10);
    }

    #[test]
    fn success_suppresses_failure_does_not() {
        let tracker = NotificationTracker::new(Arc::new(InMemoryRecordStore::new()));
        let k = key(Recipient::Jurisdiction(jur("ky")));
        let at = Timestamp::parse("2024-02-15T12:00:01Z").unwrap();
        assert!(tracker.should_send(&k).unwrap());
        tracker.record_failure(&k, "timeout", at).unwrap();
        assert!(tracker.should_send(&k).unwrap());
        tracker.record_success(&k, at).unwrap();
        assert!(!tracker.should_send(&k).unwrap());
        tracker.record_failure(&k, "late failure", at).unwrap();
        let entry = tracker.entry(&k).unwrap().unwrap();
        assert_eq!(entry.status, DeliveryStatus::Success);
        assert_eq!(entry.attempts, 2);
    }

    #[test]
    fn license_event_fans_out_to_licensee_and_jurisdictions() {
        let (dispatcher, sender) = dispatcher();
        let report = dispatcher
            .notify_license_event(LicenseEventKind::LicenseEncumbrance, &event(), &provider())
            .unwrap();
        assert_eq!(report.sent, 5);
        let recipients: Vec<_> = sender.attempts().into_iter().map(|m| m.recipient).collect();
        assert_eq!(recipients[0], Recipient::Provider(provider().provider_id));
        assert_eq!(recipients[1], Recipient::Jurisdiction(jur("oh")));
        assert_eq!(recipients.len(), 5);
        let first = &sender.attempts()[0];
        assert_eq!(first.template, "license.encumbrance.provider");
        assert_eq!(first.variables["license_type"], "occupational therapist");
        assert_eq!(first.variables["provider_name"], "Jordan Reyes");
    }

    #[test]
    fn redelivery_retries_only_failed_recipients() {
        let (dispatcher, sender) = dispatcher();
        sender.fail_for(Recipient::Jurisdiction(jur("ky")));
        sender.fail_for(Recipient::Jurisdiction(jur("ne")));
        let err = dispatcher
            .notify_license_event(LicenseEventKind::LicenseEncumbrance, &event(), &provider())
            .unwrap_err();
        assert!(matches!(
            err,
            NotificationError::DeliveryFailed {
                failed: 2,
                attempted: 5
            }
        ));

        sender.heal();
        let report = dispatcher
            .notify_license_event(LicenseEventKind::LicenseEncumbrance, &event(), &provider())
            .unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(report.suppressed, 3);
        assert_eq!(sender.attempts().len(), 7);
    }

    #[test]
    fn privilege_event_notifies_licensee_and_privilege_jurisdiction() {
        let (dispatcher, sender) = dispatcher();
        let e = event();
        let privilege_event = PrivilegeEvent {
            kind: PrivilegeEventKind::PrivilegeEncumbered,
            compact: e.compact.clone(),
            provider_id: e.provider_id,
            jurisdiction: jur("ky"),
            license_jurisdiction: jur("oh"),
            license_type: e.license_type.clone(),
            adverse_action_id: Some(e.adverse_action_id),
            effective_date: e.effective_date,
            event_time: e.event_time,
        };
        dispatcher
            .notify_privilege_event(&privilege_event, &provider())
            .unwrap();
        let again = dispatcher
            .notify_privilege_event(&privilege_event, &provider())
            .unwrap();
        assert_eq!(again.suppressed, 2);
        let templates: Vec<_> = sender.attempts().into_iter().map(|m| m.template).collect();
        assert_eq!(
            templates,
            vec![
                "privilege.encumbrance.provider",
                "privilege.encumbrance.jurisdiction"
            ]
        );
    }
}
