//! # Encumbrance Cascade State Machine
//!
//! Pure transitions of privilege encumbrance state:
//!
//! ```text
//!                 open adverse action added
//!   UNENCUMBERED ──────────────────────────────▶ ENCUMBERED
//!        ▲                                            │
//!        └──────── last open adverse action lifted ───┘
//! ```
//!
//! Every function here takes the provider aggregate and an event and
//! returns the new aggregate, the records to persist (grouped per
//! privilege so each group fits one atomic transaction), and the
//! privilege-level events to publish. No I/O happens here.
//!
//! ## Cascade links
//!
//! A license encumbrance is mirrored onto each derived privilege as a
//! privilege-scoped adverse action whose `source_adverse_action_id` names
//! the license action. The link's identifier is a UUIDv5 of the license
//! action and the privilege's `(jurisdiction, license type)`, so replaying
//! the same event finds the link it wrote the first time.
//!
//! ## Replay
//!
//! Reapplying an event writes nothing new. Its events are emitted again
//! with the original event time: a previous run may have written its
//! records and then failed to publish, and the notification ledger
//! suppresses anything already delivered.

use chrono::NaiveDate;
use compact_core::{
    AdverseActionId, Jurisdiction, LicenseTypeAbbreviation, SubjectType, Timestamp,
};
use serde_json::json;
use uuid::Uuid;

use crate::derivation::{filter_adverse_actions, latest_effective_lift_date, RecordState, SubjectFilter};
use crate::error::CascadeError;
use crate::events::{EncumbranceEvent, PrivilegeEvent, PrivilegeEventKind};
use crate::records::{
    AdministratorStatus, AdverseAction, EncumberedStatus, Privilege, PrivilegeUpdate,
    PrivilegeUpdateType, ProviderRecord,
};
use crate::snapshot::ProviderSnapshot;

/// Records to persist for one privilege, committed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeWrite {
    /// Privilege jurisdiction.
    pub jurisdiction: Jurisdiction,
    /// License type.
    pub license_type: LicenseTypeAbbreviation,
    /// Adverse action link, privilege row and audit row, in that order.
    pub records: Vec<ProviderRecord>,
}

/// Result of one state machine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeOutcome {
    /// The aggregate after the step.
    pub snapshot: ProviderSnapshot,
    /// Per-privilege record groups to persist.
    pub writes: Vec<PrivilegeWrite>,
    /// Privilege-level events to publish.
    pub events: Vec<PrivilegeEvent>,
}

impl CascadeOutcome {
    fn unchanged(snapshot: &ProviderSnapshot) -> Self {
        Self {
            snapshot: snapshot.clone(),
            writes: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Privileges whose encumbered status changed in this step.
    pub fn transitioned(&self) -> usize {
        self.writes
            .iter()
            .filter(|w| {
                w.records
                    .iter()
                    .any(|r| matches!(r, ProviderRecord::PrivilegeUpdate(_)))
            })
            .count()
    }

    fn push_write(
        &mut self,
        privilege: &Privilege,
        records: Vec<ProviderRecord>,
    ) {
        if !records.is_empty() {
            self.writes.push(PrivilegeWrite {
                jurisdiction: privilege.jurisdiction.clone(),
                license_type: privilege.license_type.clone(),
                records,
            });
        }
    }
}

/// Deterministic identifier of the privilege adverse action that mirrors
/// a license adverse action onto one privilege.
pub fn cascade_adverse_action_id(
    license_action: &AdverseActionId,
    jurisdiction: &Jurisdiction,
    license_type: &LicenseTypeAbbreviation,
) -> AdverseActionId {
    let name = format!("{jurisdiction}/{license_type}");
    AdverseActionId(Uuid::new_v5(&license_action.0, name.as_bytes()))
}

fn privilege_event(
    kind: PrivilegeEventKind,
    privilege: &Privilege,
    adverse_action_id: Option<AdverseActionId>,
    effective_date: NaiveDate,
    event_time: Timestamp,
) -> PrivilegeEvent {
    PrivilegeEvent {
        kind,
        compact: privilege.compact.clone(),
        provider_id: privilege.provider_id,
        jurisdiction: privilege.jurisdiction.clone(),
        license_jurisdiction: privilege.license_jurisdiction.clone(),
        license_type: privilege.license_type.clone(),
        adverse_action_id,
        effective_date,
        event_time,
    }
}

/// Audit field naming the adverse action that caused a status flip.
const CAUSE_FIELD: &str = "adverse_action_id";

/// Flip a privilege's encumbered status, returning the new row and its
/// audit record. `cause` is recorded in the audit delta.
fn flip_encumbrance(
    privilege: &Privilege,
    to: EncumberedStatus,
    cause: Option<AdverseActionId>,
    at: Timestamp,
    effective_date: NaiveDate,
) -> Result<(Privilege, PrivilegeUpdate), CascadeError> {
    let update_type = match to {
        EncumberedStatus::Encumbered => PrivilegeUpdateType::Encumbrance,
        EncumberedStatus::Unencumbered => PrivilegeUpdateType::LiftingEncumbrance,
    };
    let mut delta = json!({ "encumbered_status": to });
    if let Some(id) = cause {
        delta[CAUSE_FIELD] = json!(id.to_string());
    }
    let update = PrivilegeUpdate::new(update_type, privilege, delta, at, Some(effective_date))?;
    let mut next = privilege.clone();
    next.encumbered_status = to;
    Ok((next, update))
}

// ─── License-scoped events ───────────────────────────────────────────

/// A license adverse action was recorded: mirror it onto every privilege
/// derived from that license.
///
/// If the license action is already lifted in the aggregate (the lift
/// overtook this event), each link is written already lifted and no
/// privilege changes state.
pub fn apply_license_encumbrance(
    snapshot: &ProviderSnapshot,
    event: &EncumbranceEvent,
) -> Result<CascadeOutcome, CascadeError> {
    let mut out = CascadeOutcome::unchanged(snapshot);
    let license_action = snapshot.adverse_action(&event.adverse_action_id).cloned();
    let already_lifted = license_action
        .as_ref()
        .and_then(|a| a.effective_lift_date);

    let derived: Vec<Privilege> = snapshot
        .privileges_derived_from(&event.jurisdiction, &event.license_type)
        .into_iter()
        .cloned()
        .collect();

    for privilege in derived {
        let link_id = cascade_adverse_action_id(
            &event.adverse_action_id,
            &privilege.jurisdiction,
            &privilege.license_type,
        );
        let mut records = Vec::new();
        let link = match out.snapshot.adverse_action(&link_id).cloned() {
            Some(existing) => existing,
            None => {
                let link = AdverseAction {
                    compact: privilege.compact.clone(),
                    provider_id: privilege.provider_id,
                    adverse_action_id: link_id,
                    action_against: SubjectType::Privilege,
                    jurisdiction: privilege.jurisdiction.clone(),
                    license_type: privilege.license_type.clone(),
                    encumbrance_type: license_action
                        .as_ref()
                        .and_then(|a| a.encumbrance_type.clone()),
                    effective_start_date: event.effective_date,
                    effective_lift_date: already_lifted,
                    source_adverse_action_id: Some(event.adverse_action_id),
                    creation_date: event.event_time,
                };
                out.snapshot.upsert_adverse_action(link.clone());
                records.push(ProviderRecord::AdverseAction(link.clone()));
                link
            }
        };

        if !link.is_open() {
            out.push_write(&privilege, records);
            continue;
        }

        let current = if privilege.is_encumbered() {
            privilege
        } else {
            let (next, update) = flip_encumbrance(
                &privilege,
                EncumberedStatus::Encumbered,
                Some(event.adverse_action_id),
                event.event_time,
                event.effective_date,
            )?;
            tracing::info!(
                privilege_id = %next.privilege_id,
                adverse_action_id = %event.adverse_action_id,
                "privilege encumbered by license cascade"
            );
            out.snapshot.upsert_privilege(next.clone());
            out.snapshot.push_update(update.clone());
            records.push(ProviderRecord::Privilege(next.clone()));
            records.push(ProviderRecord::PrivilegeUpdate(update));
            next
        };
        out.events.push(privilege_event(
            PrivilegeEventKind::PrivilegeEncumbered,
            &current,
            Some(event.adverse_action_id),
            event.effective_date,
            event.event_time,
        ));
        out.push_write(&current, records);
    }
    Ok(out)
}

/// A license adverse action was lifted: lift each cascade link it created
/// and release every privilege left with no open adverse action.
///
/// Privileges still held by another open action (a second license action
/// or a direct privilege action) keep their status and emit nothing.
pub fn lift_license_encumbrance(
    snapshot: &ProviderSnapshot,
    event: &EncumbranceEvent,
) -> Result<CascadeOutcome, CascadeError> {
    let mut out = CascadeOutcome::unchanged(snapshot);
    let derived: Vec<Privilege> = snapshot
        .privileges_derived_from(&event.jurisdiction, &event.license_type)
        .into_iter()
        .cloned()
        .collect();

    for privilege in derived {
        let link_id = cascade_adverse_action_id(
            &event.adverse_action_id,
            &privilege.jurisdiction,
            &privilege.license_type,
        );
        let Some(link) = out.snapshot.adverse_action(&link_id).cloned() else {
            continue;
        };
        let mut records = Vec::new();
        if link.is_open() {
            let lifted = AdverseAction {
                effective_lift_date: Some(event.effective_date),
                ..link
            };
            out.snapshot.upsert_adverse_action(lifted.clone());
            records.push(ProviderRecord::AdverseAction(lifted));
        }
        settle_after_lift(
            &mut out,
            privilege,
            records,
            Some(event.adverse_action_id),
            event.event_time,
        )?;
    }
    Ok(out)
}

/// Release a privilege once none of its adverse actions remain open.
fn settle_after_lift(
    out: &mut CascadeOutcome,
    privilege: Privilege,
    mut records: Vec<ProviderRecord>,
    adverse_action_id: Option<AdverseActionId>,
    event_time: Timestamp,
) -> Result<(), CascadeError> {
    let all = out.snapshot.adverse_actions.clone();
    let filter = SubjectFilter::privilege(&privilege.jurisdiction, &privilege.license_type);
    let still_open = filter_adverse_actions(&all, &filter.clone().with_state(RecordState::Open));
    if !still_open.is_empty() {
        tracing::debug!(
            privilege_id = %privilege.privilege_id,
            open = still_open.len(),
            "privilege remains encumbered"
        );
        out.push_write(&privilege, records);
        return Ok(());
    }

    let lift_date = latest_effective_lift_date(filter_adverse_actions(&all, &filter)).ok_or_else(
        || CascadeError::MissingLiftDate {
            privilege_id: privilege.privilege_id.clone(),
        },
    )?;

    let current = if privilege.is_encumbered() {
        let (next, update) = flip_encumbrance(
            &privilege,
            EncumberedStatus::Unencumbered,
            adverse_action_id,
            event_time,
            lift_date,
        )?;
        tracing::info!(
            privilege_id = %next.privilege_id,
            %lift_date,
            "privilege encumbrance lifted"
        );
        out.snapshot.upsert_privilege(next.clone());
        out.snapshot.push_update(update.clone());
        records.push(ProviderRecord::Privilege(next.clone()));
        records.push(ProviderRecord::PrivilegeUpdate(update));
        next
    } else if released_by(&out.snapshot, &privilege, adverse_action_id.as_ref()) {
        // Redelivery of the lift that released it: announce again.
        privilege
    } else {
        tracing::debug!(
            privilege_id = %privilege.privilege_id,
            "privilege was not released by this lift, nothing to announce"
        );
        out.push_write(&privilege, records);
        return Ok(());
    };
    out.events.push(privilege_event(
        PrivilegeEventKind::PrivilegeEncumbranceLifted,
        &current,
        adverse_action_id,
        lift_date,
        event_time,
    ));
    out.push_write(&current, records);
    Ok(())
}

/// Whether the privilege's most recent encumbrance change is a release
/// caused by `adverse_action_id`.
fn released_by(
    snapshot: &ProviderSnapshot,
    privilege: &Privilege,
    adverse_action_id: Option<&AdverseActionId>,
) -> bool {
    let Some(id) = adverse_action_id else {
        return false;
    };
    snapshot
        .privilege_updates
        .iter()
        .filter(|u| {
            u.jurisdiction == privilege.jurisdiction
                && u.license_type == privilege.license_type
                && matches!(
                    u.update_type,
                    PrivilegeUpdateType::Encumbrance | PrivilegeUpdateType::LiftingEncumbrance
                )
        })
        .max_by_key(|u| u.create_date)
        .is_some_and(|u| {
            u.update_type == PrivilegeUpdateType::LiftingEncumbrance
                && u.updated_values.get(CAUSE_FIELD).and_then(|v| v.as_str())
                    == Some(id.to_string().as_str())
        })
}

// ─── Privilege-scoped events ─────────────────────────────────────────

fn require_privilege(
    snapshot: &ProviderSnapshot,
    jurisdiction: &Jurisdiction,
    license_type: &LicenseTypeAbbreviation,
) -> Result<Privilege, CascadeError> {
    snapshot
        .privilege(jurisdiction, license_type)
        .cloned()
        .ok_or_else(|| CascadeError::PrivilegeNotFound {
            provider_id: snapshot.provider.provider_id,
            jurisdiction: jurisdiction.clone(),
            license_type: license_type.clone(),
        })
}

/// Record a direct adverse action against a privilege.
///
/// `action` must be privilege-scoped. Replaying an action already present
/// writes nothing.
pub fn apply_privilege_encumbrance(
    snapshot: &ProviderSnapshot,
    action: &AdverseAction,
) -> Result<CascadeOutcome, CascadeError> {
    if action.action_against != SubjectType::Privilege {
        return Err(CascadeError::InconsistentAggregate(format!(
            "adverse action {} is scoped to a {}, not a privilege",
            action.adverse_action_id, action.action_against
        )));
    }
    let privilege = require_privilege(snapshot, &action.jurisdiction, &action.license_type)?;
    let mut out = CascadeOutcome::unchanged(snapshot);
    let mut records = Vec::new();
    let stored = match snapshot.adverse_action(&action.adverse_action_id) {
        Some(existing) => existing.clone(),
        None => {
            out.snapshot.upsert_adverse_action(action.clone());
            records.push(ProviderRecord::AdverseAction(action.clone()));
            action.clone()
        }
    };
    if !stored.is_open() {
        out.push_write(&privilege, records);
        return Ok(out);
    }

    let current = if privilege.is_encumbered() {
        privilege
    } else {
        let (next, update) = flip_encumbrance(
            &privilege,
            EncumberedStatus::Encumbered,
            Some(stored.adverse_action_id),
            stored.creation_date,
            stored.effective_start_date,
        )?;
        tracing::info!(
            privilege_id = %next.privilege_id,
            adverse_action_id = %stored.adverse_action_id,
            "privilege encumbered directly"
        );
        out.snapshot.upsert_privilege(next.clone());
        out.snapshot.push_update(update.clone());
        records.push(ProviderRecord::Privilege(next.clone()));
        records.push(ProviderRecord::PrivilegeUpdate(update));
        next
    };
    out.events.push(privilege_event(
        PrivilegeEventKind::PrivilegeEncumbered,
        &current,
        Some(stored.adverse_action_id),
        stored.effective_start_date,
        stored.creation_date,
    ));
    out.push_write(&current, records);
    Ok(out)
}

/// Lift a direct privilege adverse action.
///
/// # Errors
///
/// [`CascadeError::AdverseActionNotFound`] when no privilege-scoped action
/// with that identifier exists.
pub fn lift_privilege_encumbrance(
    snapshot: &ProviderSnapshot,
    adverse_action_id: &AdverseActionId,
    lift_date: NaiveDate,
    event_time: Timestamp,
) -> Result<CascadeOutcome, CascadeError> {
    let action = snapshot
        .adverse_action(adverse_action_id)
        .filter(|a| a.action_against == SubjectType::Privilege)
        .cloned()
        .ok_or(CascadeError::AdverseActionNotFound {
            provider_id: snapshot.provider.provider_id,
            adverse_action_id: *adverse_action_id,
        })?;
    let privilege = require_privilege(snapshot, &action.jurisdiction, &action.license_type)?;
    let mut out = CascadeOutcome::unchanged(snapshot);
    let mut records = Vec::new();
    if action.is_open() {
        let lifted = AdverseAction {
            effective_lift_date: Some(lift_date),
            ..action
        };
        out.snapshot.upsert_adverse_action(lifted.clone());
        records.push(ProviderRecord::AdverseAction(lifted));
    }
    settle_after_lift(
        &mut out,
        privilege,
        records,
        Some(*adverse_action_id),
        event_time,
    )?;
    Ok(out)
}

/// Administrator deactivation of a privilege. Replaying on an already
/// inactive privilege writes nothing.
pub fn deactivate_privilege(
    snapshot: &ProviderSnapshot,
    jurisdiction: &Jurisdiction,
    license_type: &LicenseTypeAbbreviation,
    at: Timestamp,
) -> Result<CascadeOutcome, CascadeError> {
    let privilege = require_privilege(snapshot, jurisdiction, license_type)?;
    let mut out = CascadeOutcome::unchanged(snapshot);
    let mut records = Vec::new();
    let current = if privilege.administrator_set_status == AdministratorStatus::Inactive {
        privilege
    } else {
        let update = PrivilegeUpdate::new(
            PrivilegeUpdateType::Deactivation,
            &privilege,
            json!({ "administrator_set_status": AdministratorStatus::Inactive }),
            at,
            None,
        )?;
        let mut next = privilege;
        next.administrator_set_status = AdministratorStatus::Inactive;
        out.snapshot.upsert_privilege(next.clone());
        out.snapshot.push_update(update.clone());
        records.push(ProviderRecord::Privilege(next.clone()));
        records.push(ProviderRecord::PrivilegeUpdate(update));
        next
    };
    out.events.push(privilege_event(
        PrivilegeEventKind::PrivilegeDeactivated,
        &current,
        None,
        at.date(),
        at,
    ));
    out.push_write(&current, records);
    Ok(out)
}
