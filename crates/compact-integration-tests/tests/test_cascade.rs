//! # Encumbrance Cascade
//!
//! License adverse actions propagate onto every derived privilege through
//! deterministic link records. Redelivery of any event converges on the
//! same stored state, and a privilege is released only when nothing holds
//! it any more.

mod common;

use common::*;
use compact_core::{AdverseActionId, SubjectType};
use compact_privilege::{CascadeHandlerError, EngineError};
use compact_state::{
    cascade_adverse_action_id, AdverseAction, CascadeError, EncumberedStatus, PrivilegeEventKind,
    ProviderRecord, ProviderSnapshot,
};

/// Provider licensed in ne with privileges in oh and ky.
fn licensed_world() -> World {
    let world = World::new();
    world.seed([
        ProviderRecord::from(provider("ne")),
        ProviderRecord::from(license("ne", "2018-05-01", Some("2023-05-01"), "2026-04-04")),
    ]);
    world
        .engine
        .purchase_privileges(&purchase(&["oh", "ky"], "txn-1", "2024-01-15T12:00:00Z"))
        .unwrap();
    world
}

fn snapshot(world: &World) -> ProviderSnapshot {
    world.engine.snapshot(&compact(), &provider_id()).unwrap()
}

fn status(world: &World, j: &str) -> EncumberedStatus {
    snapshot(world)
        .privilege(&jur(j), &ot())
        .map(|p| p.encumbered_status)
        .unwrap()
}

fn deliver_privilege_events(world: &World, from: usize) -> usize {
    let events = world.bus.events();
    for e in &events[from..] {
        world.engine.handle_privilege_event(e).unwrap();
    }
    events.len()
}

#[test]
fn encumbrance_then_lift_round_trip() {
    let world = licensed_world();
    let id = AdverseActionId::new();

    world
        .engine
        .handle_license_encumbrance(&license_event("ne", id, "2024-02-01", "2024-02-01T09:00:00Z"))
        .unwrap();
    assert_eq!(status(&world, "oh"), EncumberedStatus::Encumbered);
    assert_eq!(status(&world, "ky"), EncumberedStatus::Encumbered);
    let link = cascade_adverse_action_id(&id, &jur("oh"), &ot());
    let stored = snapshot(&world).adverse_action(&link).cloned().unwrap();
    assert_eq!(stored.source_adverse_action_id, Some(id));
    assert_eq!(stored.action_against, SubjectType::Privilege);

    world
        .engine
        .handle_license_encumbrance_lifted(&license_event(
            "ne",
            id,
            "2024-05-01",
            "2024-05-01T09:00:00Z",
        ))
        .unwrap();
    assert_eq!(status(&world, "oh"), EncumberedStatus::Unencumbered);
    assert_eq!(status(&world, "ky"), EncumberedStatus::Unencumbered);

    let kinds: Vec<_> = world.bus.events().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            PrivilegeEventKind::PrivilegeEncumbered,
            PrivilegeEventKind::PrivilegeEncumbered,
            PrivilegeEventKind::PrivilegeEncumbranceLifted,
            PrivilegeEventKind::PrivilegeEncumbranceLifted,
        ]
    );
    // Two audit rows per privilege: encumbrance and lift.
    assert_eq!(snapshot(&world).privilege_updates.len(), 4);
}

#[test]
fn replayed_encumbrance_changes_nothing() {
    let world = licensed_world();
    let event = license_event("ne", AdverseActionId::new(), "2024-02-01", "2024-02-01T09:00:00Z");

    world.engine.handle_license_encumbrance(&event).unwrap();
    let delivered = deliver_privilege_events(&world, 0);
    let records = world.provider_records();
    let ledger = world.ledger();
    let sends = world.sender.attempts().len();

    let replay = world.engine.handle_license_encumbrance(&event).unwrap();
    deliver_privilege_events(&world, delivered);

    assert_eq!(replay.cascade.transactions, 0);
    assert_eq!(replay.cascade.transitioned, 0);
    assert_eq!(world.provider_records(), records);
    assert_eq!(world.ledger(), ledger);
    assert_eq!(world.sender.attempts().len(), sends);
}

#[test]
fn lift_reports_latest_effective_lift_date() {
    let world = licensed_world();
    let first = AdverseActionId::new();
    let second = AdverseActionId::new();

    for id in [first, second] {
        world
            .engine
            .handle_license_encumbrance(&license_event(
                "ne",
                id,
                "2023-11-01",
                "2023-11-01T09:00:00Z",
            ))
            .unwrap();
    }
    let published = world.bus.events().len();

    // Lifted effective 2024-03-15; the second action still holds.
    world
        .engine
        .handle_license_encumbrance_lifted(&license_event(
            "ne",
            first,
            "2024-03-15",
            "2024-03-20T10:00:00Z",
        ))
        .unwrap();
    assert_eq!(status(&world, "oh"), EncumberedStatus::Encumbered);
    assert_eq!(world.bus.events().len(), published);

    // Lifted later, effective earlier.
    world
        .engine
        .handle_license_encumbrance_lifted(&license_event(
            "ne",
            second,
            "2024-01-01",
            "2024-04-02T10:00:00Z",
        ))
        .unwrap();
    assert_eq!(status(&world, "oh"), EncumberedStatus::Unencumbered);

    let lifted: Vec<_> = world.bus.events()[published..].to_vec();
    assert_eq!(lifted.len(), 2);
    for event in lifted {
        assert_eq!(event.kind, PrivilegeEventKind::PrivilegeEncumbranceLifted);
        assert_eq!(event.effective_date, date("2024-03-15"));
        assert_eq!(event.event_time, ts("2024-04-02T10:00:00Z"));
    }
}

#[test]
fn direct_privilege_action_outlives_license_lift() {
    let world = licensed_world();
    let license_action = AdverseActionId::new();
    world
        .engine
        .handle_license_encumbrance(&license_event(
            "ne",
            license_action,
            "2024-02-01",
            "2024-02-01T09:00:00Z",
        ))
        .unwrap();
    world
        .engine
        .handle_privilege_encumbrance(&AdverseAction {
            compact: compact(),
            provider_id: provider_id(),
            adverse_action_id: AdverseActionId::new(),
            action_against: SubjectType::Privilege,
            jurisdiction: jur("ky"),
            license_type: ot(),
            encumbrance_type: Some("suspension".to_string()),
            effective_start_date: date("2024-02-10"),
            effective_lift_date: None,
            source_adverse_action_id: None,
            creation_date: ts("2024-02-10T00:00:00Z"),
        })
        .unwrap();

    world
        .engine
        .handle_license_encumbrance_lifted(&license_event(
            "ne",
            license_action,
            "2024-04-01",
            "2024-04-01T09:00:00Z",
        ))
        .unwrap();
    assert_eq!(status(&world, "oh"), EncumberedStatus::Unencumbered);
    assert_eq!(status(&world, "ky"), EncumberedStatus::Encumbered);
}

#[test]
fn encumbrance_arriving_after_its_lift_does_not_flip() {
    let world = licensed_world();
    let id = AdverseActionId::new();
    world.seed([ProviderRecord::from(AdverseAction {
        compact: compact(),
        provider_id: provider_id(),
        adverse_action_id: id,
        action_against: SubjectType::License,
        jurisdiction: jur("ne"),
        license_type: ot(),
        encumbrance_type: Some("probation".to_string()),
        effective_start_date: date("2024-02-01"),
        effective_lift_date: Some(date("2024-02-20")),
        source_adverse_action_id: None,
        creation_date: ts("2024-02-01T00:00:00Z"),
    })]);

    let report = world
        .engine
        .handle_license_encumbrance(&license_event("ne", id, "2024-02-01", "2024-02-01T09:00:00Z"))
        .unwrap();
    assert_eq!(report.cascade.transitioned, 0);
    assert_eq!(report.cascade.published, 0);
    assert_eq!(status(&world, "oh"), EncumberedStatus::Unencumbered);
    let link = cascade_adverse_action_id(&id, &jur("oh"), &ot());
    let stored = snapshot(&world).adverse_action(&link).cloned().unwrap();
    assert_eq!(stored.effective_lift_date, Some(date("2024-02-20")));

    // The lift is redelivered: nothing was released, so nothing is announced.
    let records = world.provider_records();
    let lift = world
        .engine
        .handle_license_encumbrance_lifted(&license_event("ne", id, "2024-02-20", "2024-02-20T09:00:00Z"))
        .unwrap();
    assert_eq!(lift.cascade.transactions, 0);
    assert_eq!(lift.cascade.published, 0);
    assert!(world.bus.events().is_empty());
    assert_eq!(world.provider_records(), records);
}

#[test]
fn redelivered_lift_reannounces_its_release() {
    let world = licensed_world();
    let id = AdverseActionId::new();
    world
        .engine
        .handle_license_encumbrance(&license_event("ne", id, "2024-02-01", "2024-02-01T09:00:00Z"))
        .unwrap();
    let lift = license_event("ne", id, "2024-05-01", "2024-05-01T09:00:00Z");
    world.engine.handle_license_encumbrance_lifted(&lift).unwrap();
    let published = world.bus.events().len();

    let replay = world.engine.handle_license_encumbrance_lifted(&lift).unwrap();
    assert_eq!(replay.cascade.transactions, 0);
    assert_eq!(replay.cascade.published, 2);
    let again = &world.bus.events()[published..];
    assert!(again
        .iter()
        .all(|e| e.kind == PrivilegeEventKind::PrivilegeEncumbranceLifted
            && e.effective_date == date("2024-05-01")));
}

#[test]
fn lifting_an_unknown_privilege_action_is_refused() {
    let world = licensed_world();
    let err = world
        .engine
        .handle_privilege_encumbrance_lifted(
            &compact(),
            &provider_id(),
            &AdverseActionId::new(),
            date("2024-03-01"),
            ts("2024-03-01T00:00:00Z"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Cascade(CascadeHandlerError::Cascade(
            CascadeError::AdverseActionNotFound { .. }
        ))
    ));
}
