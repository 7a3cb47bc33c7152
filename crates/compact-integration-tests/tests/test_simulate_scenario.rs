//! # Scenario Replay
//!
//! The `simulate` command drives a whole lifecycle through the engine:
//! purchase, encumbrance, lift and deactivation.

mod common;

use common::*;
use compact_cli::simulate::{run_scenario, Scenario};
use compact_core::{AdverseActionId, LicenseTypeRegistry};
use compact_privilege::EngineConfig;
use compact_state::{PrivilegeEventKind, ProviderRecord};
use serde_json::json;

fn lifecycle() -> Scenario {
    let action = AdverseActionId::new();
    let encumbrance = license_event("ne", action, "2024-02-15", "2024-02-15T12:00:00Z");
    let lift = license_event("ne", action, "2024-05-01", "2024-05-01T12:00:00Z");
    serde_json::from_value(json!({
        "records": [
            serde_json::to_value(ProviderRecord::from(provider("ne"))).unwrap(),
            serde_json::to_value(ProviderRecord::from(
                license("ne", "2018-05-01", Some("2023-05-01"), "2026-04-04"),
            ))
            .unwrap(),
        ],
        "steps": [
            {
                "action": "purchase",
                "compact": "octp",
                "provider_id": provider_id().to_string(),
                "license_type": "ot",
                "jurisdictions": ["oh", "ky"],
                "compact_transaction_id": "txn-0001",
                "purchased_at": "2024-01-15T12:00:00Z"
            },
            { "action": "license_encumbrance", "event": encumbrance.to_value() },
            { "action": "license_encumbrance_lifted", "event": lift.to_value() },
            {
                "action": "deactivate",
                "compact": "octp",
                "provider_id": provider_id().to_string(),
                "jurisdiction": "oh",
                "license_type": "ot",
                "at": "2024-06-01T08:00:00Z"
            }
        ]
    }))
    .unwrap()
}

#[test]
fn full_lifecycle_replays_cleanly() {
    let report = run_scenario(
        &lifecycle(),
        LicenseTypeRegistry::builtin(),
        EngineConfig::immediate(),
        None,
    )
    .unwrap();
    assert!(report.all_ok(), "{:?}", report.steps);

    let kinds: Vec<_> = report.events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            PrivilegeEventKind::PrivilegeEncumbered,
            PrivilegeEventKind::PrivilegeEncumbered,
            PrivilegeEventKind::PrivilegeEncumbranceLifted,
            PrivilegeEventKind::PrivilegeEncumbranceLifted,
            PrivilegeEventKind::PrivilegeDeactivated,
        ]
    );
    // Four per license event, two per privilege event.
    assert_eq!(report.notifications.len(), 4 + 4 + 5 * 2);
}

#[test]
fn failed_first_commit_is_reported_and_later_steps_still_run() {
    let report = run_scenario(
        &lifecycle(),
        LicenseTypeRegistry::builtin(),
        EngineConfig::immediate(),
        Some(1),
    )
    .unwrap();
    assert!(!report.all_ok());
    assert!(!report.steps[0].ok);
    // Nothing was issued, so the cascade has nothing to touch and the
    // deactivation has no privilege to find.
    assert!(report.events.is_empty());
    assert_eq!(report.steps.len(), 4);
    assert!(!report.steps[3].ok);
}
