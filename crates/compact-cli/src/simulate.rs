//! # Simulate Subcommand
//!
//! Replays a scenario against an in-memory store, event bus and
//! notification sender. Privilege events published during a step are fed
//! back through the notification listener before the next step, the way
//! the deployed listeners would see them.
//!
//! ```bash
//! compact simulate scenario.json
//! compact simulate scenario.json --fail-transaction 1
//! ```
//!
//! Scenario format:
//!
//! ```json
//! {
//!   "records": [{"type": "provider", ...}, {"type": "license", ...}],
//!   "steps": [
//!     {"action": "purchase", "compact": "octp", "provider_id": "...", ...},
//!     {"action": "license_encumbrance", "event": {"compact": "octp", ...}}
//!   ]
//! }
//! ```
//!
//! Exit code 0 when every step succeeded, 2 when any step failed. A fatal
//! rollback failure stops the replay.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use compact_core::{
    AdverseActionId, CompactCode, CompactTransactionId, Jurisdiction, LicenseTypeAbbreviation,
    LicenseTypeRegistry, ProviderId, Timestamp,
};
use compact_privilege::{
    EngineConfig, EngineError, InMemoryEventBus, NotificationMessage, PrivilegeEngine,
    PurchaseError, PurchaseRequest, RecordingNotificationSender,
};
use compact_state::{
    AdverseAction, Attestation, EncumbranceEvent, PrivilegeEvent, Provider, ProviderRecord,
};
use compact_store::{FaultInjectingStore, InMemoryRecordStore, PutCondition, RecordStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Arguments for `simulate`.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Scenario file (JSON).
    pub scenario: PathBuf,

    /// Fail the Nth store transaction (1-based) to exercise rollback.
    #[arg(long)]
    pub fail_transaction: Option<usize>,

    /// License-type table (YAML). Defaults to the built-in table.
    #[arg(long)]
    pub license_types: Option<PathBuf>,

    /// Write the report to this file instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

// ─── Scenario ────────────────────────────────────────────────────────

/// Seed records and the steps to replay over them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    /// Records written before the first step.
    #[serde(default)]
    pub records: Vec<ProviderRecord>,
    /// Steps in order.
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

/// One scenario step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Create the provider row unless it exists.
    RegisterProvider {
        /// Provider row.
        provider: Provider,
    },
    /// Purchase or renew privileges.
    Purchase(PurchaseStep),
    /// A license adverse action was recorded.
    LicenseEncumbrance {
        /// Inbound envelope.
        event: EncumbranceEvent,
    },
    /// A license adverse action was lifted.
    LicenseEncumbranceLifted {
        /// Inbound envelope.
        event: EncumbranceEvent,
    },
    /// A direct privilege adverse action.
    PrivilegeEncumbrance {
        /// Privilege-scoped adverse action.
        adverse_action: AdverseAction,
    },
    /// A direct privilege adverse action was lifted.
    PrivilegeEncumbranceLifted {
        /// Owning compact.
        compact: CompactCode,
        /// Licensee.
        provider_id: ProviderId,
        /// Action being lifted.
        adverse_action_id: AdverseActionId,
        /// Effective lift date.
        lift_date: NaiveDate,
        /// When the lift was recorded.
        event_time: Timestamp,
    },
    /// Administrator deactivation.
    Deactivate {
        /// Owning compact.
        compact: CompactCode,
        /// Licensee.
        provider_id: ProviderId,
        /// Privilege jurisdiction.
        jurisdiction: Jurisdiction,
        /// License type.
        license_type: LicenseTypeAbbreviation,
        /// When the deactivation was recorded.
        at: Timestamp,
    },
}

impl ScenarioStep {
    /// Step label used in the report.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RegisterProvider { .. } => "register_provider",
            Self::Purchase(_) => "purchase",
            Self::LicenseEncumbrance { .. } => "license_encumbrance",
            Self::LicenseEncumbranceLifted { .. } => "license_encumbrance_lifted",
            Self::PrivilegeEncumbrance { .. } => "privilege_encumbrance",
            Self::PrivilegeEncumbranceLifted { .. } => "privilege_encumbrance_lifted",
            Self::Deactivate { .. } => "deactivate",
        }
    }
}

/// A purchase as written in a scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseStep {
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee.
    pub provider_id: ProviderId,
    /// License type.
    pub license_type: LicenseTypeAbbreviation,
    /// Jurisdictions selected.
    pub jurisdictions: Vec<Jurisdiction>,
    /// Payment reference.
    pub compact_transaction_id: CompactTransactionId,
    /// Attestations accepted.
    #[serde(default)]
    pub attestations: Vec<Attestation>,
    /// Purchase time.
    pub purchased_at: Timestamp,
}

impl From<&PurchaseStep> for PurchaseRequest {
    fn from(step: &PurchaseStep) -> Self {
        Self {
            compact: step.compact.clone(),
            provider_id: step.provider_id,
            license_type: step.license_type.clone(),
            jurisdictions: step.jurisdictions.clone(),
            compact_transaction_id: step.compact_transaction_id.clone(),
            attestations: step.attestations.clone(),
            purchased_at: step.purchased_at,
        }
    }
}

// ─── Report ──────────────────────────────────────────────────────────

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// 1-based position in the scenario.
    pub step: usize,
    /// Step label.
    pub action: &'static str,
    /// Whether the step succeeded.
    pub ok: bool,
    /// Step result or error message.
    pub detail: Value,
}

/// Everything a replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Per-step outcomes.
    pub steps: Vec<StepOutcome>,
    /// Store contents after the last step, ordered by key.
    pub records: Vec<Value>,
    /// Privilege events published.
    pub events: Vec<PrivilegeEvent>,
    /// Notification attempts, successful or not.
    pub notifications: Vec<NotificationMessage>,
}

impl SimulationReport {
    /// Whether every step succeeded.
    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }
}

// ─── Replay ──────────────────────────────────────────────────────────

/// Execute `simulate`.
pub fn run_simulate(args: &SimulateArgs) -> Result<u8> {
    let text = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading {}", args.scenario.display()))?;
    let scenario: Scenario = serde_json::from_str(&text)
        .with_context(|| format!("parsing scenario {}", args.scenario.display()))?;
    let registry = match &args.license_types {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            LicenseTypeRegistry::from_yaml(&yaml)
                .with_context(|| format!("parsing license types {}", path.display()))?
        }
        None => LicenseTypeRegistry::builtin(),
    };
    let config = EngineConfig::from_env().context("loading engine configuration")?;

    let report = run_scenario(&scenario, registry, config, args.fail_transaction)?;
    let rendered = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(if report.all_ok() { 0 } else { 2 })
}

/// Replay `scenario` and collect the report.
pub fn run_scenario(
    scenario: &Scenario,
    registry: LicenseTypeRegistry,
    config: EngineConfig,
    fail_transaction: Option<usize>,
) -> Result<SimulationReport> {
    let mut faulty = FaultInjectingStore::new(InMemoryRecordStore::new());
    if let Some(n) = fail_transaction {
        faulty = faulty.fail_transaction(n);
    }
    let store = Arc::new(faulty);
    for record in &scenario.records {
        store
            .put_item(record.to_item()?, PutCondition::Always)
            .with_context(|| format!("seeding {}", record.key()))?;
    }
    tracing::info!(records = scenario.records.len(), "scenario seeded");

    let bus = Arc::new(InMemoryEventBus::new());
    let sender = Arc::new(RecordingNotificationSender::new());
    let engine = PrivilegeEngine::new(
        store.clone(),
        bus.clone(),
        sender.clone(),
        registry,
        config,
    );

    let mut steps = Vec::with_capacity(scenario.steps.len());
    let mut forwarded = 0;
    for (index, step) in scenario.steps.iter().enumerate() {
        let result = apply_step(&engine, step);
        let published = bus.events();
        for event in &published[forwarded..] {
            if let Err(e) = engine.handle_privilege_event(event) {
                tracing::warn!(kind = %event.kind, error = %e, "privilege event notification failed");
            }
        }
        forwarded = published.len();

        let fatal = matches!(
            &result,
            Err(EngineError::Purchase(PurchaseError::Issuance(e))) if e.is_fatal()
        );
        let outcome = match result {
            Ok(detail) => StepOutcome {
                step: index + 1,
                action: step.label(),
                ok: true,
                detail,
            },
            Err(e) => {
                tracing::warn!(step = index + 1, action = step.label(), error = %e, "step failed");
                StepOutcome {
                    step: index + 1,
                    action: step.label(),
                    ok: false,
                    detail: json!({ "error": e.to_string() }),
                }
            }
        };
        steps.push(outcome);
        if fatal {
            tracing::error!(step = index + 1, "rollback failed, stopping replay");
            break;
        }
    }

    let records = store
        .inner()
        .dump()
        .into_iter()
        .map(|item| json!({ "pk": item.key.pk, "sk": item.key.sk, "body": item.body }))
        .collect();
    Ok(SimulationReport {
        steps,
        records,
        events: bus.events(),
        notifications: sender.attempts(),
    })
}

fn apply_step(engine: &PrivilegeEngine, step: &ScenarioStep) -> Result<Value, EngineError> {
    Ok(match step {
        ScenarioStep::RegisterProvider { provider } => {
            let (_, created) = engine.register_provider(provider)?;
            json!({ "created": created })
        }
        ScenarioStep::Purchase(purchase) => {
            let receipt = engine.purchase_privileges(&PurchaseRequest::from(purchase))?;
            json!({
                "privileges": receipt
                    .privileges
                    .iter()
                    .map(|p| p.privilege_id.clone())
                    .collect::<Vec<_>>(),
                "renewals": receipt.updates.len(),
                "batches": receipt.batches,
            })
        }
        ScenarioStep::LicenseEncumbrance { event } => {
            let report = engine.handle_license_encumbrance(event)?;
            json!({
                "transitioned": report.cascade.transitioned,
                "published": report.cascade.published,
                "notified": report.notifications.sent,
                "suppressed": report.notifications.suppressed,
            })
        }
        ScenarioStep::LicenseEncumbranceLifted { event } => {
            let report = engine.handle_license_encumbrance_lifted(event)?;
            json!({
                "transitioned": report.cascade.transitioned,
                "published": report.cascade.published,
                "notified": report.notifications.sent,
                "suppressed": report.notifications.suppressed,
            })
        }
        ScenarioStep::PrivilegeEncumbrance { adverse_action } => {
            let report = engine.handle_privilege_encumbrance(adverse_action)?;
            json!({ "transitioned": report.transitioned, "published": report.published })
        }
        ScenarioStep::PrivilegeEncumbranceLifted {
            compact,
            provider_id,
            adverse_action_id,
            lift_date,
            event_time,
        } => {
            let report = engine.handle_privilege_encumbrance_lifted(
                compact,
                provider_id,
                adverse_action_id,
                *lift_date,
                *event_time,
            )?;
            json!({ "transitioned": report.transitioned, "published": report.published })
        }
        ScenarioStep::Deactivate {
            compact,
            provider_id,
            jurisdiction,
            license_type,
            at,
        } => {
            let report =
                engine.deactivate_privilege(compact, provider_id, jurisdiction, license_type, *at)?;
            json!({ "published": report.published })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDER: &str = "5f3c8f0e-27a4-4c55-9a57-1c2f0e2b7d11";

    fn scenario() -> Scenario {
        serde_json::from_value(json!({
            "records": [
                {
                    "type": "provider",
                    "compact": "octp",
                    "provider_id": PROVIDER,
                    "given_name": "Riley",
                    "family_name": "Moreau",
                    "email_address": "riley@example.org",
                    "license_jurisdiction": "ne",
                    "privilege_jurisdictions": [],
                    "date_of_update": "2024-01-01T00:00:00Z"
                },
                {
                    "type": "license",
                    "compact": "octp",
                    "provider_id": PROVIDER,
                    "jurisdiction": "ne",
                    "license_type": "ot",
                    "license_number": "NE-4471",
                    "date_of_issuance": "2018-05-01",
                    "date_of_renewal": "2023-05-01",
                    "date_of_expiration": "2026-04-04",
                    "license_status": "ACTIVE",
                    "compact_eligibility": "ELIGIBLE",
                    "encumbered_status": "UNENCUMBERED"
                }
            ],
            "steps": [
                {
                    "action": "purchase",
                    "compact": "octp",
                    "provider_id": PROVIDER,
                    "license_type": "ot",
                    "jurisdictions": ["oh", "ky"],
                    "compact_transaction_id": "txn-0001",
                    "purchased_at": "2024-01-15T12:00:00Z"
                },
                {
                    "action": "license_encumbrance",
                    "event": {
                        "compact": "octp",
                        "providerId": PROVIDER,
                        "jurisdiction": "ne",
                        "licenseTypeAbbreviation": "ot",
                        "adverseActionId": "98fec590-4a3a-4a0c-9a3f-2d4bd7b29d54",
                        "effectiveDate": "2024-02-15",
                        "eventTime": "2024-02-15T12:00:00Z"
                    }
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn replays_purchase_and_encumbrance() {
        let report = run_scenario(
            &scenario(),
            LicenseTypeRegistry::builtin(),
            EngineConfig::immediate(),
            None,
        )
        .unwrap();
        assert!(report.all_ok(), "{:?}", report.steps);
        assert_eq!(report.steps[0].detail["privileges"].as_array().unwrap().len(), 2);
        assert_eq!(report.steps[1].detail["transitioned"], 2);
        assert_eq!(report.events.len(), 2);
        // licensee + ne + oh + ky for the license event, then two per
        // privilege event
        assert_eq!(report.notifications.len(), 8);
    }

    #[test]
    fn injected_failure_reverts_the_purchase() {
        let clean = run_scenario(
            &Scenario {
                steps: vec![],
                ..scenario()
            },
            LicenseTypeRegistry::builtin(),
            EngineConfig::immediate(),
            None,
        )
        .unwrap();
        let failed = run_scenario(
            &Scenario {
                steps: scenario().steps[..1].to_vec(),
                ..scenario()
            },
            LicenseTypeRegistry::builtin(),
            EngineConfig::immediate(),
            Some(1),
        )
        .unwrap();
        assert!(!failed.all_ok());
        let counter_free: Vec<_> = failed
            .records
            .iter()
            .filter(|r| !r["pk"].as_str().unwrap().ends_with("#PRIVILEGE_COUNT"))
            .cloned()
            .collect();
        assert_eq!(counter_free, clean.records);
    }

    #[test]
    fn simulate_writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let scenario_path = dir.path().join("scenario.json");
        let output = dir.path().join("report.json");
        std::fs::write(&scenario_path, r#"{"records": [], "steps": []}"#).unwrap();
        let code = run_simulate(&SimulateArgs {
            scenario: scenario_path,
            fail_transaction: None,
            license_types: None,
            output: Some(output.clone()),
        })
        .unwrap();
        assert_eq!(code, 0);
        let report: Value =
            serde_json::from_str(&std::fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(report["steps"], json!([]));
    }
}
