//! # Event Types
//!
//! Inbound license-level encumbrance events and the privilege-level events
//! the cascade emits in response.
//!
//! The inbound envelope is camelCase JSON with seven required fields. It is
//! validated field by field into [`EncumbranceEvent`] before any engine
//! code sees it, so a malformed payload is rejected without a read or a
//! write.

use chrono::NaiveDate;
use compact_core::{
    AdverseActionId, CompactCode, Jurisdiction, LicenseTypeAbbreviation, ProviderId, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::error::EventValidationError;

// ─── Inbound ─────────────────────────────────────────────────────────

/// Which inbound event a handler is reacting to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseEventKind {
    /// A license-scoped adverse action was recorded.
    #[serde(rename = "license.encumbrance")]
    LicenseEncumbrance,
    /// A license-scoped adverse action was lifted.
    #[serde(rename = "license.encumbranceLifted")]
    LicenseEncumbranceLifted,
}

impl LicenseEventKind {
    /// Wire detail type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LicenseEncumbrance => "license.encumbrance",
            Self::LicenseEncumbranceLifted => "license.encumbranceLifted",
        }
    }
}

impl std::fmt::Display for LicenseEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated encumbrance or encumbrance-lifted event.
///
/// `jurisdiction` and `license_type` name the subject of the adverse
/// action: the license for license events, the privilege for
/// privilege-scoped ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncumbranceEvent {
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee.
    pub provider_id: ProviderId,
    /// Jurisdiction of the encumbered subject.
    pub jurisdiction: Jurisdiction,
    /// License type of the encumbered subject.
    #[serde(rename = "licenseTypeAbbreviation")]
    pub license_type: LicenseTypeAbbreviation,
    /// Adverse action that was applied or lifted.
    pub adverse_action_id: AdverseActionId,
    /// Effective start date (encumbrance) or effective lift date (lift).
    pub effective_date: NaiveDate,
    /// When the event was raised. Participates in notification ledger keys.
    pub event_time: Timestamp,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    compact: Option<String>,
    provider_id: Option<String>,
    jurisdiction: Option<String>,
    license_type_abbreviation: Option<String>,
    adverse_action_id: Option<String>,
    effective_date: Option<String>,
    event_time: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, EventValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(EventValidationError::MissingField(field)),
    }
}

fn invalid(field: &'static str, reason: impl std::fmt::Display) -> EventValidationError {
    EventValidationError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}

impl EncumbranceEvent {
    /// Validate a JSON envelope.
    ///
    /// # Errors
    ///
    /// The first missing or invalid field, in envelope order.
    pub fn from_value(value: serde_json::Value) -> Result<Self, EventValidationError> {
        if !value.is_object() {
            return Err(EventValidationError::Malformed(
                "event payload must be a JSON object".to_string(),
            ));
        }
        let raw: RawEnvelope = serde_json::from_value(value)
            .map_err(|e| EventValidationError::Malformed(e.to_string()))?;

        let compact = required(raw.compact, "compact")?;
        let compact = CompactCode::new(&compact).map_err(|e| invalid("compact", e))?;

        let provider_id = required(raw.provider_id, "providerId")?;
        let provider_id = ProviderId::parse(&provider_id).map_err(|e| invalid("providerId", e))?;

        let jurisdiction = required(raw.jurisdiction, "jurisdiction")?;
        let jurisdiction =
            Jurisdiction::new(&jurisdiction).map_err(|e| invalid("jurisdiction", e))?;

        let license_type = required(raw.license_type_abbreviation, "licenseTypeAbbreviation")?;
        let license_type = LicenseTypeAbbreviation::new(&license_type)
            .map_err(|e| invalid("licenseTypeAbbreviation", e))?;

        let adverse_action_id = required(raw.adverse_action_id, "adverseActionId")?;
        let adverse_action_id = AdverseActionId::parse(&adverse_action_id)
            .map_err(|e| invalid("adverseActionId", e))?;

        let effective_date = required(raw.effective_date, "effectiveDate")?;
        let effective_date = NaiveDate::parse_from_str(&effective_date, "%Y-%m-%d")
            .map_err(|e| invalid("effectiveDate", e))?;

        let event_time = required(raw.event_time, "eventTime")?;
        let event_time = Timestamp::parse_lenient(&event_time).map_err(|e| invalid("eventTime", e))?;

        Ok(Self {
            compact,
            provider_id,
            jurisdiction,
            license_type,
            adverse_action_id,
            effective_date,
            event_time,
        })
    }

    /// Validate a JSON envelope from text.
    pub fn from_json(text: &str) -> Result<Self, EventValidationError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| EventValidationError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Render back to the wire envelope.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "compact": self.compact.as_str(),
            "providerId": self.provider_id.to_string(),
            "jurisdiction": self.jurisdiction.as_str(),
            "licenseTypeAbbreviation": self.license_type.as_str(),
            "adverseActionId": self.adverse_action_id.to_string(),
            "effectiveDate": self.effective_date.format("%Y-%m-%d").to_string(),
            "eventTime": self.event_time.to_iso8601(),
        })
    }
}

impl<'de> Deserialize<'de> for EncumbranceEvent {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

// ─── Outbound ────────────────────────────────────────────────────────

/// Kind of privilege-level event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrivilegeEventKind {
    /// The privilege became (or remains) encumbered by an adverse action.
    #[serde(rename = "privilege.encumbrance")]
    PrivilegeEncumbered,
    /// The privilege has no open adverse actions left.
    #[serde(rename = "privilege.encumbranceLifted")]
    PrivilegeEncumbranceLifted,
    /// An administrator deactivated the privilege.
    #[serde(rename = "privilege.deactivation")]
    PrivilegeDeactivated,
}

impl PrivilegeEventKind {
    /// Wire detail type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrivilegeEncumbered => "privilege.encumbrance",
            Self::PrivilegeEncumbranceLifted => "privilege.encumbranceLifted",
            Self::PrivilegeDeactivated => "privilege.deactivation",
        }
    }
}

impl std::fmt::Display for PrivilegeEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A privilege-level event emitted by the cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivilegeEvent {
    /// Event kind, serialized as the detail type.
    #[serde(rename = "detailType")]
    pub kind: PrivilegeEventKind,
    /// Owning compact.
    pub compact: CompactCode,
    /// Licensee.
    pub provider_id: ProviderId,
    /// Privilege jurisdiction.
    pub jurisdiction: Jurisdiction,
    /// Jurisdiction of the governing license.
    pub license_jurisdiction: Jurisdiction,
    /// License type.
    #[serde(rename = "licenseTypeAbbreviation")]
    pub license_type: LicenseTypeAbbreviation,
    /// Originating adverse action. For cascaded events, the license action.
    pub adverse_action_id: Option<AdverseActionId>,
    /// Encumbrance start, latest lift date, or deactivation date.
    pub effective_date: NaiveDate,
    /// Time of the triggering event; stable across redelivery.
    pub event_time: Timestamp,
}
