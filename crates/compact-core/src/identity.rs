//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier the engine handles. A
//! `Jurisdiction` cannot be passed where a `LicenseTypeAbbreviation` is
//! expected, and neither can be constructed from an unvalidated string.
//!
//! String-backed identifiers deserialize through `TryFrom<String>`, so a
//! malformed record or event payload is rejected at the serde boundary
//! instead of leaking into key construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// ─── Compact ─────────────────────────────────────────────────────────

/// Short code of a multi-state compact (e.g. `aslp`, `octp`, `coun`).
///
/// Lowercase ASCII alphanumerics, 2 to 16 characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompactCode(String);

impl CompactCode {
    /// Validate and normalize a compact code.
    pub fn new(value: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = value.as_ref();
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.len() < 2 || normalized.len() > 16 {
            return Err(CoreError::invalid("compact", raw, "must be 2-16 characters"));
        }
        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::invalid(
                "compact",
                raw,
                "must contain only ASCII letters and digits",
            ));
        }
        Ok(Self(normalized))
    }

    /// Borrow the code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ─── Jurisdiction ────────────────────────────────────────────────────

/// A member jurisdiction, identified by its two-letter postal abbreviation.
///
/// Stored lowercase (`oh`, `ky`). Rendered uppercase inside privilege
/// identifiers only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jurisdiction(String);

impl Jurisdiction {
    /// Validate and normalize a jurisdiction abbreviation.
    pub fn new(value: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = value.as_ref();
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.len() != 2 || !normalized.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::invalid(
                "jurisdiction",
                raw,
                "must be a two-letter postal abbreviation",
            ));
        }
        Ok(Self(normalized))
    }

    /// Borrow the lowercase abbreviation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ─── License Type ────────────────────────────────────────────────────

/// Abbreviation of a license type within a compact (e.g. `ot`, `slp`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LicenseTypeAbbreviation(String);

impl LicenseTypeAbbreviation {
    /// Validate and normalize a license-type abbreviation.
    pub fn new(value: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = value.as_ref();
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() || normalized.len() > 8 {
            return Err(CoreError::invalid(
                "license type abbreviation",
                raw,
                "must be 1-8 characters",
            ));
        }
        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::invalid(
                "license type abbreviation",
                raw,
                "must contain only ASCII letters and digits",
            ));
        }
        Ok(Self(normalized))
    }

    /// Borrow the lowercase abbreviation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ─── Transaction Reference ───────────────────────────────────────────

/// Reference to the settled purchase transaction that paid for a privilege.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompactTransactionId(String);

impl CompactTransactionId {
    /// Validate a transaction reference (non-empty, at most 128 characters).
    pub fn new(value: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = value.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > 128 {
            return Err(CoreError::invalid(
                "compact transaction id",
                raw,
                "must be 1-128 characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ─── UUID-backed identifiers ─────────────────────────────────────────

/// Unique identifier of a licensee within a compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub Uuid);

/// Unique identifier of an adverse (disciplinary) action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdverseActionId(pub Uuid);

/// Unique identifier of an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvestigationId(pub Uuid);

impl ProviderId {
    /// Generate a new random provider identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a provider identifier from its hyphenated form.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|e| CoreError::invalid("provider id", value, e.to_string()))
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl AdverseActionId {
    /// Generate a new random adverse action identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an adverse action identifier from its hyphenated form.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|e| CoreError::invalid("adverse action id", value, e.to_string()))
    }
}

impl InvestigationId {
    /// Generate a new random investigation identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProviderId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for AdverseActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for InvestigationId {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Conversions and Display ─────────────────────────────────────────

macro_rules! string_newtype_conversions {
    ($($ty:ident),* $(,)?) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = CoreError;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    Self::new(value)
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> Self {
                    value.0
                }
            }

            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )*
    };
}

string_newtype_conversions!(
    CompactCode,
    Jurisdiction,
    LicenseTypeAbbreviation,
    CompactTransactionId,
);

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for AdverseActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for InvestigationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
