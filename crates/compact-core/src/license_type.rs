//! # License Type Registry
//!
//! Read-only reference table mapping license-type abbreviations to their
//! human-readable names, per compact. Notification templates render the
//! name; records and keys carry the abbreviation.
//!
//! The table changes rarely. It is either the built-in default or loaded
//! from a YAML document of the form:
//!
//! ```yaml
//! octp:
//!   - abbreviation: ot
//!     name: occupational therapist
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identity::{CompactCode, LicenseTypeAbbreviation};

/// One license type offered by a compact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseTypeEntry {
    /// Short form used in keys and privilege identifiers.
    pub abbreviation: LicenseTypeAbbreviation,
    /// Human-readable name.
    pub name: String,
}

/// License types per compact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseTypeRegistry {
    compacts: BTreeMap<CompactCode, Vec<LicenseTypeEntry>>,
}

impl LicenseTypeRegistry {
    /// Parse a registry from YAML.
    pub fn from_yaml(source: &str) -> Result<Self, CoreError> {
        let registry: Self =
            serde_yaml::from_str(source).map_err(|e| CoreError::Registry(e.to_string()))?;
        registry.check_unique()?;
        Ok(registry)
    }

    /// The license types of the compacts currently administered.
    pub fn builtin() -> Self {
        let mut compacts = BTreeMap::new();
        let mut add = |compact: &str, types: &[(&str, &str)]| {
            let entries = types
                .iter()
                .filter_map(|(abbr, name)| {
                    LicenseTypeAbbreviation::new(abbr)
                        .ok()
                        .map(|abbreviation| LicenseTypeEntry {
                            abbreviation,
                            name: (*name).to_string(),
                        })
                })
                .collect();
            if let Ok(code) = CompactCode::new(compact) {
                compacts.insert(code, entries);
            }
        };
        add(
            "aslp",
            &[("aud", "audiologist"), ("slp", "speech-language pathologist")],
        );
        add(
            "octp",
            &[
                ("ot", "occupational therapist"),
                ("ota", "occupational therapy assistant"),
            ],
        );
        add("coun", &[("lpc", "licensed professional counselor")]);
        Self { compacts }
    }

    /// Human-readable name for an abbreviation.
    pub fn name_for(
        &self,
        compact: &CompactCode,
        abbreviation: &LicenseTypeAbbreviation,
    ) -> Option<&str> {
        self.compacts
            .get(compact)?
            .iter()
            .find(|e| &e.abbreviation == abbreviation)
            .map(|e| e.name.as_str())
    }

    /// Abbreviation for a human-readable name (case-insensitive).
    pub fn abbreviation_for(
        &self,
        compact: &CompactCode,
        name: &str,
    ) -> Option<&LicenseTypeAbbreviation> {
        self.compacts
            .get(compact)?
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name.trim()))
            .map(|e| &e.abbreviation)
    }

    /// Whether the compact offers this license type.
    pub fn contains(&self, compact: &CompactCode, abbreviation: &LicenseTypeAbbreviation) -> bool {
        self.name_for(compact, abbreviation).is_some()
    }

    fn check_unique(&self) -> Result<(), CoreError> {
        for (compact, entries) in &self.compacts {
            for (i, entry) in entries.iter().enumerate() {
                if entries[..i].iter().any(|e| e.abbreviation == entry.abbreviation) {
                    return Err(CoreError::Registry(format!(
                        "duplicate license type {} in compact {compact}",
                        entry.abbreviation
                    )));
                }
            }
        }
        Ok(())
    }
}
