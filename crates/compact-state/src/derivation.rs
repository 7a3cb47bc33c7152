//! # License and Privilege Derivation
//!
//! Read-only queries over a provider's records: which license is
//! authoritative for a type, which adverse actions and investigations
//! apply to a subject, and when a set of lifted encumbrances finally ends.

use chrono::NaiveDate;
use compact_core::{Jurisdiction, LicenseTypeAbbreviation, SubjectType};

use crate::error::DerivationError;
use crate::records::{AdverseAction, Investigation, License};

/// Select the authoritative license among `licenses`.
///
/// When `home_jurisdiction` is given, candidates are first restricted to
/// that jurisdiction; if none match, all licenses are considered. The
/// winner has the greatest `(effective_date, date_of_issuance)`. Status and
/// compact eligibility play no part in the ordering.
///
/// # Errors
///
/// [`DerivationError::NoCandidateLicenses`] when `licenses` is empty.
pub fn find_best_license<'a>(
    licenses: &'a [License],
    home_jurisdiction: Option<&Jurisdiction>,
) -> Result<&'a License, DerivationError> {
    select_best(licenses.iter().collect(), home_jurisdiction)
        .ok_or(DerivationError::NoCandidateLicenses)
}

/// [`find_best_license`] restricted to one license type.
///
/// # Errors
///
/// [`DerivationError::NoLicenseOfType`] when no license has that type.
pub fn find_best_license_of_type<'a>(
    licenses: &'a [License],
    license_type: &LicenseTypeAbbreviation,
    home_jurisdiction: Option<&Jurisdiction>,
) -> Result<&'a License, DerivationError> {
    let of_type = licenses
        .iter()
        .filter(|l| &l.license_type == license_type)
        .collect();
    select_best(of_type, home_jurisdiction).ok_or_else(|| DerivationError::NoLicenseOfType {
        license_type: license_type.clone(),
    })
}

fn select_best<'a>(
    candidates: Vec<&'a License>,
    home_jurisdiction: Option<&Jurisdiction>,
) -> Option<&'a License> {
    let in_home: Vec<&License> = match home_jurisdiction {
        Some(home) => candidates
            .iter()
            .copied()
            .filter(|l| &l.jurisdiction == home)
            .collect(),
        None => Vec::new(),
    };
    let pool = if in_home.is_empty() { candidates } else { in_home };
    pool.into_iter()
        .max_by_key(|l| (l.effective_date(), l.date_of_issuance))
}

// ─── Adverse action and investigation filters ────────────────────────

/// Open/closed selector for filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordState {
    /// Match regardless of state.
    #[default]
    Any,
    /// Only unlifted / unclosed records.
    Open,
    /// Only lifted / closed records.
    Closed,
}

impl RecordState {
    fn admits(self, open: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Open => open,
            Self::Closed => !open,
        }
    }
}

/// Criteria for selecting adverse actions or investigations. Unset fields
/// match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectFilter {
    /// License or privilege.
    pub against: Option<SubjectType>,
    /// Jurisdiction of the subject.
    pub jurisdiction: Option<Jurisdiction>,
    /// License type of the subject.
    pub license_type: Option<LicenseTypeAbbreviation>,
    /// Open/closed.
    pub state: RecordState,
}

impl SubjectFilter {
    /// Everything scoped to one privilege.
    pub fn privilege(jurisdiction: &Jurisdiction, license_type: &LicenseTypeAbbreviation) -> Self {
        Self {
            against: Some(SubjectType::Privilege),
            jurisdiction: Some(jurisdiction.clone()),
            license_type: Some(license_type.clone()),
            state: RecordState::Any,
        }
    }

    /// Everything scoped to one license.
    pub fn license(jurisdiction: &Jurisdiction, license_type: &LicenseTypeAbbreviation) -> Self {
        Self {
            against: Some(SubjectType::License),
            ..Self::privilege(jurisdiction, license_type)
        }
    }

    /// Narrow to a state.
    pub fn with_state(mut self, state: RecordState) -> Self {
        self.state = state;
        self
    }

    fn matches(
        &self,
        against: SubjectType,
        jurisdiction: &Jurisdiction,
        license_type: &LicenseTypeAbbreviation,
        open: bool,
    ) -> bool {
        self.against.map_or(true, |a| a == against)
            && self.jurisdiction.as_ref().map_or(true, |j| j == jurisdiction)
            && self.license_type.as_ref().map_or(true, |t| t == license_type)
            && self.state.admits(open)
    }
}

/// Adverse actions matching `filter`.
pub fn filter_adverse_actions<'a>(
    actions: &'a [AdverseAction],
    filter: &SubjectFilter,
) -> Vec<&'a AdverseAction> {
    actions
        .iter()
        .filter(|a| filter.matches(a.action_against, &a.jurisdiction, &a.license_type, a.is_open()))
        .collect()
}

/// Investigations matching `filter`.
pub fn filter_investigations<'a>(
    investigations: &'a [Investigation],
    filter: &SubjectFilter,
) -> Vec<&'a Investigation> {
    investigations
        .iter()
        .filter(|i| {
            filter.matches(
                i.investigation_against,
                &i.jurisdiction,
                &i.license_type,
                i.is_open(),
            )
        })
        .collect()
}

/// The date a set of adverse actions finally stops restricting practice.
///
/// Defined only when the set is non-empty and every action has been
/// lifted; then it is the greatest lift date in the set.
pub fn latest_effective_lift_date<'a>(
    actions: impl IntoIterator<Item = &'a AdverseAction>,
) -> Option<NaiveDate> {
    let mut latest: Option<NaiveDate> = None;
    for action in actions {
        let lifted = action.effective_lift_date?;
        latest = Some(latest.map_or(lifted, |l| l.max(lifted)));
    }
    latest
}
