//! # Event Time
//!
//! [`Timestamp`] is the instant attached to every lifecycle event. It is
//! held in UTC at whole-second resolution because the rendered string is
//! part of notification-ledger keys and audit sort keys: a redelivered
//! event has to render byte-for-byte the same.
//!
//! Calendar dates (issuance, expiration, effective start and lift) stay
//! `chrono::NaiveDate` and never pass through here.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// UTC instant with sub-second precision dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self::whole_seconds(Utc::now())
    }

    /// Strict form: RFC 3339 ending in `Z`.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTimestamp`] for malformed input or an explicit
    /// offset (`+00:00` included).
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if !s.ends_with('Z') {
            return Err(CoreError::InvalidTimestamp(format!(
                "event time must be UTC with a Z suffix: {s:?}"
            )));
        }
        Self::parse_lenient(s)
    }

    /// Accepts any RFC 3339 offset and shifts it to UTC. Inbound event
    /// payloads are read this way.
    pub fn parse_lenient(s: &str) -> Result<Self, CoreError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self::whole_seconds(dt.with_timezone(&Utc)))
            .map_err(|e| CoreError::InvalidTimestamp(format!("{s:?}: {e}")))
    }

    /// Seconds since the Unix epoch.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Calendar day in UTC.
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    fn whole_seconds(dt: DateTime<Utc>) -> Self {
        Self(dt.with_nanosecond(0).unwrap_or(dt))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}
