//! Change-unit identifiers.
//!
//! An id is a 14-digit UTC timestamp (`YYYYMMDDHHMMSS`), an underscore, and a
//! slug of ASCII letters, digits, and underscores. Because the timestamp is
//! fixed-width, lexicographic order equals authoring order.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

const TIMESTAMP_LEN: usize = 14;
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Identifier of a change unit, e.g. `20251227034100_unify_reference_values`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChangeUnitId(String);

impl ChangeUnitId {
    /// Parse and validate an identifier.
    pub fn parse(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        let invalid = |reason: &str| CoreError::InvalidUnitId {
            id: id.clone(),
            reason: reason.to_string(),
        };

        if id.len() <= TIMESTAMP_LEN + 1 || !id.is_char_boundary(TIMESTAMP_LEN) {
            return Err(invalid("expected `YYYYMMDDHHMMSS_slug`"));
        }
        let (stamp, rest) = id.split_at(TIMESTAMP_LEN);
        if !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("prefix must be a 14-digit timestamp"));
        }
        if NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_err() {
            return Err(invalid("prefix is not a valid calendar timestamp"));
        }
        let Some(slug) = rest.strip_prefix('_') else {
            return Err(invalid("timestamp must be followed by '_'"));
        };
        if slug.is_empty()
            || !slug
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid(
                "slug must be non-empty ASCII letters, digits, or underscores",
            ));
        }
        Ok(Self(id))
    }

    /// Build a fresh identifier for `slug` stamped with `at`.
    ///
    /// The slug is normalised: lowercase, runs of non-alphanumerics become `_`.
    pub fn generate(slug: &str, at: DateTime<Utc>) -> CoreResult<Self> {
        let mut normalised = String::with_capacity(slug.len());
        for c in slug.trim().chars() {
            if c.is_ascii_alphanumeric() {
                normalised.push(c.to_ascii_lowercase());
            } else if !normalised.ends_with('_') {
                normalised.push('_');
            }
        }
        let normalised = normalised.trim_matches('_');
        Self::parse(format!("{}_{}", at.format(TIMESTAMP_FORMAT), normalised))
    }

    /// The timestamp prefix.
    pub fn timestamp(&self) -> &str {
        &self.0[..TIMESTAMP_LEN]
    }

    /// The slug after the timestamp.
    pub fn slug(&self) -> &str {
        &self.0[TIMESTAMP_LEN + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for ChangeUnitId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChangeUnitId {
    type Err = CoreError;
    fn from_str(s: &str) -> CoreResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChangeUnitId {
    type Error = CoreError;
    fn try_from(s: String) -> CoreResult<Self> {
        Self::parse(s)
    }
}

impl From<ChangeUnitId> for String {
    fn from(id: ChangeUnitId) -> Self {
        id.0
    }
}

impl PartialEq<str> for ChangeUnitId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ChangeUnitId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
#[path = "unit_id_test.rs"]
mod tests;
