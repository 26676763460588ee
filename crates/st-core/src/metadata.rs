//! Weakly-typed metadata documents attached to reference values.
//!
//! The shape of `metadata` varies per enum type (`iconUrl` for categories,
//! `allowsRegistration` for statuses, ...), so it is an ordered map of
//! attribute name to arbitrary JSON. Validating expected keys is the
//! application's job, not the migration core's.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Structured metadata document, serialized as a JSON object.
///
/// Keys are kept sorted so the rendered JSON (and therefore change-unit
/// checksums and stored rows) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Shallow merge: keys in `other` overwrite keys in `self`.
    pub fn merge(&mut self, other: &Metadata) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Compact JSON text, as stored in the `metadata` column.
    pub fn to_json(&self) -> String {
        // A BTreeMap<String, Value> always serializes.
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse stored JSON text. `None`/empty text yields an empty document.
    pub fn from_json(text: Option<&str>) -> Result<Self, serde_json::Error> {
        match text {
            None => Ok(Self::default()),
            Some(t) if t.trim().is_empty() => Ok(Self::default()),
            Some(t) => serde_json::from_str(t),
        }
    }
}

impl FromIterator<(String, Value)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
