//! Strongly-typed, optionally schema-qualified table name.

use crate::sql_utils::quote_ident;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default schema used when a table name carries no qualifier.
pub const DEFAULT_SCHEMA: &str = "main";

/// A table reference such as `reference_data.reference_values`.
///
/// Serialized as the dotted string so change-unit files can write
/// `table: communications.email_templates`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName {
    schema: Option<String>,
    name: String,
}

impl TableName {
    /// Create a table name from literal parts.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty. Use [`parse`](Self::parse) for untrusted
    /// input.
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        assert!(!name.is_empty(), "TableName must not be empty");
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Parse `table` or `schema.table`. Returns `None` for empty parts or more
    /// than one dot.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('.');
        let first = parts.next()?;
        let second = parts.next();
        if parts.next().is_some() {
            return None;
        }
        match second {
            None if !first.is_empty() => Some(Self {
                schema: None,
                name: first.to_string(),
            }),
            Some(table) if !first.is_empty() && !table.is_empty() => Some(Self {
                schema: Some(first.to_string()),
                name: table.to_string(),
            }),
            _ => None,
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Schema, falling back to [`DEFAULT_SCHEMA`].
    pub fn schema_or_default(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same schema, different table name.
    pub fn with_name(&self, name: &str) -> Self {
        Self {
            schema: self.schema.clone(),
            name: name.to_string(),
        }
    }

    /// Render the quoted, qualified form for SQL.
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl TryFrom<String> for TableName {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("invalid table name '{s}'"))
    }
}

impl From<TableName> for String {
    fn from(t: TableName) -> Self {
        t.to_string()
    }
}

impl FromStr for TableName {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid table name '{s}'"))
    }
}

/// For names written as literals in code. Names from files or arguments go
/// through [`TableName::parse`] or `str::parse` instead.
impl From<&str> for TableName {
    /// # Panics
    ///
    /// Panics when `s` is not `table` or `schema.table`.
    fn from(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| panic!("invalid table name '{s}'"))
    }
}
