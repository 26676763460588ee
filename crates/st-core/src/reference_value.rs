//! Reference value store conventions.
//!
//! All enumerations live in one polymorphic table keyed by
//! `(enum_type, code)` and `(enum_type, int_value)`. The operations here are
//! lowered to plain SQL so they run through the same executor as every other
//! primitive.
//!
//! Conventions enforced:
//! - ids are stable; updates address rows by `(enum_type, code)` and never
//!   change `id`
//! - members are soft-deprecated (`is_active = false` plus a metadata flag)
//!   rather than deleted, so `int_value`s are never reused
//! - legacy per-enum tables are folded in with an explicit, exhaustive
//!   `code -> int_value` mapping; unmapped codes fail the unit
//! - catalog operations never rewrite `created_at`/`updated_at`

use crate::checksum::derive_id;
use crate::error::{CoreError, CoreResult};
use crate::metadata::Metadata;
use crate::newtype_string::define_catalog_key;
use crate::operation::{render_filter, ColumnDef, CreateTable, Filter, SqlValue};
use crate::sql_utils::{comma_list, quote_ident, quote_literal};
use crate::table_name::TableName;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Default location of the reference value store.
pub const REFERENCE_VALUES_TABLE: &str = "reference_data.reference_values";

/// Columns a legacy per-enum table must carry to be folded into the store.
pub const LEGACY_STANDARD_COLUMNS: &[&str] = &[
    "id",
    "code",
    "name",
    "description",
    "display_order",
    "is_active",
    "created_at",
    "updated_at",
];

/// Metadata keys written by [`ReferenceValueOp::Deprecate`].
pub const DEPRECATED_KEY: &str = "deprecated";
pub const DEPRECATION_REASON_KEY: &str = "deprecationReason";
/// `is_active` before deprecation, restored by [`ReferenceValueOp::Reactivate`].
pub const WAS_ACTIVE_KEY: &str = "wasActive";

define_catalog_key! {
    /// Name of a logical enumeration, e.g. `EventCategory`.
    pub struct EnumType;
}

fn default_store() -> TableName {
    TableName::from(REFERENCE_VALUES_TABLE)
}

fn default_true() -> bool {
    true
}

/// One member of one enumeration, as seeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceValue {
    /// Stable id; derived from `(enum_type, code)` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub code: String,
    pub int_value: i32,
    /// Display name; defaults to `code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Defaults to the member's position in its seed batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl ReferenceValue {
    pub fn new(code: &str, int_value: i32) -> Self {
        Self {
            id: None,
            code: code.to_string(),
            int_value,
            name: None,
            description: None,
            display_order: None,
            is_active: true,
            metadata: Metadata::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The row id this member is stored under.
    pub fn resolved_id(&self, enum_type: &EnumType) -> Uuid {
        self.id
            .unwrap_or_else(|| derive_id(&[enum_type.as_str(), &self.code]))
    }

    fn metadata_value(&self) -> SqlValue {
        if self.metadata.is_empty() {
            SqlValue::Null
        } else {
            SqlValue::Text(self.metadata.to_json())
        }
    }
}

/// In-place changes applied by [`ReferenceValueOp::Update`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceValuePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_value: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Replaces the whole metadata document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ReferenceValuePatch {
    fn assignments(&self) -> BTreeMap<String, SqlValue> {
        let mut set = BTreeMap::new();
        if let Some(code) = &self.code {
            set.insert("code".to_string(), SqlValue::text(code.as_str()));
        }
        if let Some(v) = self.int_value {
            set.insert("int_value".to_string(), SqlValue::from(v));
        }
        if let Some(name) = &self.name {
            set.insert("name".to_string(), SqlValue::text(name.as_str()));
        }
        if let Some(d) = &self.description {
            set.insert("description".to_string(), SqlValue::text(d.as_str()));
        }
        if let Some(order) = self.display_order {
            set.insert("display_order".to_string(), SqlValue::from(order));
        }
        if let Some(active) = self.is_active {
            set.insert("is_active".to_string(), SqlValue::from(active));
        }
        if let Some(metadata) = &self.metadata {
            let value = if metadata.is_empty() {
                SqlValue::Null
            } else {
                SqlValue::Text(metadata.to_json())
            };
            set.insert("metadata".to_string(), value);
        }
        set
    }
}

/// A legacy column folded into (or restored from) the `metadata` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldedColumn {
    /// Column name in the legacy table.
    pub column: String,
    /// Key in the metadata document.
    pub key: String,
}

/// Reference value store operations, tagged by `action` in change-unit files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReferenceValueOp {
    /// Create the store table with both uniqueness constraints.
    CreateStore {
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Drop the store table.
    DropStore {
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Insert members that do not exist yet (by id or by code).
    Seed {
        enum_type: EnumType,
        values: Vec<ReferenceValue>,
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Delete members. Inverse of `seed`; also used when an enumeration is
    /// retired, in which case the inverse must re-seed the exact rows.
    Remove {
        enum_type: EnumType,
        #[serde(default)]
        codes: Vec<String>,
        /// Remove every member of the enumeration.
        #[serde(default)]
        all: bool,
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Soft-disable a member without touching its `int_value`.
    Deprecate {
        enum_type: EnumType,
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Inverse of `deprecate`.
    Reactivate {
        enum_type: EnumType,
        code: String,
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Change fields of one member in place; the id is preserved.
    Update {
        enum_type: EnumType,
        code: String,
        set: ReferenceValuePatch,
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Move a legacy per-enum table into the store and drop it.
    FoldLegacyTable {
        legacy_table: TableName,
        enum_type: EnumType,
        /// Exhaustive `code -> int_value` mapping.
        mapping: BTreeMap<String, i32>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        metadata_columns: Vec<FoldedColumn>,
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Recreate a folded legacy table with its exact shape and move its rows
    /// back out of the store.
    RestoreLegacyTable {
        legacy: CreateTable,
        enum_type: EnumType,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        metadata_columns: Vec<FoldedColumn>,
        #[serde(default = "default_store")]
        table: TableName,
    },
}

/// Canonical DDL of the reference value store.
pub fn store_definition(table: &TableName) -> CreateTable {
    let mut ct = CreateTable::new(
        table.clone(),
        vec![
            ColumnDef::new("id", "UUID").not_null(),
            ColumnDef::new("enum_type", "VARCHAR(100)").not_null(),
            ColumnDef::new("code", "VARCHAR(100)").not_null(),
            ColumnDef::new("int_value", "INTEGER").not_null(),
            ColumnDef::new("name", "VARCHAR(255)").not_null(),
            ColumnDef::new("description", "VARCHAR"),
            ColumnDef::new("display_order", "INTEGER")
                .not_null()
                .default_value(0),
            ColumnDef::new("is_active", "BOOLEAN")
                .not_null()
                .default_value(true),
            ColumnDef::new("metadata", "VARCHAR"),
            ColumnDef::new("created_at", "TIMESTAMP")
                .not_null()
                .default_value(SqlValue::expr("now()")),
            ColumnDef::new("updated_at", "TIMESTAMP")
                .not_null()
                .default_value(SqlValue::expr("now()")),
        ],
    );
    ct.primary_key = vec!["id".to_string()];
    ct.unique = vec![
        vec!["enum_type".to_string(), "code".to_string()],
        vec!["enum_type".to_string(), "int_value".to_string()],
    ];
    ct
}

fn member_filter(enum_type: &EnumType, code: &str) -> Filter {
    let mut filter = Filter::new();
    filter.insert("enum_type".to_string(), SqlValue::text(enum_type.as_str()));
    filter.insert("code".to_string(), SqlValue::text(code));
    filter
}

fn invalid(message: String) -> CoreError {
    CoreError::InvalidCatalogOp { message }
}

impl ReferenceValueOp {
    pub fn summary(&self) -> String {
        match self {
            ReferenceValueOp::CreateStore { table } => format!("create_store {table}"),
            ReferenceValueOp::DropStore { table } => format!("drop_store {table}"),
            ReferenceValueOp::Seed {
                enum_type, values, ..
            } => format!("seed {} x{}", enum_type, values.len()),
            ReferenceValueOp::Remove {
                enum_type,
                codes,
                all,
                ..
            } => {
                if *all {
                    format!("remove {enum_type} (all)")
                } else {
                    format!("remove {} x{}", enum_type, codes.len())
                }
            }
            ReferenceValueOp::Deprecate {
                enum_type, code, ..
            } => format!("deprecate {enum_type}.{code}"),
            ReferenceValueOp::Reactivate {
                enum_type, code, ..
            } => format!("reactivate {enum_type}.{code}"),
            ReferenceValueOp::Update {
                enum_type, code, ..
            } => format!("update {enum_type}.{code}"),
            ReferenceValueOp::FoldLegacyTable {
                legacy_table,
                enum_type,
                ..
            } => format!("fold {legacy_table} into {enum_type}"),
            ReferenceValueOp::RestoreLegacyTable {
                legacy, enum_type, ..
            } => format!("restore {} from {}", legacy.table, enum_type),
        }
    }

    /// The store table this operation writes to.
    pub fn store(&self) -> &TableName {
        match self {
            ReferenceValueOp::CreateStore { table }
            | ReferenceValueOp::DropStore { table }
            | ReferenceValueOp::Seed { table, .. }
            | ReferenceValueOp::Remove { table, .. }
            | ReferenceValueOp::Deprecate { table, .. }
            | ReferenceValueOp::Reactivate { table, .. }
            | ReferenceValueOp::Update { table, .. }
            | ReferenceValueOp::FoldLegacyTable { table, .. }
            | ReferenceValueOp::RestoreLegacyTable { table, .. } => table,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        match self {
            ReferenceValueOp::Seed {
                enum_type, values, ..
            } => {
                let mut codes = HashSet::new();
                let mut ints = HashSet::new();
                for v in values {
                    if v.code.trim().is_empty() {
                        return Err(invalid(format!("{enum_type}: empty code in seed")));
                    }
                    if !codes.insert(v.code.as_str()) {
                        return Err(invalid(format!(
                            "{enum_type}: code '{}' seeded twice",
                            v.code
                        )));
                    }
                    if !ints.insert(v.int_value) {
                        return Err(invalid(format!(
                            "{enum_type}: int_value {} seeded twice",
                            v.int_value
                        )));
                    }
                }
                Ok(())
            }
            ReferenceValueOp::Remove {
                enum_type,
                codes,
                all,
                ..
            } => match (*all, codes.is_empty()) {
                (true, false) => Err(invalid(format!(
                    "{enum_type}: remove takes either `codes` or `all`, not both"
                ))),
                (false, true) => Err(invalid(format!(
                    "{enum_type}: remove needs `codes` or `all: true`"
                ))),
                _ => Ok(()),
            },
            ReferenceValueOp::Update { enum_type, set, .. } if set.assignments().is_empty() => {
                Err(invalid(format!("{enum_type}: update changes nothing")))
            }
            ReferenceValueOp::FoldLegacyTable {
                enum_type, mapping, ..
            } => {
                if mapping.is_empty() {
                    return Err(invalid(format!("{enum_type}: fold needs a code mapping")));
                }
                let mut seen = HashSet::new();
                for (code, v) in mapping {
                    if !seen.insert(*v) {
                        return Err(invalid(format!(
                            "{enum_type}: int_value {v} mapped twice (code '{code}')"
                        )));
                    }
                }
                Ok(())
            }
            ReferenceValueOp::RestoreLegacyTable {
                legacy,
                metadata_columns,
                ..
            } => {
                let present: HashSet<&str> =
                    legacy.columns.iter().map(|c| c.name.as_str()).collect();
                for required in LEGACY_STANDARD_COLUMNS {
                    if !present.contains(required) {
                        return Err(invalid(format!(
                            "legacy table {} lacks standard column '{}'",
                            legacy.table, required
                        )));
                    }
                }
                for folded in metadata_columns {
                    if !present.contains(folded.column.as_str()) {
                        return Err(invalid(format!(
                            "legacy table {} lacks folded column '{}'",
                            legacy.table, folded.column
                        )));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Lower to SQL statements.
    pub fn to_sql(&self) -> CoreResult<Vec<String>> {
        self.validate()?;
        let stmts = match self {
            ReferenceValueOp::CreateStore { table } => {
                crate::operation::Operation::CreateTable(store_definition(table)).to_sql()?
            }
            ReferenceValueOp::DropStore { table } => {
                vec![format!("DROP TABLE {}", table.quoted())]
            }
            ReferenceValueOp::Seed {
                enum_type,
                values,
                table,
            } => render_seed(table, enum_type, values),
            ReferenceValueOp::Remove {
                enum_type,
                codes,
                all,
                table,
            } => {
                let mut sql = format!(
                    "DELETE FROM {} WHERE \"enum_type\" = {}",
                    table.quoted(),
                    quote_literal(enum_type)
                );
                if !*all {
                    sql.push_str(&format!(
                        " AND \"code\" IN ({})",
                        comma_list(codes.iter().map(|c| quote_literal(c)))
                    ));
                }
                vec![sql]
            }
            ReferenceValueOp::Deprecate {
                enum_type,
                code,
                reason,
                table,
            } => {
                let mut patch = Metadata::new().with(DEPRECATED_KEY, true);
                if let Some(reason) = reason {
                    patch.insert(DEPRECATION_REASON_KEY, reason.as_str());
                }
                // SET expressions read the row as it was, so `is_active` here
                // is the value before this update.
                vec![format!(
                    "UPDATE {} SET \"is_active\" = FALSE, \"metadata\" = CAST(json_merge_patch(json_merge_patch(COALESCE(\"metadata\", '{{}}'), {}), json_object({}, \"is_active\")) AS VARCHAR) WHERE {}",
                    table.quoted(),
                    quote_literal(&patch.to_json()),
                    quote_literal(WAS_ACTIVE_KEY),
                    render_filter(&member_filter(enum_type, code))
                )]
            }
            ReferenceValueOp::Reactivate {
                enum_type,
                code,
                table,
            } => {
                let patch = format!(
                    "{{\"{DEPRECATED_KEY}\":null,\"{DEPRECATION_REASON_KEY}\":null,\"{WAS_ACTIVE_KEY}\":null}}"
                );
                // Members deprecated without a recorded state come back active.
                vec![format!(
                    "UPDATE {} SET \"is_active\" = COALESCE(TRY_CAST(json_extract_string(\"metadata\", {}) AS BOOLEAN), TRUE), \"metadata\" = NULLIF(CAST(json_merge_patch(COALESCE(\"metadata\", '{{}}'), {}) AS VARCHAR), '{{}}') WHERE {}",
                    table.quoted(),
                    quote_literal(&format!("$.{WAS_ACTIVE_KEY}")),
                    quote_literal(&patch),
                    render_filter(&member_filter(enum_type, code))
                )]
            }
            ReferenceValueOp::Update {
                enum_type,
                code,
                set,
                table,
            } => {
                let assignments = comma_list(
                    set.assignments()
                        .iter()
                        .map(|(col, v)| format!("{} = {}", quote_ident(col), v.to_sql())),
                );
                vec![format!(
                    "UPDATE {} SET {} WHERE {}",
                    table.quoted(),
                    assignments,
                    render_filter(&member_filter(enum_type, code))
                )]
            }
            ReferenceValueOp::FoldLegacyTable {
                legacy_table,
                enum_type,
                mapping,
                metadata_columns,
                table,
            } => render_fold(table, legacy_table, enum_type, mapping, metadata_columns),
            ReferenceValueOp::RestoreLegacyTable {
                legacy,
                enum_type,
                metadata_columns,
                table,
            } => {
                let mut stmts =
                    crate::operation::Operation::CreateTable(legacy.clone()).to_sql()?;
                stmts.extend(render_restore(table, legacy, enum_type, metadata_columns));
                stmts
            }
        };
        Ok(stmts)
    }
}

const STORE_INSERT_COLUMNS: &str = "\"id\", \"enum_type\", \"code\", \"int_value\", \"name\", \"description\", \"display_order\", \"is_active\", \"metadata\"";

fn render_seed(table: &TableName, enum_type: &EnumType, values: &[ReferenceValue]) -> Vec<String> {
    values
        .iter()
        .enumerate()
        .map(|(position, v)| {
            let id = v.resolved_id(enum_type).to_string();
            let order = v.display_order.unwrap_or(position as i32);
            let row = [
                SqlValue::text(id.as_str()),
                SqlValue::text(enum_type.as_str()),
                SqlValue::text(v.code.as_str()),
                SqlValue::from(v.int_value),
                SqlValue::text(v.name.as_deref().unwrap_or(&v.code)),
                SqlValue::from(v.description.clone()),
                SqlValue::from(order),
                SqlValue::from(v.is_active),
                v.metadata_value(),
            ];
            format!(
                "INSERT INTO {t} ({STORE_INSERT_COLUMNS})\nSELECT {values}\nWHERE NOT EXISTS (SELECT 1 FROM {t} WHERE \"id\" = {id} OR ({member}))",
                t = table.quoted(),
                values = comma_list(row.iter().map(SqlValue::to_sql)),
                id = quote_literal(&id),
                member = render_filter(&member_filter(enum_type, &v.code)),
            )
        })
        .collect()
}

fn render_fold(
    store: &TableName,
    legacy_table: &TableName,
    enum_type: &EnumType,
    mapping: &BTreeMap<String, i32>,
    metadata_columns: &[FoldedColumn],
) -> Vec<String> {
    let cases = mapping
        .iter()
        .map(|(code, v)| format!("WHEN {} THEN {}", quote_literal(code), v))
        .collect::<Vec<_>>()
        .join(" ");
    let unmapped = quote_literal(&format!("unmapped {enum_type} code: "));
    let int_value = format!(
        "CASE \"code\" {cases} ELSE CAST(error({unmapped} || \"code\") AS INTEGER) END"
    );
    let metadata = if metadata_columns.is_empty() {
        "NULL".to_string()
    } else {
        let pairs = comma_list(
            metadata_columns
                .iter()
                .map(|f| format!("{}, {}", quote_literal(&f.key), quote_ident(&f.column))),
        );
        format!("CAST(json_object({pairs}) AS VARCHAR)")
    };
    vec![
        format!(
            "INSERT INTO {} ({STORE_INSERT_COLUMNS}, \"created_at\", \"updated_at\")\nSELECT \"id\", {}, \"code\", {}, \"name\", \"description\", \"display_order\", \"is_active\", {}, \"created_at\", \"updated_at\"\nFROM {}",
            store.quoted(),
            quote_literal(enum_type),
            int_value,
            metadata,
            legacy_table.quoted()
        ),
        format!("DROP TABLE {}", legacy_table.quoted()),
    ]
}

fn render_restore(
    store: &TableName,
    legacy: &CreateTable,
    enum_type: &EnumType,
    metadata_columns: &[FoldedColumn],
) -> Vec<String> {
    let mut columns: Vec<String> = LEGACY_STANDARD_COLUMNS
        .iter()
        .map(|c| quote_ident(c))
        .collect();
    let mut selects = columns.clone();
    for folded in metadata_columns {
        let data_type = legacy
            .columns
            .iter()
            .find(|c| c.name == folded.column)
            .map_or("VARCHAR", |c| c.data_type.trim());
        columns.push(quote_ident(&folded.column));
        selects.push(format!(
            "CAST(json_extract_string(\"metadata\", {}) AS {})",
            quote_literal(&format!("$.{}", folded.key)),
            data_type
        ));
    }
    let mut filter = Filter::new();
    filter.insert("enum_type".to_string(), SqlValue::text(enum_type.as_str()));
    vec![
        format!(
            "INSERT INTO {} ({})\nSELECT {}\nFROM {}\nWHERE {}",
            legacy.table.quoted(),
            columns.join(", "),
            selects.join(", "),
            store.quoted(),
            render_filter(&filter)
        ),
        format!(
            "DELETE FROM {} WHERE {}",
            store.quoted(),
            render_filter(&filter)
        ),
    ]
}

#[cfg(test)]
#[path = "reference_value_test.rs"]
mod tests;
